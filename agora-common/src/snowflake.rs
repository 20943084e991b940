//! Snowflake ids.
//!
//! Layout, most significant bit first: 42 bits of milliseconds since the
//! [`Epoch`], 5 bits worker id, 5 bits process id, 12 bits increment.

use derive_where::derive_where;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::{
    fmt::{Debug, Display, Formatter},
    marker::PhantomData,
};
use thiserror::Error;
use time::{Duration, UtcDateTime};

pub const TIMESTAMP_BITS: u32 = 42;
pub const WORKER_ID_BITS: u32 = 5;
pub const PROCESS_ID_BITS: u32 = 5;
pub const INCREMENT_BITS: u32 = 12;

pub const INCREMENT_SHIFT: u32 = 0;
pub const PROCESS_ID_SHIFT: u32 = INCREMENT_SHIFT + INCREMENT_BITS;
pub const WORKER_ID_SHIFT: u32 = PROCESS_ID_SHIFT + PROCESS_ID_BITS;
pub const TIMESTAMP_SHIFT: u32 = WORKER_ID_SHIFT + WORKER_ID_BITS;

const fn mask(bits: u32) -> u64 {
    (1 << bits) - 1
}

pub trait Epoch {
    const EPOCH_TIME: UtcDateTime;
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum SnowflakeTimestampError {
    #[error("Specified time was before the snowflake epoch.")]
    BeforeEpoch,
    #[error("Resulting timestamp uses more than 42 bits.")]
    TooLarge,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
#[error("{part} {value} does not fit into its snowflake bits")]
pub struct SnowflakePartOutOfRangeError {
    part: &'static str,
    value: u64,
}

macro_rules! bounded_part {
    ($name:ident, $bits:ident) => {
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(u8);

        impl $name {
            #[must_use]
            pub fn new(value: u8) -> Option<Self> {
                (u64::from(value) <= mask($bits)).then_some(Self(value))
            }

            #[must_use]
            pub fn get(self) -> u8 {
                self.0
            }
        }

        impl TryFrom<u8> for $name {
            type Error = SnowflakePartOutOfRangeError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                Self::new(value).ok_or(SnowflakePartOutOfRangeError {
                    part: stringify!($name),
                    value: value.into(),
                })
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let inner = u8::deserialize(deserializer)?;
                Self::new(inner).ok_or_else(|| {
                    D::Error::invalid_value(Unexpected::Unsigned(inner.into()), &stringify!($name))
                })
            }
        }
    };
}

bounded_part!(WorkerId, WORKER_ID_BITS);
bounded_part!(ProcessId, PROCESS_ID_BITS);

/// Milliseconds between `Epoch::EPOCH_TIME` and `time`.
pub fn epoch_millis<E: Epoch>(time: UtcDateTime) -> Result<u64, SnowflakeTimestampError> {
    let millis = (time - E::EPOCH_TIME).whole_milliseconds();
    let millis = u64::try_from(millis).map_err(|_| SnowflakeTimestampError::BeforeEpoch)?;
    if millis > mask(TIMESTAMP_BITS) {
        return Err(SnowflakeTimestampError::TooLarge);
    }
    Ok(millis)
}

#[derive_where(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Debug,
    Default,
    Hash,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
pub struct Snowflake<E>(u64, #[serde(skip)] PhantomData<E>);

impl<E> Snowflake<E> {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner, PhantomData)
    }

    /// `increment` is truncated to its 12 bits.
    #[must_use]
    pub fn from_parts(
        epoch_millis: u64,
        worker_id: WorkerId,
        process_id: ProcessId,
        increment: u16,
    ) -> Self {
        let snowflake = (epoch_millis & mask(TIMESTAMP_BITS)) << TIMESTAMP_SHIFT
            | u64::from(worker_id.get()) << WORKER_ID_SHIFT
            | u64::from(process_id.get()) << PROCESS_ID_SHIFT
            | (u64::from(increment) & mask(INCREMENT_BITS)) << INCREMENT_SHIFT;

        Self::new(snowflake)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn epoch_millis(self) -> u64 {
        (self.0 >> TIMESTAMP_SHIFT) & mask(TIMESTAMP_BITS)
    }

    #[must_use]
    pub fn timestamp(self) -> UtcDateTime
    where
        E: Epoch,
    {
        // 42 bits always fit into an i64.
        #[allow(clippy::cast_possible_wrap)]
        let millis = self.epoch_millis() as i64;
        E::EPOCH_TIME + Duration::milliseconds(millis)
    }

    #[must_use]
    pub fn worker_id(self) -> WorkerId {
        #[allow(clippy::cast_possible_truncation)]
        WorkerId(((self.0 >> WORKER_ID_SHIFT) & mask(WORKER_ID_BITS)) as u8)
    }

    #[must_use]
    pub fn process_id(self) -> ProcessId {
        #[allow(clippy::cast_possible_truncation)]
        ProcessId(((self.0 >> PROCESS_ID_SHIFT) & mask(PROCESS_ID_BITS)) as u8)
    }

    #[must_use]
    pub fn increment(self) -> u16 {
        #[allow(clippy::cast_possible_truncation)]
        let increment = ((self.0 >> INCREMENT_SHIFT) & mask(INCREMENT_BITS)) as u16;
        increment
    }
}

impl<E> Display for Snowflake<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<E> From<u64> for Snowflake<E> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<E> From<Snowflake<E>> for u64 {
    fn from(value: Snowflake<E>) -> Self {
        value.get()
    }
}

#[derive_where(Clone, Eq, PartialEq, Debug, Hash)]
pub struct SnowflakeGenerator<E> {
    worker_id: WorkerId,
    process_id: ProcessId,
    next_increment: u16,
    phantom_data: PhantomData<E>,
}

impl<E> SnowflakeGenerator<E> {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            worker_id,
            process_id,
            next_increment: 0,
            phantom_data: PhantomData,
        }
    }

    #[must_use]
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    #[must_use]
    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn generate_at(
        &mut self,
        time: UtcDateTime,
    ) -> Result<Snowflake<E>, SnowflakeTimestampError>
    where
        E: Epoch,
    {
        let millis = epoch_millis::<E>(time)?;
        let increment = self.next_increment;
        #[allow(clippy::cast_possible_truncation)]
        let wrapped = ((u64::from(increment) + 1) & mask(INCREMENT_BITS)) as u16;
        self.next_increment = wrapped;

        Ok(Snowflake::from_parts(
            millis,
            self.worker_id,
            self.process_id,
            increment,
        ))
    }

    pub fn generate(&mut self) -> Result<Snowflake<E>, SnowflakeTimestampError>
    where
        E: Epoch,
    {
        self.generate_at(UtcDateTime::now())
    }
}

#[cfg(test)]
mod tests {
    use crate::snowflake::{
        Epoch, ProcessId, Snowflake, SnowflakeGenerator, SnowflakeTimestampError, WorkerId,
        epoch_millis,
    };
    use time::{Duration, UtcDateTime, macros::utc_datetime};

    struct MillennialEpoch;
    impl Epoch for MillennialEpoch {
        const EPOCH_TIME: UtcDateTime = utc_datetime!(2000-1-1 00:00);
    }

    #[test]
    fn part_ranges() {
        assert!(WorkerId::new(0x1F).is_some());
        assert!(WorkerId::new(0x20).is_none());
        assert!(ProcessId::new(0).is_some());
        assert!(ProcessId::new(u8::MAX).is_none());
        assert!(WorkerId::try_from(40).is_err());
    }

    #[test]
    fn millis_relative_to_epoch() {
        assert_eq!(
            epoch_millis::<MillennialEpoch>(MillennialEpoch::EPOCH_TIME),
            Ok(0)
        );
        assert_eq!(
            epoch_millis::<MillennialEpoch>(
                MillennialEpoch::EPOCH_TIME - Duration::milliseconds(1)
            ),
            Err(SnowflakeTimestampError::BeforeEpoch)
        );
        assert_eq!(
            epoch_millis::<MillennialEpoch>(
                MillennialEpoch::EPOCH_TIME + Duration::milliseconds(0x0400_0000_0000)
            ),
            Err(SnowflakeTimestampError::TooLarge)
        );
    }

    #[test]
    fn from_and_into_parts() {
        let time = utc_datetime!(2025-10-24 10:30);
        let millis = epoch_millis::<MillennialEpoch>(time).unwrap();
        let worker_id = WorkerId::new(0b10101).unwrap();
        let process_id = ProcessId::new(0b10001).unwrap();

        let snowflake =
            Snowflake::<MillennialEpoch>::from_parts(millis, worker_id, process_id, 100);

        assert_eq!(snowflake.get(), 3_416_751_341_570_822_244);
        assert_eq!(snowflake.timestamp(), time);
        assert_eq!(snowflake.worker_id(), worker_id);
        assert_eq!(snowflake.process_id(), process_id);
        assert_eq!(snowflake.increment(), 100);
    }

    #[test]
    fn generator_increments_and_wraps() {
        let worker_id = WorkerId::new(10).unwrap();
        let process_id = ProcessId::new(0).unwrap();
        let time = utc_datetime!(2025-10-24 10:55);

        let mut generator = SnowflakeGenerator::<MillennialEpoch>::new(worker_id, process_id);

        let first = generator.generate_at(time).unwrap();
        let second = generator.generate_at(time).unwrap();
        assert_eq!(first.increment(), 0);
        assert_eq!(second.increment(), 1);
        assert!(first < second);

        for _ in 2..0x1000 {
            generator.generate_at(time).unwrap();
        }
        assert_eq!(generator.generate_at(time).unwrap().increment(), 0);
    }
}
