pub mod error;
pub mod feed;
pub mod follow_request;
#[cfg(any(test, feature = "memory-store"))]
pub mod memory;
pub mod notify;
pub mod social;
pub mod store;
pub mod toggle;
pub mod viewer;
pub mod visibility;
#[cfg(test)]
mod testing;
