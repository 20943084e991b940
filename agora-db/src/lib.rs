//! Postgres implementation of the agora store.

pub mod client;
mod query;
mod record;

pub use client::{DbClient, DbError, PgTransaction, connect, migrate};
