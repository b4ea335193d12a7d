//! SQLite backend for the triagedeck store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! pool without blocking the async runtime. Every multi-statement operation
//! (event apply, job claim, cancel, rebuild, expiry) runs inside a single
//! rusqlite transaction.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
