//! SQLite backend standing in for the destination site.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Media files are copied into an upload
//! directory on local disk; only their metadata lives in the database.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteStore, StoreSettings};

#[cfg(test)]
mod tests;
