//! Core types and collaborator traits for the wpmig migration tools.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! The engine, the export reader and the storage backends all depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod entity;
pub mod error;
pub mod fetch;
pub mod legacy;
pub mod record;
pub mod source;
pub mod store;

pub use error::{Error, Result};
