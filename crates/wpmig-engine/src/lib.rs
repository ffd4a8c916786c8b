//! The wpmig pipelines: `import`, `reset` and `migrate`.
//!
//! Every pipeline is Load → Classify → Resolve → Apply → Report, driven
//! sequentially over a [`Destination`](wpmig_core::store::Destination). A run
//! only fails outright for the conditions listed on [`Error`]; everything
//! else ends up as counts and warnings in the returned [`RunReport`].

pub mod apply;
pub mod classify;
pub mod context;
pub mod error;
pub mod guard;
pub mod import;
pub mod index;
pub mod loader;
pub mod migrate;
pub mod report;
pub mod reset;
pub mod resolve;

pub use error::{AssetError, Error, Result};
pub use import::import;
pub use migrate::{MigrateOptions, migrate};
pub use report::{Outcome, RunReport, Summary, Warning};
pub use reset::reset;
