//! Error types for the migration engine.
//!
//! Only [`Error`] ever escapes a pipeline, and only for conditions that stop
//! a run before or between stages. Per-record problems are reported through
//! [`crate::report::RunReport`] instead.

use thiserror::Error;
use wpmig_core::fetch::FetchError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("source unreadable: {0}")]
  SourceUnreadable(#[source] BoxError),

  #[error("required plugin {0:?} is not active on the destination")]
  MissingPlugin(String),

  #[error("store error: {0}")]
  Store(#[source] BoxError),
}

impl Error {
  pub(crate) fn store<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Why a media attachment was omitted. Never fatal to the owning record.
#[derive(Debug, Error)]
pub enum AssetError {
  #[error("fetch failed for {url}: {source}")]
  Fetch {
    url:    String,
    #[source]
    source: FetchError,
  },

  #[error("fetch for {0} already failed in this run")]
  PreviouslyFailed(String),

  #[error("cannot determine file type of {0}")]
  UnsupportedType(String),

  #[error("media storage failed: {0}")]
  Store(#[source] BoxError),

  #[error("cannot bind media into {slot}: {source}")]
  Bind {
    slot:   String,
    #[source]
    source: BoxError,
  },
}
