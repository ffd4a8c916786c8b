//! Error types for the export reader.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("cannot read {path}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("export document is malformed: {0}")]
  Document(#[from] serde_json::Error),

  #[error("entry {index}: {reason}")]
  Entry { index: usize, reason: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
