//! Error type for `wpmig-store-sqlite`.

use thiserror::Error;
use wpmig_core::entity::{MediaId, PostId, TermId};

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("term {name:?} already exists in {taxonomy}")]
  TermExists { taxonomy: String, name: String },

  #[error("term {term} does not belong to taxonomy {taxonomy}")]
  TaxonomyMismatch { term: TermId, taxonomy: String },

  #[error("post not found: {0}")]
  PostNotFound(PostId),

  #[error("term not found: {0}")]
  TermNotFound(TermId),

  #[error("media not found: {0}")]
  MediaNotFound(MediaId),

  #[error("invalid media file name: {0:?}")]
  InvalidFileName(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
