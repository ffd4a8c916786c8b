//! Error types for `wpmig-core`.

use thiserror::Error;

/// Boundary validation failures for a single source field.
///
/// None of these is fatal to a run; callers degrade the offending field and
/// record a warning.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
  #[error("unrecognised date/time in {key}: {value:?}")]
  InvalidTemporal { key: String, value: String },

  #[error("malformed member list in {key}: {reason}")]
  MalformedRoster { key: String, reason: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
