//! Reader for legacy site export dumps.
//!
//! Converts the JSON rendering of an export (one entry per exported post,
//! with its post meta and term list) into [`wpmig_core`] source records.
//! Pure synchronous; no HTTP or database dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use wpmig_export::parse_many;
//!
//! let doc = r#"{"posts": [{"post_id": 1, "post_type": "person", "post_title": "Ada"}]}"#;
//! for entry in parse_many(doc).unwrap() {
//!   println!("{:?}", entry.map(|r| r.title));
//! }
//! ```

pub mod error;
mod parse;

use std::path::Path;

pub use error::{Error, Result};
use wpmig_core::{
  record::SourceRecord,
  source::{SourceBatch, SourceReader},
};

/// Parse every entry of an export document.
///
/// Each entry is decoded independently; a malformed entry yields `Err(…)` in
/// the corresponding position without aborting the rest. Only a document
/// that cannot be read as a whole returns the outer `Err`.
pub fn parse_many(input: &str) -> Result<Vec<Result<SourceRecord>>> {
  parse::parse_entries(input)
}

/// [`SourceReader`] over export files on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExportReader;

impl SourceReader for ExportReader {
  type Error = Error;

  fn read_source(&self, path: &Path) -> Result<SourceBatch> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Io {
      path: path.to_path_buf(),
      source,
    })?;

    let mut batch = SourceBatch::default();
    for entry in parse_many(&raw)? {
      match entry {
        Ok(record) => batch.records.push(record),
        Err(e) => batch.rejected.push(e.to_string()),
      }
    }

    tracing::debug!(
      path = %path.display(),
      records = batch.records.len(),
      rejected = batch.rejected.len(),
      "read export file"
    );
    Ok(batch)
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  #[test]
  fn reads_file_and_collects_rejections() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
      file,
      r#"{{"posts": [
        {{"post_id": 1, "post_type": "person", "post_title": "Ada"}},
        {{"post_id": 2}}
      ]}}"#
    )
    .unwrap();

    let batch = ExportReader.read_source(file.path()).unwrap();
    assert_eq!(batch.records.len(), 1);
    assert_eq!(batch.rejected.len(), 1);
    assert!(batch.rejected[0].starts_with("entry 1"));
  }

  #[test]
  fn missing_file_is_an_error() {
    let err = ExportReader
      .read_source(Path::new("/nonexistent/export.json"))
      .unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
  }
}
