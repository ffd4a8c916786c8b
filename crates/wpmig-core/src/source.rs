//! The `SourceReader` trait: where legacy records come from.

use std::path::Path;

use crate::record::SourceRecord;

/// Everything a reader could decode from one source, in source order.
#[derive(Debug, Default)]
pub struct SourceBatch {
  pub records:  Vec<SourceRecord>,
  /// One diagnostic per entry that could not be decoded. Rejections are
  /// never fatal; the loader counts them as skipped.
  pub rejected: Vec<String>,
}

/// Produces source records from a legacy export.
///
/// An `Err` means nothing could be read at all (missing file, malformed
/// document); per-record problems belong in [`SourceBatch::rejected`].
pub trait SourceReader {
  type Error: std::error::Error + Send + Sync + 'static;

  fn read_source(&self, path: &Path) -> Result<SourceBatch, Self::Error>;
}
