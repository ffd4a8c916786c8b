//! The `AssetFetcher` trait: downloads remote media to a temporary file.

use std::{future::Future, path::Path};

use tempfile::TempPath;
use thiserror::Error;

/// A downloaded file. The file is removed when this value is dropped, so a
/// failure anywhere downstream never leaves a partial download behind.
#[derive(Debug)]
pub struct FetchedAsset {
  pub path:         TempPath,
  /// `Content-Type` reported by the transport, if any.
  pub content_type: Option<String>,
}

impl FetchedAsset {
  pub fn path(&self) -> &Path { &self.path }
}

#[derive(Debug, Error)]
pub enum FetchError {
  #[error("unreachable: {0}")]
  Unreachable(String),

  #[error("server answered {0}")]
  Status(u16),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

pub trait AssetFetcher: Send + Sync {
  /// Download `url` into a fresh temporary file. One attempt, no retry.
  fn fetch_remote_asset<'a>(
    &'a self,
    url: &'a str,
  ) -> impl Future<Output = Result<FetchedAsset, FetchError>> + Send + 'a;
}
