//! HTTP asset fetcher.

use reqwest::{Client, header::CONTENT_TYPE};
use tokio::io::AsyncWriteExt as _;
use wpmig_core::fetch::{AssetFetcher, FetchError, FetchedAsset};

/// Downloads media with one plain GET per url.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpFetcher {
  client: Client,
}

impl HttpFetcher {
  pub fn new() -> anyhow::Result<Self> {
    let client = Client::builder()
      .user_agent(concat!("wpmig/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self { client })
  }
}

fn unreachable(e: reqwest::Error) -> FetchError { FetchError::Unreachable(e.to_string()) }

impl AssetFetcher for HttpFetcher {
  async fn fetch_remote_asset(&self, url: &str) -> Result<FetchedAsset, FetchError> {
    let mut resp = self.client.get(url).send().await.map_err(unreachable)?;
    if !resp.status().is_success() {
      return Err(FetchError::Status(resp.status().as_u16()));
    }
    let content_type = resp
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(str::to_owned);

    // The path is unlinked on drop, so an interrupted body leaves nothing.
    let path = tempfile::NamedTempFile::new()?.into_temp_path();
    let mut out = tokio::fs::File::create(&path).await?;
    let mut bytes = 0usize;
    while let Some(chunk) = resp.chunk().await.map_err(unreachable)? {
      out.write_all(&chunk).await?;
      bytes += chunk.len();
    }
    out.flush().await?;

    tracing::debug!(url, bytes, "downloaded asset");
    Ok(FetchedAsset { path, content_type })
  }
}
