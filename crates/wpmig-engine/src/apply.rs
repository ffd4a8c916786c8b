//! Applier: writes resolved records to the destination.
//!
//! Every write here is scoped to one record. Errors come back to the stage
//! loop, which turns them into a warning and a `failed` tick; media problems
//! are downgraded further and only cost the one attachment.

use std::{collections::HashMap, path::Path};

use serde_json::Value;
use wpmig_core::{
  entity::{FieldOwner, MediaAsset, MediaId, MediaMetadata, PostId},
  fetch::AssetFetcher,
  record::RecordType,
  store::Destination,
};

use crate::{
  context::PipelineContext,
  error::{AssetError, Error, Result},
  guard,
  index::ReferenceIndex,
  resolve::TermRequest,
};

// ─── Media cache ─────────────────────────────────────────────────────────────

/// Media stored in this run, by source url. A failed url maps to `None` and
/// is not fetched again.
#[derive(Debug, Default)]
pub struct MediaCache {
  by_url: HashMap<String, Option<MediaId>>,
}

impl MediaCache {
  pub fn get(&self, url: &str) -> Option<Option<MediaId>> { self.by_url.get(url).copied() }

  fn insert(&mut self, url: &str, media: Option<MediaId>) {
    self.by_url.insert(url.to_owned(), media);
  }
}

// ─── Applier ─────────────────────────────────────────────────────────────────

pub struct Applier<'a, D, F> {
  pub dest:    &'a D,
  pub fetcher: &'a F,
}

impl<D: Destination, F: AssetFetcher> Applier<'_, D, F> {
  /// Fetch, store and bind `asset` into `slot` on `owner`.
  pub async fn attach_media(
    &self,
    cache: &mut MediaCache,
    asset: &MediaAsset,
    owner: FieldOwner,
    slot: &str,
  ) -> Result<MediaId, AssetError> {
    let media = match cache.get(&asset.url) {
      Some(Some(id)) => id,
      Some(None) => return Err(AssetError::PreviouslyFailed(asset.url.clone())),
      None => {
        let stored = self.store_asset(asset).await;
        cache.insert(&asset.url, stored.as_ref().ok().copied());
        stored?
      }
    };

    self
      .dest
      .set_custom_field(slot, owner, Value::from(media.0))
      .await
      .map_err(|e| AssetError::Bind { slot: slot.to_owned(), source: Box::new(e) })?;
    Ok(media)
  }

  /// Download and hand one asset to the media library. The download is
  /// removed when `fetched` drops, whichever way this returns.
  async fn store_asset(&self, asset: &MediaAsset) -> Result<MediaId, AssetError> {
    let fetched = self
      .fetcher
      .fetch_remote_asset(&asset.url)
      .await
      .map_err(|source| AssetError::Fetch { url: asset.url.clone(), source })?;

    let name = media_file_name(&asset.url, &asset.title);
    let mime_type = detect_mime_type(fetched.path(), fetched.content_type.as_deref(), &name)
      .ok_or_else(|| AssetError::UnsupportedType(asset.url.clone()))?;

    let metadata = MediaMetadata {
      name,
      mime_type,
      upload_date: upload_month(&asset.url),
      title: asset.title.clone(),
      source_url: asset.url.clone(),
    };

    let id = self
      .dest
      .store_media(fetched.path(), metadata)
      .await
      .map_err(|e| AssetError::Store(Box::new(e)))?;
    tracing::debug!(url = %asset.url, media_id = %id, "stored asset");
    Ok(id)
  }

  /// [`Self::attach_media`], downgrading any failure to a report warning.
  pub async fn attach_or_warn(
    &self,
    ctx: &mut PipelineContext,
    record_type: RecordType,
    subject: &str,
    asset: &MediaAsset,
    owner: FieldOwner,
    slot: &str,
  ) -> Option<MediaId> {
    match self.attach_media(&mut ctx.media, asset, owner, slot).await {
      Ok(id) => Some(id),
      Err(e) => {
        ctx.report.warn(
          record_type,
          Some(subject.to_owned()),
          format!("{slot} omitted: {e}"),
        );
        None
      }
    }
  }

  /// Assign each requested term to `post`, creating missing terms once.
  pub async fn apply_memberships(
    &self,
    index: &mut ReferenceIndex,
    post: PostId,
    requests: &[TermRequest],
  ) -> Result<()> {
    for request in requests {
      let term = guard::ensure_term(self.dest, index, request.taxonomy, &request.name, None)
        .await?;
      self
        .dest
        .set_post_terms(post, term.id, request.taxonomy)
        .await
        .map_err(Error::store)?;
    }
    Ok(())
  }

  /// Write text fields, skipping empty values.
  pub async fn set_text_fields(
    &self,
    owner: FieldOwner,
    fields: &[(&str, Option<String>)],
  ) -> Result<()> {
    for (key, value) in fields {
      let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
        continue;
      };
      self
        .dest
        .set_custom_field(key, owner, Value::from(value))
        .await
        .map_err(Error::store)?;
    }
    Ok(())
  }
}

/// An integer stored either as a JSON number or as its decimal string, the
/// way legacy id fields were saved.
pub fn integer_value(value: &Value) -> Option<i64> {
  match value {
    Value::Number(n) => n.as_i64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

// ─── File naming and typing ──────────────────────────────────────────────────

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpe", "jpeg", "gif", "png"];

const MIME_BY_EXTENSION: &[(&str, &str)] = &[
  ("jpg", "image/jpeg"),
  ("jpe", "image/jpeg"),
  ("jpeg", "image/jpeg"),
  ("gif", "image/gif"),
  ("png", "image/png"),
  ("pdf", "application/pdf"),
  ("doc", "application/msword"),
  ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
  ("xls", "application/vnd.ms-excel"),
  ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
  ("ppt", "application/vnd.ms-powerpoint"),
  ("pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
  ("rtf", "application/rtf"),
  ("txt", "text/plain"),
  ("csv", "text/csv"),
  ("mp3", "audio/mpeg"),
  ("mp4", "video/mp4"),
  ("zip", "application/zip"),
];

/// Last path segment of `url`, without query or fragment.
fn url_basename(url: &str) -> &str {
  let path = url.split(['?', '#']).next().unwrap_or(url);
  path.rsplit('/').next().unwrap_or(path)
}

fn extension(name: &str) -> Option<String> {
  let (stem, ext) = name.rsplit_once('.')?;
  (!stem.is_empty() && !ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// Name to store a download under: images keep their url basename, anything
/// else takes the attachment title plus the url's extension.
pub fn media_file_name(url: &str, title: &str) -> String {
  let basename = url_basename(url);
  let ext = extension(basename);

  let is_image = ext.as_deref().is_some_and(|e| IMAGE_EXTENSIONS.contains(&e));
  let title = title.trim();
  if is_image || title.is_empty() {
    return basename.to_owned();
  }
  match ext {
    Some(ext) if !title.to_ascii_lowercase().ends_with(&format!(".{ext}")) => {
      format!("{title}.{ext}")
    }
    _ => title.to_owned(),
  }
}

/// File type from content, then the transport's header, then the extension.
pub fn detect_mime_type(path: &Path, content_type: Option<&str>, name: &str) -> Option<String> {
  if let Ok(Some(kind)) = infer::get_from_path(path) {
    return Some(kind.mime_type().to_owned());
  }

  let header = content_type
    .and_then(|ct| ct.split(';').next())
    .map(str::trim)
    .filter(|ct| !ct.is_empty() && *ct != "application/octet-stream");
  if let Some(ct) = header {
    return Some(ct.to_owned());
  }

  let ext = extension(name)?;
  MIME_BY_EXTENSION
    .iter()
    .find(|(e, _)| *e == ext)
    .map(|(_, mime)| (*mime).to_owned())
}

/// The first `YYYY/MM` segment pair in `url`, as the legacy upload folders
/// were named.
pub fn upload_month(url: &str) -> Option<String> {
  let b = url.as_bytes();
  (0..b.len().saturating_sub(6)).find_map(|i| {
    let w = &b[i..i + 7];
    let digits = w[..4].iter().chain(&w[5..]).all(u8::is_ascii_digit);
    (digits && w[4] == b'/').then(|| url[i..i + 7].to_owned())
  })
}

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use super::*;

  #[test]
  fn images_keep_their_basename() {
    assert_eq!(
      media_file_name("http://old.example/wp-content/uploads/2014/06/Ada.JPG?v=2", "Ada"),
      "Ada.JPG"
    );
  }

  #[test]
  fn documents_take_the_title() {
    assert_eq!(
      media_file_name("http://old.example/uploads/2015/02/a81.pdf", "June Agenda"),
      "June Agenda.pdf"
    );
    assert_eq!(
      media_file_name("http://old.example/uploads/2015/02/a81.pdf", "agenda.pdf"),
      "agenda.pdf"
    );
    assert_eq!(media_file_name("http://old.example/uploads/a81.pdf", " "), "a81.pdf");
  }

  #[test]
  fn integer_values_accept_strings() {
    assert_eq!(integer_value(&Value::from(42)), Some(42));
    assert_eq!(integer_value(&Value::from(" 17 ")), Some(17));
    assert_eq!(integer_value(&Value::from("n/a")), None);
    assert_eq!(integer_value(&Value::Null), None);
  }

  #[test]
  fn upload_month_is_found_anywhere() {
    assert_eq!(
      upload_month("http://old.example/wp-content/uploads/2015/02/a.pdf").as_deref(),
      Some("2015/02")
    );
    assert_eq!(upload_month("http://old.example/files/a.pdf"), None);
    assert_eq!(upload_month("2015/0"), None);
  }

  #[test]
  fn mime_from_content_then_extension() {
    let mut png = tempfile::NamedTempFile::new().unwrap();
    png
      .write_all(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0])
      .unwrap();
    assert_eq!(
      detect_mime_type(png.path(), None, "x.pdf").as_deref(),
      Some("image/png")
    );

    let blank = tempfile::NamedTempFile::new().unwrap();
    assert_eq!(
      detect_mime_type(blank.path(), Some("application/octet-stream"), "minutes.docx")
        .as_deref(),
      Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
    );
    assert_eq!(
      detect_mime_type(blank.path(), Some("text/plain; charset=utf-8"), "x").as_deref(),
      Some("text/plain")
    );
    assert_eq!(detect_mime_type(blank.path(), None, "mystery"), None);
  }
}
