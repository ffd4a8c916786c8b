//! Destination-side identities and read models.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::record::{PostStatus, RecordType, SourceRecord, SourceRef};

// ─── Identifiers ─────────────────────────────────────────────────────────────

macro_rules! id_type {
  ($(#[$m:meta])* $name:ident) => {
    $(#[$m])*
    #[derive(
      Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
      Deserialize,
    )]
    #[serde(transparent)]
    pub struct $name(pub i64);

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
      }
    }
  };
}

id_type!(
  /// Platform-assigned id of a post (of any post type).
  PostId
);
id_type!(
  /// Platform-assigned id of a taxonomy term.
  TermId
);
id_type!(
  /// Platform-assigned id of an item in the media library.
  MediaId
);

/// The three kinds of entity the tools create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
  Post,
  Term,
  Media,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum DestinationId {
  Post(PostId),
  Term(TermId),
  Media(MediaId),
}

impl DestinationId {
  pub fn kind(self) -> EntityKind {
    match self {
      Self::Post(_) => EntityKind::Post,
      Self::Term(_) => EntityKind::Term,
      Self::Media(_) => EntityKind::Media,
    }
  }
}

impl fmt::Display for DestinationId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Post(id) => write!(f, "post {id}"),
      Self::Term(id) => write!(f, "term {id}"),
      Self::Media(id) => write!(f, "media {id}"),
    }
  }
}

// ─── ResolvedEntity ──────────────────────────────────────────────────────────

/// The destination-side result of creating or reusing an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEntity {
  pub destination_id: DestinationId,
  /// The title or name used for existence matching.
  pub natural_key:    String,
}

impl ResolvedEntity {
  pub fn post(id: PostId, natural_key: impl Into<String>) -> Self {
    Self { destination_id: DestinationId::Post(id), natural_key: natural_key.into() }
  }

  pub fn term(id: TermId, natural_key: impl Into<String>) -> Self {
    Self { destination_id: DestinationId::Term(id), natural_key: natural_key.into() }
  }

  pub fn kind(&self) -> EntityKind { self.destination_id.kind() }

  pub fn as_post(&self) -> Option<PostId> {
    match self.destination_id {
      DestinationId::Post(id) => Some(id),
      _ => None,
    }
  }

  pub fn as_term(&self) -> Option<TermId> {
    match self.destination_id {
      DestinationId::Term(id) => Some(id),
      _ => None,
    }
  }
}

// ─── Media ───────────────────────────────────────────────────────────────────

/// An attachment record paired with its remote location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
  pub source: SourceRef,
  pub url:    String,
  pub title:  String,
}

impl MediaAsset {
  /// `None` unless the record is an attachment with a non-empty url.
  pub fn from_record(record: &SourceRecord) -> Option<Self> {
    if record.record_type != RecordType::Attachment {
      return None;
    }
    let url = record.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
    Some(Self {
      source: record.source_ref(),
      url:    url.to_owned(),
      title:  record.title.clone(),
    })
  }
}

/// Descriptive data handed to the media library with a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaMetadata {
  /// File name to store under.
  pub name:        String,
  pub mime_type:   String,
  /// `YYYY/MM` upload folder carried over from the legacy url, if any.
  pub upload_date: Option<String>,
  pub title:       String,
  pub source_url:  String,
}

/// An item in the destination media library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
  pub id:           MediaId,
  pub file_path:    String,
  pub mime_type:    String,
  pub source_url:   String,
  pub content_hash: String,
}

// ─── Custom fields ───────────────────────────────────────────────────────────

/// The entity a custom field value is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum FieldOwner {
  Post(PostId),
  Term(TermId),
}

impl From<PostId> for FieldOwner {
  fn from(id: PostId) -> Self { Self::Post(id) }
}

impl From<TermId> for FieldOwner {
  fn from(id: TermId) -> Self { Self::Term(id) }
}

// ─── Posts & terms ───────────────────────────────────────────────────────────

/// A post as stored on the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
  pub id:         PostId,
  pub post_type:  String,
  pub title:      String,
  pub body:       String,
  pub status:     PostStatus,
  pub created_at: Option<NaiveDateTime>,
}

/// Input to [`crate::store::Destination::create_post`].
#[derive(Debug, Clone)]
pub struct NewPost {
  pub post_type:  String,
  pub title:      String,
  pub body:       String,
  pub status:     PostStatus,
  pub created_at: Option<NaiveDateTime>,
}

impl NewPost {
  /// A published post with an empty body.
  pub fn new(post_type: impl Into<String>, title: impl Into<String>) -> Self {
    Self {
      post_type:  post_type.into(),
      title:      title.into(),
      body:       String::new(),
      status:     PostStatus::Published,
      created_at: None,
    }
  }
}

/// A taxonomy term as stored on the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
  pub id:          TermId,
  pub taxonomy:    String,
  pub name:        String,
  pub description: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn media_asset_requires_attachment_with_url() {
    let mut rec = SourceRecord::new(RecordType::Attachment, "7", "Agenda");
    assert_eq!(MediaAsset::from_record(&rec), None);

    rec.url = Some("http://old.example/wp-content/uploads/2015/02/a.pdf".into());
    let asset = MediaAsset::from_record(&rec).unwrap();
    assert_eq!(asset.source, SourceRef::new(RecordType::Attachment, "7"));

    let doc = SourceRecord { record_type: RecordType::Document, ..rec };
    assert_eq!(MediaAsset::from_record(&doc), None);
  }
}
