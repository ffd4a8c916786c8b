//! Export document → source records.
//!
//! Pipeline:
//!   raw &str
//!     └─ RawDocument           (top level; failure here is fatal)
//!          └─ RawPost per entry (failure rejects that entry only)
//!               └─ into_record() → SourceRecord

use serde::Deserialize;
use serde_json::Value;
use wpmig_core::record::{
  Attributes, PostStatus, RecordType, SourceRecord, SourceId, TermMembership,
  parse_legacy_datetime,
};

use crate::error::{Error, Result};

// ─── Raw shapes ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawDocument {
  #[serde(default)]
  posts: Vec<Value>,
}

#[derive(Deserialize)]
struct RawPost {
  #[serde(default)]
  post_id:        Value,
  post_type:      String,
  #[serde(default)]
  post_title:     String,
  #[serde(default)]
  post_content:   String,
  #[serde(default)]
  status:         String,
  #[serde(default)]
  post_date:      Option<String>,
  #[serde(default)]
  attachment_url: Option<String>,
  #[serde(default)]
  postmeta:       Vec<RawMeta>,
  #[serde(default)]
  terms:          Vec<RawTerm>,
}

#[derive(Deserialize)]
struct RawMeta {
  key:   String,
  #[serde(default)]
  value: Value,
}

#[derive(Deserialize)]
struct RawTerm {
  domain: String,
  name:   String,
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Render a JSON scalar the way the legacy exporter wrote it: numbers and
/// strings verbatim, `null` as empty. Structured values keep their JSON text.
fn scalar_string(v: &Value) -> String {
  match v {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    Value::Bool(b) => (if *b { "1" } else { "" }).to_owned(),
    Value::Number(n) => n.to_string(),
    other => other.to_string(),
  }
}

impl RawPost {
  fn into_record(self) -> std::result::Result<SourceRecord, String> {
    let source_id = scalar_string(&self.post_id);
    if source_id.trim().is_empty() {
      return Err("post_id is empty".to_owned());
    }

    let attributes: Attributes = self
      .postmeta
      .into_iter()
      .map(|m| (m.key, scalar_string(&m.value)))
      .collect();

    Ok(SourceRecord {
      source_id: SourceId::new(source_id.trim()),
      record_type: RecordType::from_post_type(&self.post_type),
      title: self.post_title,
      body: self.post_content,
      status: PostStatus::from(self.status.as_str()),
      created_at: self.post_date.as_deref().and_then(parse_legacy_datetime),
      url: self.attachment_url.filter(|u| !u.trim().is_empty()),
      attributes,
      term_memberships: self
        .terms
        .into_iter()
        .map(|t| TermMembership { domain: t.domain, name: t.name })
        .collect(),
      reference_fields: Default::default(),
      roster: Vec::new(),
    })
  }
}

// ─── Entry points ────────────────────────────────────────────────────────────

/// Parse a whole document. The outer `Err` is fatal; each inner `Err` is one
/// rejected entry, in its source position.
pub(crate) fn parse_entries(input: &str) -> Result<Vec<Result<SourceRecord>>> {
  let doc: RawDocument = serde_json::from_str(input)?;

  Ok(
    doc
      .posts
      .into_iter()
      .enumerate()
      .map(|(index, value)| {
        serde_json::from_value::<RawPost>(value)
          .map_err(|e| e.to_string())
          .and_then(RawPost::into_record)
          .map_err(|reason| Error::Entry { index, reason })
      })
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  const DOC: &str = r#"{
    "posts": [
      {
        "post_id": 12,
        "post_type": "person",
        "post_title": "Ada Lovelace",
        "post_content": "<p>Trustee</p>",
        "status": "publish",
        "post_date": "2014-06-01 09:30:00",
        "postmeta": [
          { "key": "person_job_title", "value": "Chair" },
          { "key": "_thumbnail_id", "value": 31 }
        ],
        "terms": [ { "domain": "person_label", "name": "Trustee" } ]
      },
      { "post_type": "meeting", "post_title": "no id" },
      {
        "post_id": "31",
        "post_type": "attachment",
        "post_title": "ada",
        "status": "inherit",
        "attachment_url": "http://old.example/wp-content/uploads/2014/06/ada.jpg"
      },
      { "post_id": 99, "post_type": "nav_menu_item", "post_date": "yesterday" }
    ]
  }"#;

  #[test]
  fn decodes_entries_in_order() {
    let entries = parse_entries(DOC).unwrap();
    assert_eq!(entries.len(), 4);

    let person = entries[0].as_ref().unwrap();
    assert_eq!(person.record_type, RecordType::Person);
    assert_eq!(person.source_id.as_str(), "12");
    assert!(person.status.is_published());
    assert_eq!(person.attributes.get("_thumbnail_id"), Some("31"));
    assert_eq!(person.terms_in("person_label").collect::<Vec<_>>(), ["Trustee"]);
    assert_eq!(
      person.created_at.map(|d| d.date()),
      NaiveDate::from_ymd_opt(2014, 6, 1)
    );
  }

  #[test]
  fn malformed_entry_is_rejected_alone() {
    let entries = parse_entries(DOC).unwrap();
    assert!(matches!(entries[1], Err(Error::Entry { index: 1, .. })));

    let attachment = entries[2].as_ref().unwrap();
    assert_eq!(attachment.record_type, RecordType::Attachment);
    assert_eq!(attachment.status, PostStatus::Other("inherit".into()));
    assert!(attachment.url.is_some());
  }

  #[test]
  fn unknown_type_and_bad_date_still_decode() {
    let entries = parse_entries(DOC).unwrap();
    let other = entries[3].as_ref().unwrap();
    assert_eq!(other.record_type, RecordType::Unknown);
    assert_eq!(other.created_at, None);
  }

  #[test]
  fn broken_document_is_fatal() {
    assert!(matches!(parse_entries("{\"posts\": ["), Err(Error::Document(_))));
  }
}
