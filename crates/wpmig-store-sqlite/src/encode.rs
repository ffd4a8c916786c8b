//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Post timestamps are stored as `%Y-%m-%d %H:%M:%S` strings, the format the
//! legacy site used. Field and option values are stored as compact JSON.

use chrono::NaiveDateTime;
use wpmig_core::{
  entity::{FieldOwner, Media, MediaId, Post, PostId, Term, TermId},
  record::PostStatus,
};

use crate::{Error, Result};

// ─── NaiveDateTime ───────────────────────────────────────────────────────────

const DT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn encode_dt(dt: NaiveDateTime) -> String { dt.format(DT_FORMAT).to_string() }

pub fn decode_dt(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, DT_FORMAT).map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Field owner ─────────────────────────────────────────────────────────────

pub fn encode_owner(owner: FieldOwner) -> (&'static str, i64) {
  match owner {
    FieldOwner::Post(id) => ("post", id.0),
    FieldOwner::Term(id) => ("term", id.0),
  }
}

// ─── Slugs ───────────────────────────────────────────────────────────────────

/// Lowercase ASCII alphanumerics joined by single dashes.
pub fn slugify(title: &str) -> String {
  let mut slug = String::with_capacity(title.len());
  let mut dash = false;
  for c in title.chars() {
    if c.is_ascii_alphanumeric() {
      if dash && !slug.is_empty() {
        slug.push('-');
      }
      dash = false;
      slug.push(c.to_ascii_lowercase());
    } else {
      dash = true;
    }
  }
  if slug.is_empty() { "untitled".to_owned() } else { slug }
}

/// Reduce a caller-supplied name to a single safe path component.
pub fn sanitize_file_name(name: &str) -> Option<String> {
  let base = name.rsplit(['/', '\\']).next()?.trim();
  let (stem, ext) = match base.rsplit_once('.') {
    Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
    _ => (base, None),
  };
  let stem = clean_file_part(stem);
  let ext = ext.map(clean_file_part).filter(|e| !e.is_empty());
  match (stem.is_empty(), ext) {
    (false, Some(ext)) => Some(format!("{stem}.{ext}")),
    (false, None) => Some(stem),
    // Nothing ASCII survived in the stem.
    (true, Some(ext)) => Some(format!("file.{ext}")),
    (true, None) => None,
  }
}

fn clean_file_part(part: &str) -> String {
  let cleaned: String = part
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '-' }
    })
    .collect();
  cleaned.trim_matches(|c| c == '.' || c == '-').to_owned()
}

/// Accept only `YYYY/MM`.
pub fn valid_upload_date(s: &str) -> bool {
  let b = s.as_bytes();
  b.len() == 7
    && b[4] == b'/'
    && b[..4].iter().chain(&b[5..]).all(u8::is_ascii_digit)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `posts` row.
pub struct RawPost {
  pub post_id:    i64,
  pub post_type:  String,
  pub title:      String,
  pub body:       String,
  pub status:     String,
  pub created_at: Option<String>,
}

impl RawPost {
  pub const COLUMNS: &'static str =
    "p.post_id, p.post_type, p.title, p.body, p.status, p.created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      post_id:    row.get(0)?,
      post_type:  row.get(1)?,
      title:      row.get(2)?,
      body:       row.get(3)?,
      status:     row.get(4)?,
      created_at: row.get(5)?,
    })
  }

  pub fn into_post(self) -> Result<Post> {
    Ok(Post {
      id:         PostId(self.post_id),
      post_type:  self.post_type,
      title:      self.title,
      body:       self.body,
      status:     PostStatus::from(self.status.as_str()),
      created_at: self.created_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Raw values read directly from a `terms` row.
pub struct RawTerm {
  pub term_id:     i64,
  pub taxonomy:    String,
  pub name:        String,
  pub description: String,
}

impl RawTerm {
  pub const COLUMNS: &'static str = "t.term_id, t.taxonomy, t.name, t.description";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      term_id:     row.get(0)?,
      taxonomy:    row.get(1)?,
      name:        row.get(2)?,
      description: row.get(3)?,
    })
  }

  pub fn into_term(self) -> Term {
    Term {
      id:          TermId(self.term_id),
      taxonomy:    self.taxonomy,
      name:        self.name,
      description: self.description,
    }
  }
}

/// Raw values read directly from a `media` row.
pub struct RawMedia {
  pub media_id:     i64,
  pub file_path:    String,
  pub mime_type:    String,
  pub source_url:   String,
  pub content_hash: String,
}

impl RawMedia {
  pub fn into_media(self) -> Media {
    Media {
      id:           MediaId(self.media_id),
      file_path:    self.file_path,
      mime_type:    self.mime_type,
      source_url:   self.source_url,
      content_hash: self.content_hash,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn slugs() {
    assert_eq!(slugify("Board of Trustees — Meeting #3"), "board-of-trustees-meeting-3");
    assert_eq!(slugify("  "), "untitled");
  }

  #[test]
  fn file_names_lose_directories() {
    assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
    assert_eq!(sanitize_file_name("agenda 2015.pdf").as_deref(), Some("agenda-2015.pdf"));
    assert_eq!(sanitize_file_name(".."), None);
    assert_eq!(sanitize_file_name("minutes.2015.pdf").as_deref(), Some("minutes.2015.pdf"));
  }

  #[test]
  fn non_ascii_stem_keeps_its_extension() {
    assert_eq!(sanitize_file_name("Протокол.pdf").as_deref(), Some("file.pdf"));
    assert_eq!(sanitize_file_name("Протокол 3.pdf").as_deref(), Some("3.pdf"));
    assert_eq!(sanitize_file_name("Протокол"), None);
  }

  #[test]
  fn upload_dates() {
    assert!(valid_upload_date("2015/02"));
    assert!(!valid_upload_date("2015/2"));
    assert!(!valid_upload_date("../../x"));
  }

  #[test]
  fn datetime_round_trip() {
    let dt = decode_dt("2014-06-01 09:30:00").unwrap();
    assert_eq!(encode_dt(dt), "2014-06-01 09:30:00");
  }
}
