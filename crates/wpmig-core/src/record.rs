//! Source records, the items read from the legacy site.
//!
//! A record is a flat bag of legacy fields. Everything that later stages need
//! in typed form (references, member lists, dates) is decoded here, at the
//! boundary, through the accessors on [`Attributes`].

use std::{collections::BTreeMap, fmt};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, legacy};

// ─── Record type ─────────────────────────────────────────────────────────────

/// The declared type of a source record.
///
/// Derived ordering is the declaration order, which is also the order in
/// which the report lists types.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecordType {
  Person,
  Committee,
  Meeting,
  Attachment,
  Document,
  DegreeType,
  Department,
  OrgGroup,
  Publication,
  /// Anything the legacy site exported that neither tool understands.
  Unknown,
}

impl RecordType {
  /// Map a legacy post type string; unrecognised types become `Unknown`.
  pub fn from_post_type(post_type: &str) -> Self {
    post_type.parse().unwrap_or(Self::Unknown)
  }

  /// Plural noun used in progress and summary lines.
  pub fn plural(self) -> &'static str {
    match self {
      Self::Person => "people",
      Self::Committee => "committees",
      Self::Meeting => "meetings",
      Self::Attachment => "attachments",
      Self::Document => "documents",
      Self::DegreeType => "degree types",
      Self::Department => "departments",
      Self::OrgGroup => "organization groups",
      Self::Publication => "publications",
      Self::Unknown => "unrecognised records",
    }
  }
}

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Opaque identifier assigned by the legacy site. Unique only within one
/// [`RecordType`].
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SourceId(pub String);

impl SourceId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for SourceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// A pointer to another source record. Always carries the target's type so
/// ids from different namespaces are never conflated.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SourceRef {
  pub record_type: RecordType,
  pub source_id:   SourceId,
}

impl SourceRef {
  pub fn new(record_type: RecordType, source_id: impl Into<String>) -> Self {
    Self { record_type, source_id: SourceId::new(source_id) }
  }
}

impl fmt::Display for SourceRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} #{}", self.record_type, self.source_id)
  }
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// Publication status of a legacy record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PostStatus {
  #[default]
  Published,
  Draft,
  /// Any other legacy status (`private`, `future`, `trash`, …), kept verbatim.
  Other(String),
}

impl PostStatus {
  pub fn as_str(&self) -> &str {
    match self {
      Self::Published => "publish",
      Self::Draft => "draft",
      Self::Other(s) => s,
    }
  }

  pub fn is_published(&self) -> bool { matches!(self, Self::Published) }
}

impl From<&str> for PostStatus {
  fn from(s: &str) -> Self {
    match s {
      "publish" => Self::Published,
      "draft" => Self::Draft,
      other => Self::Other(other.to_owned()),
    }
  }
}

// ─── Memberships ─────────────────────────────────────────────────────────────

/// A `(taxonomy, term name)` pair attached to a record in the legacy site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermMembership {
  pub domain: String,
  pub name:   String,
}

/// The title a person holds within a committee, e.g. "Chair".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleLabel(pub String);

/// Which legacy list a roster entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RosterGroup {
  Member,
  Staff,
}

/// One decoded entry of a committee's member or staff list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
  pub person: SourceRef,
  pub role:   RoleLabel,
  pub group:  RosterGroup,
}

// ─── Attributes ──────────────────────────────────────────────────────────────

/// The flattened custom-field set of a legacy record.
///
/// Values are raw strings; use the typed accessors rather than parsing
/// ad hoc downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
  pub fn new() -> Self { Self::default() }

  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
    self.0.insert(key.into(), value.into());
  }

  /// The raw value, exactly as exported.
  pub fn get(&self, key: &str) -> Option<&str> {
    self.0.get(key).map(String::as_str)
  }

  /// The value trimmed of whitespace; empty values count as absent.
  pub fn non_empty(&self, key: &str) -> Option<&str> {
    self.get(key).map(str::trim).filter(|v| !v.is_empty())
  }

  /// A legacy post id. Empty values and `0` (the legacy "unset") are absent.
  pub fn source_id(&self, key: &str) -> Option<SourceId> {
    self
      .non_empty(key)
      .filter(|v| *v != "0")
      .map(SourceId::new)
  }

  /// A typed reference to a record of `target` type stored under `key`.
  pub fn reference(&self, key: &str, target: RecordType) -> Option<SourceRef> {
    self
      .source_id(key)
      .map(|source_id| SourceRef { record_type: target, source_id })
  }

  /// A calendar date in one of the legacy formats.
  pub fn date(&self, key: &str) -> Result<Option<NaiveDate>> {
    self
      .non_empty(key)
      .map(|v| {
        parse_legacy_date(v).ok_or_else(|| Error::InvalidTemporal {
          key:   key.to_owned(),
          value: v.to_owned(),
        })
      })
      .transpose()
  }

  /// A wall-clock time in one of the legacy formats.
  pub fn time(&self, key: &str) -> Result<Option<NaiveTime>> {
    self
      .non_empty(key)
      .map(|v| {
        parse_legacy_time(v).ok_or_else(|| Error::InvalidTemporal {
          key:   key.to_owned(),
          value: v.to_owned(),
        })
      })
      .transpose()
  }

  /// Decode a legacy `person id => role` list stored under `key`.
  pub fn roster(&self, key: &str, group: RosterGroup) -> Result<Vec<RosterEntry>> {
    let Some(raw) = self.non_empty(key) else {
      return Ok(Vec::new());
    };
    let pairs = legacy::decode_id_map(raw).map_err(|reason| {
      Error::MalformedRoster { key: key.to_owned(), reason }
    })?;
    Ok(
      pairs
        .into_iter()
        .map(|(id, role)| RosterEntry {
          person: SourceRef::new(RecordType::Person, id),
          role: RoleLabel(role),
          group,
        })
        .collect(),
    )
  }
}

impl FromIterator<(String, String)> for Attributes {
  fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

// ─── Legacy temporal formats ─────────────────────────────────────────────────

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d", "%m/%d/%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const TIME_FORMATS: &[&str] =
  &["%H:%M", "%H:%M:%S", "%I:%M %p", "%I:%M%p", "%I:%M:%S %p"];

/// Parse a date using the strict set of formats the legacy site produced.
pub fn parse_legacy_date(s: &str) -> Option<NaiveDate> {
  let s = s.trim();
  DATE_FORMATS
    .iter()
    .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
    .or_else(|| parse_legacy_datetime(s).map(|dt| dt.date()))
}

/// Parse a time of day using the strict set of legacy formats.
pub fn parse_legacy_time(s: &str) -> Option<NaiveTime> {
  let s = s.trim();
  TIME_FORMATS
    .iter()
    .find_map(|f| NaiveTime::parse_from_str(s, f).ok())
    .or_else(|| parse_legacy_datetime(s).map(|dt| dt.time()))
}

/// Parse a full timestamp (`post_date` and friends).
pub fn parse_legacy_datetime(s: &str) -> Option<NaiveDateTime> {
  let s = s.trim();
  DATETIME_FORMATS
    .iter()
    .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
}

// ─── SourceRecord ────────────────────────────────────────────────────────────

/// One item read from the legacy export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
  pub source_id:        SourceId,
  pub record_type:      RecordType,
  pub title:            String,
  pub body:             String,
  pub status:           PostStatus,
  pub created_at:       Option<NaiveDateTime>,
  /// Remote location of the file; only attachments carry one.
  pub url:              Option<String>,
  pub attributes:       Attributes,
  pub term_memberships: Vec<TermMembership>,
  /// Logical reference name → referenced record.
  #[serde(default)]
  pub reference_fields: BTreeMap<String, SourceRef>,
  /// Decoded committee member and staff lists.
  #[serde(default)]
  pub roster:           Vec<RosterEntry>,
}

impl SourceRecord {
  /// A bare record with every optional field empty.
  pub fn new(
    record_type: RecordType,
    source_id: impl Into<String>,
    title: impl Into<String>,
  ) -> Self {
    Self {
      source_id: SourceId::new(source_id),
      record_type,
      title: title.into(),
      body: String::new(),
      status: PostStatus::Published,
      created_at: None,
      url: None,
      attributes: Attributes::new(),
      term_memberships: Vec::new(),
      reference_fields: BTreeMap::new(),
      roster: Vec::new(),
    }
  }

  pub fn source_ref(&self) -> SourceRef {
    SourceRef {
      record_type: self.record_type,
      source_id:   self.source_id.clone(),
    }
  }

  /// The record's natural key; `None` when the title is blank.
  pub fn natural_key(&self) -> Option<&str> {
    Some(self.title.trim()).filter(|t| !t.is_empty())
  }

  /// Names of the terms this record holds in the legacy `domain` taxonomy.
  pub fn terms_in<'a>(&'a self, domain: &'a str) -> impl Iterator<Item = &'a str> {
    self
      .term_memberships
      .iter()
      .filter(move |m| m.domain == domain)
      .map(|m| m.name.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn attrs(pairs: &[(&str, &str)]) -> Attributes {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect()
  }

  #[test]
  fn unknown_post_type_maps_to_unknown() {
    assert_eq!(RecordType::from_post_type("person"), RecordType::Person);
    assert_eq!(RecordType::from_post_type("nav_menu_item"), RecordType::Unknown);
  }

  #[test]
  fn zero_and_blank_ids_are_absent() {
    let a = attrs(&[("a", "0"), ("b", "  "), ("c", "42")]);
    assert_eq!(a.source_id("a"), None);
    assert_eq!(a.source_id("b"), None);
    assert_eq!(a.source_id("missing"), None);
    assert_eq!(
      a.reference("c", RecordType::Committee),
      Some(SourceRef::new(RecordType::Committee, "42"))
    );
  }

  #[test]
  fn legacy_dates_parse() {
    let want = NaiveDate::from_ymd_opt(2016, 3, 9).unwrap();
    assert_eq!(parse_legacy_date("2016-03-09"), Some(want));
    assert_eq!(parse_legacy_date("20160309"), Some(want));
    assert_eq!(parse_legacy_date("03/09/2016"), Some(want));
    assert_eq!(parse_legacy_date("2016-03-09 10:00:00"), Some(want));
    assert_eq!(parse_legacy_date("next tuesday"), None);
  }

  #[test]
  fn legacy_times_parse() {
    let want = NaiveTime::from_hms_opt(14, 30, 0).unwrap();
    assert_eq!(parse_legacy_time("14:30"), Some(want));
    assert_eq!(parse_legacy_time("2:30 PM"), Some(want));
    assert_eq!(parse_legacy_time("2:30pm"), Some(want));
    assert_eq!(parse_legacy_time("half past two"), None);
  }

  #[test]
  fn malformed_date_is_a_field_error() {
    let a = attrs(&[("meeting_date", "32/13/2016")]);
    assert!(matches!(
      a.date("meeting_date"),
      Err(Error::InvalidTemporal { .. })
    ));
    assert_eq!(a.date("missing"), Ok(None));
  }

  #[test]
  fn roster_decodes_serialized_blob() {
    let a = attrs(&[(
      "committee_members",
      r#"a:2:{i:12;s:5:"Chair";i:40;s:6:"Member";}"#,
    )]);
    let roster = a.roster("committee_members", RosterGroup::Member).unwrap();
    assert_eq!(roster.len(), 2);
    assert_eq!(roster[0].person, SourceRef::new(RecordType::Person, "12"));
    assert_eq!(roster[0].role, RoleLabel("Chair".into()));
    assert_eq!(roster[1].group, RosterGroup::Member);
  }

  #[test]
  fn natural_key_rejects_blank_titles() {
    let r = SourceRecord::new(RecordType::Person, "1", "   ");
    assert_eq!(r.natural_key(), None);
  }
}
