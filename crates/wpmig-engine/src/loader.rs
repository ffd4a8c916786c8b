//! Loader: source collaborator → typed source records.
//!
//! This is the boundary where stringly legacy fields become typed data.
//! Reference attributes are turned into [`SourceRef`]s and serialized member
//! lists into roster entries, once, so no later stage re-parses them.

use std::path::Path;

use wpmig_core::{
  record::{RecordType, RosterGroup, SourceRecord},
  source::SourceReader,
};

use crate::{
  error::{Error, Result},
  report::{Outcome, RunReport},
};

/// `(owner type, legacy attribute, reference name, target type)`.
const REFERENCES: &[(RecordType, &str, &str, RecordType)] = &[
  (RecordType::Person, "_thumbnail_id", "thumbnail", RecordType::Attachment),
  (RecordType::Committee, "committee_charter", "charter", RecordType::Document),
  (RecordType::Meeting, "meeting_committee", "owning_committee", RecordType::Committee),
  (RecordType::Meeting, "meeting_agenda", "agenda", RecordType::Attachment),
  (RecordType::Meeting, "meeting_minutes", "minutes", RecordType::Attachment),
  (RecordType::Document, "document_file", "document_file", RecordType::Attachment),
];

const ROSTERS: &[(&str, RosterGroup)] = &[
  ("committee_members", RosterGroup::Member),
  ("committee_staff", RosterGroup::Staff),
];

/// Read every record from `path`.
///
/// Fails only when the reader cannot produce anything. Entries the reader
/// rejected and records of unrecognised type are counted as skipped under
/// [`RecordType::Unknown`] and dropped.
pub fn load<R: SourceReader>(
  reader: &R,
  path: &Path,
  report: &mut RunReport,
) -> Result<Vec<SourceRecord>> {
  let batch = reader
    .read_source(path)
    .map_err(|e| Error::SourceUnreadable(Box::new(e)))?;

  for reason in batch.rejected {
    report.tick(RecordType::Unknown, Outcome::Skipped);
    report.warn(RecordType::Unknown, None, format!("rejected source entry: {reason}"));
  }

  let mut records = Vec::with_capacity(batch.records.len());
  for mut record in batch.records {
    if record.record_type == RecordType::Unknown {
      tracing::debug!(source_id = %record.source_id, "dropping record of unknown type");
      report.tick(RecordType::Unknown, Outcome::Skipped);
      continue;
    }
    prepare(&mut record, report);
    records.push(record);
  }

  tracing::info!(path = %path.display(), records = records.len(), "loaded source");
  Ok(records)
}

/// Derive typed references and rosters from the raw attributes.
pub fn prepare(record: &mut SourceRecord, report: &mut RunReport) {
  for &(owner, key, name, target) in REFERENCES {
    if owner != record.record_type {
      continue;
    }
    if let Some(reference) = record.attributes.reference(key, target) {
      record.reference_fields.insert(name.to_owned(), reference);
    }
  }

  if record.record_type == RecordType::Committee {
    for &(key, group) in ROSTERS {
      match record.attributes.roster(key, group) {
        Ok(entries) => record.roster.extend(entries),
        Err(e) => report.warn(
          RecordType::Committee,
          Some(record.title.clone()),
          format!("{e}; list ignored"),
        ),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use wpmig_core::record::SourceRef;

  use super::*;

  #[test]
  fn meeting_references_are_typed() {
    let mut meeting = SourceRecord::new(RecordType::Meeting, "5", "June");
    meeting.attributes.insert("meeting_committee", "42");
    meeting.attributes.insert("meeting_agenda", "0");
    meeting.attributes.insert("meeting_minutes", "77");

    let mut report = RunReport::new();
    prepare(&mut meeting, &mut report);

    assert_eq!(
      meeting.reference_fields.get("owning_committee"),
      Some(&SourceRef::new(RecordType::Committee, "42"))
    );
    assert!(!meeting.reference_fields.contains_key("agenda"));
    assert_eq!(
      meeting.reference_fields.get("minutes"),
      Some(&SourceRef::new(RecordType::Attachment, "77"))
    );
  }

  #[test]
  fn committee_rosters_decode_both_lists() {
    let mut committee = SourceRecord::new(RecordType::Committee, "42", "Audit");
    committee
      .attributes
      .insert("committee_members", r#"a:1:{i:12;s:5:"Chair";}"#);
    committee.attributes.insert("committee_staff", r#"{"13": "Liaison"}"#);

    let mut report = RunReport::new();
    prepare(&mut committee, &mut report);

    assert_eq!(committee.roster.len(), 2);
    assert_eq!(committee.roster[0].group, RosterGroup::Member);
    assert_eq!(committee.roster[1].person, SourceRef::new(RecordType::Person, "13"));
    assert!(report.warnings().is_empty());
  }

  #[test]
  fn malformed_roster_warns_and_is_empty() {
    let mut committee = SourceRecord::new(RecordType::Committee, "42", "Audit");
    committee.attributes.insert("committee_members", "a:1:{i:12;");

    let mut report = RunReport::new();
    prepare(&mut committee, &mut report);

    assert!(committee.roster.is_empty());
    assert_eq!(report.warnings().len(), 1);
  }
}
