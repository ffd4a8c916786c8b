//! Classifier: flat record list → per-type buckets plus lookup indices.

use std::collections::{BTreeMap, HashMap};

use wpmig_core::{
  entity::MediaAsset,
  record::{RecordType, SourceId, SourceRecord, SourceRef},
};

/// Records partitioned by type, in source order within each type.
#[derive(Debug, Default)]
pub struct TypedBuckets {
  buckets:        BTreeMap<RecordType, Vec<SourceRecord>>,
  /// `(type, source_id)` → position in that type's bucket.
  positions:      HashMap<SourceRef, usize>,
  /// Document id → id of the attachment holding its file.
  document_files: HashMap<SourceId, SourceId>,
}

/// Partition `records` by type and build the lookup indices.
///
/// A later record with the same `(type, source_id)` as an earlier one stays
/// in its bucket but does not replace the earlier one in the index.
pub fn classify(records: Vec<SourceRecord>) -> TypedBuckets {
  let mut out = TypedBuckets::default();

  for record in records {
    if record.record_type == RecordType::Document {
      if let Some(file) = record.reference_fields.get("document_file") {
        out
          .document_files
          .entry(record.source_id.clone())
          .or_insert_with(|| file.source_id.clone());
      }
    }

    let bucket = out.buckets.entry(record.record_type).or_default();
    out.positions.entry(record.source_ref()).or_insert(bucket.len());
    bucket.push(record);
  }

  tracing::debug!(
    types = out.buckets.len(),
    documents = out.document_files.len(),
    "classified records"
  );
  out
}

impl TypedBuckets {
  /// The records of one type, in source order.
  pub fn bucket(&self, record_type: RecordType) -> &[SourceRecord] {
    self.buckets.get(&record_type).map(Vec::as_slice).unwrap_or_default()
  }

  /// Remove and return the records of one type. The index keeps pointing at
  /// them by position only, so lookups for that type return `None` after.
  pub fn take(&mut self, record_type: RecordType) -> Vec<SourceRecord> {
    self.buckets.remove(&record_type).unwrap_or_default()
  }

  /// Look up a record by its typed reference.
  pub fn record(&self, reference: &SourceRef) -> Option<&SourceRecord> {
    let &pos = self.positions.get(reference)?;
    self.buckets.get(&reference.record_type)?.get(pos)
  }

  /// The attachment record holding a document's file.
  pub fn attachment_for_document(&self, document: &SourceId) -> Option<&SourceRecord> {
    let file = self.document_files.get(document)?;
    self.record(&SourceRef { record_type: RecordType::Attachment, source_id: file.clone() })
  }

  /// The fetchable asset behind an attachment or document reference.
  pub fn asset(&self, reference: &SourceRef) -> Option<MediaAsset> {
    let attachment = match reference.record_type {
      RecordType::Attachment => self.record(reference)?,
      RecordType::Document => self.attachment_for_document(&reference.source_id)?,
      _ => return None,
    };
    MediaAsset::from_record(attachment)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn attachment(id: &str, url: &str) -> SourceRecord {
    let mut r = SourceRecord::new(RecordType::Attachment, id, format!("file {id}"));
    r.url = Some(url.into());
    r
  }

  #[test]
  fn buckets_keep_source_order() {
    let records = vec![
      SourceRecord::new(RecordType::Meeting, "1", "B"),
      SourceRecord::new(RecordType::Person, "1", "Ada"),
      SourceRecord::new(RecordType::Meeting, "2", "A"),
    ];
    let buckets = classify(records);
    let titles: Vec<_> = buckets
      .bucket(RecordType::Meeting)
      .iter()
      .map(|r| r.title.as_str())
      .collect();
    assert_eq!(titles, ["B", "A"]);
    assert!(buckets.bucket(RecordType::Committee).is_empty());
  }

  #[test]
  fn same_id_in_two_types_is_not_conflated() {
    let buckets = classify(vec![
      SourceRecord::new(RecordType::Meeting, "7", "Meeting seven"),
      SourceRecord::new(RecordType::Person, "7", "Person seven"),
    ]);
    let person = buckets.record(&SourceRef::new(RecordType::Person, "7")).unwrap();
    assert_eq!(person.title, "Person seven");
    let meeting = buckets.record(&SourceRef::new(RecordType::Meeting, "7")).unwrap();
    assert_eq!(meeting.title, "Meeting seven");
  }

  #[test]
  fn documents_resolve_to_their_attachment() {
    let mut doc = SourceRecord::new(RecordType::Document, "20", "Charter");
    doc
      .reference_fields
      .insert("document_file".into(), SourceRef::new(RecordType::Attachment, "21"));

    let buckets = classify(vec![
      doc,
      attachment("21", "http://old.example/wp-content/uploads/2014/01/charter.pdf"),
    ]);

    let asset = buckets.asset(&SourceRef::new(RecordType::Document, "20")).unwrap();
    assert_eq!(asset.source, SourceRef::new(RecordType::Attachment, "21"));
    assert!(buckets.asset(&SourceRef::new(RecordType::Document, "99")).is_none());
    assert!(buckets.asset(&SourceRef::new(RecordType::Person, "21")).is_none());
  }

  #[test]
  fn take_empties_the_bucket() {
    let mut buckets = classify(vec![SourceRecord::new(RecordType::Person, "1", "Ada")]);
    assert_eq!(buckets.take(RecordType::Person).len(), 1);
    assert!(buckets.bucket(RecordType::Person).is_empty());
    assert!(buckets.record(&SourceRef::new(RecordType::Person, "1")).is_none());
  }
}
