//! `ReferenceIndex`: source identity → destination identity for one run.

use std::collections::HashMap;

use wpmig_core::{
  entity::{ResolvedEntity, TermId},
  record::SourceRef,
};

/// Result of looking up a source reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<'a> {
  Resolved(&'a ResolvedEntity),
  /// The record was processed but produced no destination entity.
  Unresolved,
  /// The record has not been processed (yet), or never existed.
  Unknown,
}

impl<'a> Lookup<'a> {
  pub fn entity(self) -> Option<&'a ResolvedEntity> {
    match self {
      Self::Resolved(e) => Some(e),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
  Resolved(ResolvedEntity),
  Unresolved,
}

/// Built incrementally, stage by stage. Lookups never fail: anything not
/// resolved comes back as [`Lookup::Unresolved`] or [`Lookup::Unknown`].
#[derive(Debug, Default)]
pub struct ReferenceIndex {
  records: HashMap<SourceRef, Slot>,
  /// `(taxonomy, name)` → term created or found in this run.
  terms:   HashMap<(String, String), TermId>,
}

impl ReferenceIndex {
  pub fn resolve(&mut self, source: SourceRef, entity: ResolvedEntity) {
    self.records.insert(source, Slot::Resolved(entity));
  }

  /// Record that `source` was seen and deliberately left unresolved. Does not
  /// overwrite an earlier resolution of the same reference.
  pub fn mark_unresolved(&mut self, source: SourceRef) {
    self.records.entry(source).or_insert(Slot::Unresolved);
  }

  pub fn lookup(&self, source: &SourceRef) -> Lookup<'_> {
    match self.records.get(source) {
      Some(Slot::Resolved(e)) => Lookup::Resolved(e),
      Some(Slot::Unresolved) => Lookup::Unresolved,
      None => Lookup::Unknown,
    }
  }

  pub fn get(&self, source: &SourceRef) -> Option<&ResolvedEntity> {
    self.lookup(source).entity()
  }

  pub fn cached_term(&self, taxonomy: &str, name: &str) -> Option<TermId> {
    self.terms.get(&(taxonomy.to_owned(), name.to_owned())).copied()
  }

  pub fn cache_term(&mut self, taxonomy: &str, name: &str, id: TermId) {
    self.terms.insert((taxonomy.to_owned(), name.to_owned()), id);
  }
}

#[cfg(test)]
mod tests {
  use wpmig_core::{entity::PostId, record::RecordType};

  use super::*;

  #[test]
  fn lookups_distinguish_unresolved_from_unknown() {
    let mut index = ReferenceIndex::default();
    let ada = SourceRef::new(RecordType::Person, "1");
    let bob = SourceRef::new(RecordType::Person, "2");

    index.resolve(ada.clone(), ResolvedEntity::post(PostId(10), "Ada"));
    index.mark_unresolved(bob.clone());

    assert_eq!(index.get(&ada).and_then(ResolvedEntity::as_post), Some(PostId(10)));
    assert_eq!(index.lookup(&bob), Lookup::Unresolved);
    assert_eq!(
      index.lookup(&SourceRef::new(RecordType::Person, "3")),
      Lookup::Unknown
    );
    // Same id, different type.
    assert_eq!(
      index.lookup(&SourceRef::new(RecordType::Committee, "1")),
      Lookup::Unknown
    );
  }

  #[test]
  fn unresolved_never_overwrites_resolved() {
    let mut index = ReferenceIndex::default();
    let ada = SourceRef::new(RecordType::Person, "1");
    index.resolve(ada.clone(), ResolvedEntity::post(PostId(10), "Ada"));
    index.mark_unresolved(ada.clone());
    assert_eq!(index.get(&ada).and_then(ResolvedEntity::as_post), Some(PostId(10)));
  }
}
