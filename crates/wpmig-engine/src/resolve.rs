//! Reference resolver: one stage's bucket → records with their references
//! mapped onto destination identities.
//!
//! Resolution is a pure function of the bucket, the classified records and
//! the [`ReferenceIndex`] built by earlier stages. It never touches the
//! destination; anything that needs a write (term memberships) comes out as
//! a request the applier carries out.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use wpmig_core::{
  entity::{MediaAsset, PostId, ResolvedEntity},
  record::{RecordType, RosterEntry, SourceRecord},
};

use crate::{
  classify::TypedBuckets,
  index::{Lookup, ReferenceIndex},
  report::RunReport,
};

// ─── Stage state ─────────────────────────────────────────────────────────────

/// Progress of one record type through a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageState {
  #[default]
  Pending,
  Classified,
  Resolving,
  Resolved,
  /// At least one record lacked its natural key and was left out.
  PartiallyResolved,
}

// ─── Stage plans ─────────────────────────────────────────────────────────────

/// The fallback target for an entity reference that cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
  pub taxonomy: &'static str,
  pub name:     &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
  /// An entity produced by an earlier stage.
  Entity { placeholder: Option<Placeholder> },
  /// A fetchable file; documents resolve through their attachment.
  Asset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefRule {
  pub name: &'static str,
  pub kind: RefKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalKind {
  Date,
  Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalRule {
  pub key:  &'static str,
  pub kind: TemporalKind,
}

/// Legacy term domain → destination taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipRule {
  pub domain:   &'static str,
  pub taxonomy: &'static str,
}

/// What a stage needs resolved for each of its records.
#[derive(Debug, Clone, Copy)]
pub struct StagePlan {
  pub record_type: RecordType,
  pub references:  &'static [RefRule],
  pub temporals:   &'static [TemporalRule],
  pub memberships: &'static [MembershipRule],
  pub roster:      bool,
}

// ─── Output ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
  Resolved(ResolvedEntity),
  Placeholder(ResolvedEntity),
  /// Unresolvable and no placeholder applies.
  Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temporal {
  Date(NaiveDate),
  Time(NaiveTime),
}

/// A term the record should be assigned, created on demand if absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermRequest {
  pub taxonomy: &'static str,
  pub name:     String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterTarget {
  pub entry: RosterEntry,
  /// `None` when the person was skipped or never existed.
  pub post:  Option<PostId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedRefs {
  pub entities:    BTreeMap<&'static str, EntityRef>,
  pub assets:      BTreeMap<&'static str, MediaAsset>,
  pub temporals:   BTreeMap<&'static str, Temporal>,
  pub memberships: Vec<TermRequest>,
  pub roster:      Vec<RosterTarget>,
}

impl ResolvedRefs {
  /// The target of an entity reference, placeholder included.
  pub fn entity(&self, name: &str) -> Option<&ResolvedEntity> {
    match self.entities.get(name)? {
      EntityRef::Resolved(e) | EntityRef::Placeholder(e) => Some(e),
      EntityRef::Missing => None,
    }
  }

  pub fn asset(&self, name: &str) -> Option<&MediaAsset> { self.assets.get(name) }

  pub fn date(&self, key: &str) -> Option<NaiveDate> {
    match self.temporals.get(key)? {
      Temporal::Date(d) => Some(*d),
      Temporal::Time(_) => None,
    }
  }

  pub fn time(&self, key: &str) -> Option<NaiveTime> {
    match self.temporals.get(key)? {
      Temporal::Time(t) => Some(*t),
      Temporal::Date(_) => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
  Ready(ResolvedRefs),
  /// Excluded from apply.
  Partial { reason: String },
}

#[derive(Debug, Clone)]
pub struct ResolvedRecord {
  pub record:     SourceRecord,
  pub resolution: Resolution,
}

/// What a stage may consult while resolving.
#[derive(Debug, Clone, Copy)]
pub struct Dependencies<'a> {
  pub buckets: &'a TypedBuckets,
  pub index:   &'a ReferenceIndex,
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Resolve every record of one stage's bucket, in bucket order.
pub fn resolve(
  plan: &StagePlan,
  bucket: Vec<SourceRecord>,
  deps: Dependencies<'_>,
  report: &mut RunReport,
) -> (Vec<ResolvedRecord>, StageState) {
  let mut state = StageState::Resolved;
  let resolved = bucket
    .into_iter()
    .map(|record| {
      let resolution = if record.natural_key().is_none() {
        state = StageState::PartiallyResolved;
        Resolution::Partial { reason: "record has no title".to_owned() }
      } else {
        Resolution::Ready(resolve_record(plan, &record, deps, report))
      };
      ResolvedRecord { record, resolution }
    })
    .collect();
  (resolved, state)
}

fn resolve_record(
  plan: &StagePlan,
  record: &SourceRecord,
  deps: Dependencies<'_>,
  report: &mut RunReport,
) -> ResolvedRefs {
  let mut refs = ResolvedRefs::default();
  let subject = || Some(record.title.clone());

  for rule in plan.references {
    let Some(reference) = record.reference_fields.get(rule.name) else {
      if let RefKind::Entity { placeholder: Some(p) } = rule.kind {
        refs.entities.insert(rule.name, placeholder(p, deps.index, plan, record, report));
      }
      continue;
    };

    match rule.kind {
      RefKind::Entity { placeholder: fallback } => {
        let target = match deps.index.lookup(reference) {
          Lookup::Resolved(e) => EntityRef::Resolved(e.clone()),
          lookup => {
            if lookup == Lookup::Unknown {
              tracing::debug!(reference = %reference, "dangling reference");
            }
            match fallback {
              Some(p) => placeholder(p, deps.index, plan, record, report),
              None => EntityRef::Missing,
            }
          }
        };
        refs.entities.insert(rule.name, target);
      }
      RefKind::Asset => match deps.buckets.asset(reference) {
        Some(asset) => {
          refs.assets.insert(rule.name, asset);
        }
        None => report.warn(
          plan.record_type,
          subject(),
          format!("{} refers to {reference}, which has no downloadable file", rule.name),
        ),
      },
    }
  }

  for rule in plan.temporals {
    let parsed = match rule.kind {
      TemporalKind::Date => record.attributes.date(rule.key).map(|d| d.map(Temporal::Date)),
      TemporalKind::Time => record.attributes.time(rule.key).map(|t| t.map(Temporal::Time)),
    };
    match parsed {
      Ok(Some(value)) => {
        refs.temporals.insert(rule.key, value);
      }
      Ok(None) => {}
      Err(e) => report.warn(plan.record_type, subject(), format!("{e}; field left empty")),
    }
  }

  for rule in plan.memberships {
    refs.memberships.extend(record.terms_in(rule.domain).map(|name| TermRequest {
      taxonomy: rule.taxonomy,
      name:     name.to_owned(),
    }));
  }

  if plan.roster {
    for entry in &record.roster {
      let post = deps.index.get(&entry.person).and_then(ResolvedEntity::as_post);
      if post.is_none() {
        report.warn(
          plan.record_type,
          subject(),
          format!("{} ({}) was not imported; membership not assigned", entry.person, entry.role.0),
        );
      }
      refs.roster.push(RosterTarget { entry: entry.clone(), post });
    }
  }

  refs
}

fn placeholder(
  p: Placeholder,
  index: &ReferenceIndex,
  plan: &StagePlan,
  record: &SourceRecord,
  report: &mut RunReport,
) -> EntityRef {
  match index.cached_term(p.taxonomy, p.name) {
    Some(id) => EntityRef::Placeholder(ResolvedEntity::term(id, p.name)),
    None => {
      report.warn(
        plan.record_type,
        Some(record.title.clone()),
        format!("placeholder {:?} in {} is not available", p.name, p.taxonomy),
      );
      EntityRef::Missing
    }
  }
}

#[cfg(test)]
mod tests {
  use wpmig_core::{
    entity::{PostId, TermId},
    record::{RoleLabel, RosterGroup, SourceRef},
  };

  use super::*;
  use crate::classify::classify;

  const NONE: Placeholder = Placeholder { taxonomy: "people_group", name: "None" };

  const PLAN: StagePlan = StagePlan {
    record_type: RecordType::Meeting,
    references:  &[
      RefRule { name: "owning_committee", kind: RefKind::Entity { placeholder: Some(NONE) } },
      RefRule { name: "agenda", kind: RefKind::Asset },
    ],
    temporals:   &[TemporalRule { key: "meeting_date", kind: TemporalKind::Date }],
    memberships: &[],
    roster:      false,
  };

  fn meeting(id: &str, committee: Option<&str>) -> SourceRecord {
    let mut r = SourceRecord::new(RecordType::Meeting, id, format!("Meeting {id}"));
    if let Some(c) = committee {
      r.reference_fields
        .insert("owning_committee".into(), SourceRef::new(RecordType::Committee, c));
    }
    r
  }

  fn index() -> ReferenceIndex {
    let mut index = ReferenceIndex::default();
    index.cache_term("people_group", "None", TermId(1));
    index.resolve(
      SourceRef::new(RecordType::Committee, "42"),
      ResolvedEntity::term(TermId(7), "Audit"),
    );
    index.mark_unresolved(SourceRef::new(RecordType::Committee, "43"));
    index
  }

  #[test]
  fn committee_references_fall_back_to_placeholder() {
    let buckets = classify(vec![]);
    let index = index();
    let mut report = RunReport::new();
    let bucket = vec![
      meeting("1", Some("42")),
      meeting("2", Some("43")),
      meeting("3", Some("999")),
      meeting("4", None),
    ];

    let (resolved, state) =
      resolve(&PLAN, bucket, Dependencies { buckets: &buckets, index: &index }, &mut report);
    assert_eq!(state, StageState::Resolved);

    let terms: Vec<_> = resolved
      .iter()
      .map(|r| match &r.resolution {
        Resolution::Ready(refs) => refs.entity("owning_committee").and_then(|e| e.as_term()),
        Resolution::Partial { .. } => None,
      })
      .collect();
    assert_eq!(
      terms,
      [Some(TermId(7)), Some(TermId(1)), Some(TermId(1)), Some(TermId(1))]
    );
    assert!(report.warnings().is_empty());
  }

  #[test]
  fn untitled_records_are_partial() {
    let buckets = classify(vec![]);
    let index = index();
    let mut report = RunReport::new();
    let mut untitled = meeting("1", None);
    untitled.title = "  ".into();

    let (resolved, state) = resolve(
      &PLAN,
      vec![untitled, meeting("2", None)],
      Dependencies { buckets: &buckets, index: &index },
      &mut report,
    );
    assert_eq!(state, StageState::PartiallyResolved);
    assert!(matches!(resolved[0].resolution, Resolution::Partial { .. }));
    assert!(matches!(resolved[1].resolution, Resolution::Ready(_)));
  }

  #[test]
  fn bad_dates_degrade_to_none_with_warning() {
    let buckets = classify(vec![]);
    let index = index();
    let mut report = RunReport::new();
    let mut m = meeting("1", None);
    m.attributes.insert("meeting_date", "sometime in June");
    let mut ok = meeting("2", None);
    ok.attributes.insert("meeting_date", "06/01/2015");

    let (resolved, _) = resolve(
      &PLAN,
      vec![m, ok],
      Dependencies { buckets: &buckets, index: &index },
      &mut report,
    );
    let dates: Vec<_> = resolved
      .iter()
      .map(|r| match &r.resolution {
        Resolution::Ready(refs) => refs.date("meeting_date"),
        Resolution::Partial { .. } => None,
      })
      .collect();
    assert_eq!(dates, [None, NaiveDate::from_ymd_opt(2015, 6, 1)]);
    assert_eq!(report.warnings().len(), 1);
  }

  #[test]
  fn missing_asset_warns() {
    let buckets = classify(vec![]);
    let index = index();
    let mut report = RunReport::new();
    let mut m = meeting("1", None);
    m.reference_fields
      .insert("agenda".into(), SourceRef::new(RecordType::Attachment, "5"));

    let (resolved, _) = resolve(
      &PLAN,
      vec![m],
      Dependencies { buckets: &buckets, index: &index },
      &mut report,
    );
    let Resolution::Ready(refs) = &resolved[0].resolution else { panic!("not ready") };
    assert!(refs.asset("agenda").is_none());
    assert_eq!(report.warnings().len(), 1);
  }

  #[test]
  fn roster_entries_resolve_through_the_index() {
    const ROSTER_PLAN: StagePlan = StagePlan {
      record_type: RecordType::Committee,
      references:  &[],
      temporals:   &[],
      memberships: &[],
      roster:      true,
    };
    let buckets = classify(vec![]);
    let mut index = ReferenceIndex::default();
    index.resolve(
      SourceRef::new(RecordType::Person, "12"),
      ResolvedEntity::post(PostId(3), "Ada"),
    );
    let mut committee = SourceRecord::new(RecordType::Committee, "42", "Audit");
    for id in ["12", "13"] {
      committee.roster.push(RosterEntry {
        person: SourceRef::new(RecordType::Person, id),
        role:   RoleLabel("Member".into()),
        group:  RosterGroup::Member,
      });
    }

    let mut report = RunReport::new();
    let (resolved, _) = resolve(
      &ROSTER_PLAN,
      vec![committee],
      Dependencies { buckets: &buckets, index: &index },
      &mut report,
    );
    let Resolution::Ready(refs) = &resolved[0].resolution else { panic!("not ready") };
    let posts: Vec<_> = refs.roster.iter().map(|t| t.post).collect();
    assert_eq!(posts, [Some(PostId(3)), None]);
    assert_eq!(report.warnings().len(), 1);
  }
}
