//! The `import` pipeline: legacy export → people, committees and meetings.
//!
//! Stages run strictly in dependency order. People come first so committee
//! rosters can find them; committees come before meetings so meetings can
//! find their committee. File order within the export does not matter.

use std::path::Path;

use chrono::NaiveDateTime;
use wpmig_core::{
  entity::{FieldOwner, NewPost, ResolvedEntity},
  fetch::AssetFetcher,
  record::{PostStatus, RecordType, SourceRecord},
  source::SourceReader,
  store::Destination,
};

use crate::{
  apply::Applier,
  classify::classify,
  context::PipelineContext,
  error::{Error, Result},
  guard::{self, Target},
  loader,
  report::{Outcome, RunReport},
  resolve::{
    Dependencies, MembershipRule, Placeholder, RefKind, RefRule, Resolution, ResolvedRecord,
    ResolvedRefs, StagePlan, StageState, TemporalKind, TemporalRule, resolve,
  },
};

// ─── Destination vocabulary ──────────────────────────────────────────────────

pub const PERSON_POST_TYPE: &str = "person";
pub const MEETING_POST_TYPE: &str = "meeting";
pub const GROUP_TAXONOMY: &str = "people_group";
pub const CATEGORY_TAXONOMY: &str = "category";

pub const THUMBNAIL_SLOT: &str = "_thumbnail_id";
pub const CHARTER_SLOT: &str = "people_group_charter";
pub const AGENDA_SLOT: &str = "ucf_meeting_agenda";
pub const MINUTES_SLOT: &str = "ucf_meeting_minutes";

/// Grouping for meetings without a (resolvable) committee.
pub const NO_COMMITTEE: Placeholder = Placeholder { taxonomy: GROUP_TAXONOMY, name: "None" };
const NO_COMMITTEE_DESCRIPTION: &str =
  "Use for meetings that are not tied to a particular committee.";

// ─── Stage plans ─────────────────────────────────────────────────────────────

pub const PEOPLE: StagePlan = StagePlan {
  record_type: RecordType::Person,
  references:  &[RefRule { name: "thumbnail", kind: RefKind::Asset }],
  temporals:   &[],
  memberships: &[MembershipRule { domain: "person_label", taxonomy: CATEGORY_TAXONOMY }],
  roster:      false,
};

pub const COMMITTEES: StagePlan = StagePlan {
  record_type: RecordType::Committee,
  references:  &[RefRule { name: "charter", kind: RefKind::Asset }],
  temporals:   &[],
  memberships: &[],
  roster:      true,
};

pub const MEETINGS: StagePlan = StagePlan {
  record_type: RecordType::Meeting,
  references:  &[
    RefRule {
      name: "owning_committee",
      kind: RefKind::Entity { placeholder: Some(NO_COMMITTEE) },
    },
    RefRule { name: "agenda", kind: RefKind::Asset },
    RefRule { name: "minutes", kind: RefKind::Asset },
  ],
  temporals:   &[
    TemporalRule { key: "meeting_date", kind: TemporalKind::Date },
    TemporalRule { key: "meeting_start_time", kind: TemporalKind::Time },
    TemporalRule { key: "meeting_end_time", kind: TemporalKind::Time },
  ],
  memberships: &[],
  roster:      false,
};

const STAGES: [StagePlan; 3] = [PEOPLE, COMMITTEES, MEETINGS];

// ─── Entry point ─────────────────────────────────────────────────────────────

/// Import the export at `path` into `dest`.
///
/// Returns `Err` only for fatal conditions (unreadable source, or the
/// placeholder committee cannot be set up). Every record-level problem is a
/// warning in the returned report.
pub async fn import<R, D, F>(reader: &R, dest: &D, fetcher: &F, path: &Path) -> Result<RunReport>
where
  R: SourceReader,
  D: Destination,
  F: AssetFetcher,
{
  let mut report = RunReport::new();
  tracing::info!(run_id = %report.run_id, path = %path.display(), "starting import");

  let records = loader::load(reader, path, &mut report)?;
  let mut ctx = PipelineContext::new(report);
  ctx.buckets = classify(records);
  for plan in &STAGES {
    ctx.set_stage(plan.record_type, StageState::Classified);
  }

  let applier = Applier { dest, fetcher };
  import_people(&applier, &mut ctx).await;
  import_committees(&applier, &mut ctx).await?;
  import_meetings(&applier, &mut ctx).await;

  for plan in &STAGES {
    ctx.report.finish(plan.record_type);
  }
  if ctx.report.counts(RecordType::Unknown).attempted > 0 {
    ctx.report.finish(RecordType::Unknown);
  }
  Ok(ctx.into_report())
}

// ─── Stage helpers ───────────────────────────────────────────────────────────

fn resolve_stage(plan: &StagePlan, ctx: &mut PipelineContext) -> Vec<ResolvedRecord> {
  ctx.set_stage(plan.record_type, StageState::Resolving);
  let bucket = ctx.buckets.take(plan.record_type);
  tracing::info!(records = bucket.len(), "importing {}", plan.record_type.plural());

  let deps = Dependencies { buckets: &ctx.buckets, index: &ctx.index };
  let (resolved, state) = resolve(plan, bucket, deps, &mut ctx.report);
  ctx.set_stage(plan.record_type, state);
  resolved
}

/// Split off records that cannot be applied, counting them as skipped.
fn ready(
  ctx: &mut PipelineContext,
  item: ResolvedRecord,
) -> Option<(SourceRecord, ResolvedRefs, String)> {
  let ResolvedRecord { record, resolution } = item;
  match (resolution, record.natural_key().map(str::to_owned)) {
    (Resolution::Ready(refs), Some(key)) => Some((record, refs, key)),
    (Resolution::Partial { reason }, _) => {
      skip(ctx, &record, &reason);
      None
    }
    (Resolution::Ready(_), None) => {
      skip(ctx, &record, "record has no title");
      None
    }
  }
}

fn skip(ctx: &mut PipelineContext, record: &SourceRecord, reason: &str) {
  ctx.report.warn(record.record_type, Some(record.source_ref().to_string()), reason);
  ctx.index.mark_unresolved(record.source_ref());
  ctx.report.tick(record.record_type, Outcome::Skipped);
}

fn settle(ctx: &mut PipelineContext, record: &SourceRecord, result: Result<Outcome>) {
  let outcome = result.unwrap_or_else(|e| {
    ctx.report.warn(record.record_type, Some(record.title.clone()), format!("not imported: {e}"));
    ctx.index.mark_unresolved(record.source_ref());
    Outcome::Failed
  });
  tracing::debug!(source = %record.source_ref(), ?outcome, "applied record");
  ctx.report.tick(record.record_type, outcome);
}

/// Warn about a failed secondary write without failing the record.
fn note(ctx: &mut PipelineContext, record: &SourceRecord, what: &str, result: Result<()>) {
  if let Err(e) = result {
    ctx.report.warn(record.record_type, Some(record.title.clone()), format!("{what}: {e}"));
  }
}

fn new_post(
  post_type: &str,
  title: &str,
  body: &str,
  created_at: Option<NaiveDateTime>,
) -> NewPost {
  NewPost {
    post_type: post_type.to_owned(),
    title: title.to_owned(),
    body: body.to_owned(),
    status: PostStatus::Published,
    created_at,
  }
}

// ─── People ──────────────────────────────────────────────────────────────────

async fn import_people<D, F>(applier: &Applier<'_, D, F>, ctx: &mut PipelineContext)
where
  D: Destination,
  F: AssetFetcher,
{
  for item in resolve_stage(&PEOPLE, ctx) {
    let Some((record, refs, key)) = ready(ctx, item) else { continue };
    let result = apply_person(applier, ctx, &record, &refs, &key).await;
    settle(ctx, &record, result);
  }
}

async fn apply_person<D, F>(
  applier: &Applier<'_, D, F>,
  ctx: &mut PipelineContext,
  record: &SourceRecord,
  refs: &ResolvedRefs,
  key: &str,
) -> Result<Outcome>
where
  D: Destination,
  F: AssetFetcher,
{
  if let Some(existing) = guard::find_existing(applier.dest, Target::Post, key).await? {
    if let Some(post) = existing.as_post() {
      let r = applier.apply_memberships(&mut ctx.index, post, &refs.memberships).await;
      note(ctx, record, "labels not assigned", r);
    }
    ctx.index.resolve(record.source_ref(), existing);
    return Ok(Outcome::Reused);
  }

  if !record.status.is_published() {
    tracing::debug!(source = %record.source_ref(), status = record.status.as_str(), "not published");
    ctx.index.mark_unresolved(record.source_ref());
    return Ok(Outcome::Skipped);
  }

  let post = applier
    .dest
    .create_post(new_post(PERSON_POST_TYPE, key, &record.body, record.created_at))
    .await
    .map_err(Error::store)?;
  ctx.index.resolve(record.source_ref(), ResolvedEntity::post(post, key));

  let attrs = &record.attributes;
  let fields = [
    ("person_job_title", attrs.get("person_job_title").map(str::to_owned)),
    ("person_phone", attrs.get("person_phone").map(str::to_owned)),
    ("email", attrs.get("person_email").map(str::to_owned)),
  ];
  let r = applier.set_text_fields(post.into(), &fields).await;
  note(ctx, record, "fields not written", r);

  let r = applier.apply_memberships(&mut ctx.index, post, &refs.memberships).await;
  note(ctx, record, "labels not assigned", r);

  if let Some(asset) = refs.asset("thumbnail") {
    applier
      .attach_or_warn(ctx, RecordType::Person, key, asset, post.into(), THUMBNAIL_SLOT)
      .await;
  }
  Ok(Outcome::Created)
}

// ─── Committees ──────────────────────────────────────────────────────────────

async fn import_committees<D, F>(
  applier: &Applier<'_, D, F>,
  ctx: &mut PipelineContext,
) -> Result<()>
where
  D: Destination,
  F: AssetFetcher,
{
  for item in resolve_stage(&COMMITTEES, ctx) {
    let Some((record, refs, key)) = ready(ctx, item) else { continue };
    let result = apply_committee(applier, ctx, &record, &refs, &key).await;
    settle(ctx, &record, result);
  }

  // Meetings fall back to this term, so failing to provide it is fatal.
  guard::ensure_term(
    applier.dest,
    &mut ctx.index,
    NO_COMMITTEE.taxonomy,
    NO_COMMITTEE.name,
    Some(NO_COMMITTEE_DESCRIPTION),
  )
  .await?;
  Ok(())
}

async fn apply_committee<D, F>(
  applier: &Applier<'_, D, F>,
  ctx: &mut PipelineContext,
  record: &SourceRecord,
  refs: &ResolvedRefs,
  key: &str,
) -> Result<Outcome>
where
  D: Destination,
  F: AssetFetcher,
{
  let target = Target::Term { taxonomy: GROUP_TAXONOMY };
  let (term, outcome) = match guard::find_existing(applier.dest, target, key).await? {
    Some(existing) => match existing.as_term() {
      Some(id) => (id, Outcome::Reused),
      None => return Ok(Outcome::Skipped),
    },
    None => {
      let description = record.attributes.non_empty("committee_description");
      let id = applier
        .dest
        .create_term(GROUP_TAXONOMY, key, description)
        .await
        .map_err(Error::store)?;
      (id, Outcome::Created)
    }
  };
  ctx.index.cache_term(GROUP_TAXONOMY, key, term);
  ctx.index.resolve(record.source_ref(), ResolvedEntity::term(term, key));

  // Memberships are appended on every run, reused committee or not.
  for member in &refs.roster {
    let Some(post) = member.post else { continue };
    let r = applier
      .dest
      .set_post_terms(post, term, GROUP_TAXONOMY)
      .await
      .map_err(Error::store);
    note(ctx, record, &format!("membership for {}", member.entry.person), r);
  }

  if outcome == Outcome::Created {
    if let Some(asset) = refs.asset("charter") {
      applier
        .attach_or_warn(ctx, RecordType::Committee, key, asset, FieldOwner::Term(term), CHARTER_SLOT)
        .await;
    }
  }
  Ok(outcome)
}

// ─── Meetings ────────────────────────────────────────────────────────────────

async fn import_meetings<D, F>(applier: &Applier<'_, D, F>, ctx: &mut PipelineContext)
where
  D: Destination,
  F: AssetFetcher,
{
  for item in resolve_stage(&MEETINGS, ctx) {
    let Some((record, refs, key)) = ready(ctx, item) else { continue };
    let result = apply_meeting(applier, ctx, &record, &refs, &key).await;
    settle(ctx, &record, result);
  }
}

async fn apply_meeting<D, F>(
  applier: &Applier<'_, D, F>,
  ctx: &mut PipelineContext,
  record: &SourceRecord,
  refs: &ResolvedRefs,
  key: &str,
) -> Result<Outcome>
where
  D: Destination,
  F: AssetFetcher,
{
  let committee = refs.entity("owning_committee").and_then(ResolvedEntity::as_term);

  if let Some(existing) = guard::find_existing(applier.dest, Target::Post, key).await? {
    if let (Some(post), Some(term)) = (existing.as_post(), committee) {
      let r = applier
        .dest
        .set_post_terms(post, term, GROUP_TAXONOMY)
        .await
        .map_err(Error::store);
      note(ctx, record, "committee not assigned", r);
    }
    ctx.index.resolve(record.source_ref(), existing);
    return Ok(Outcome::Reused);
  }

  if !record.status.is_published() {
    tracing::debug!(source = %record.source_ref(), status = record.status.as_str(), "not published");
    ctx.index.mark_unresolved(record.source_ref());
    return Ok(Outcome::Skipped);
  }

  let post = applier
    .dest
    .create_post(new_post(MEETING_POST_TYPE, key, &record.body, record.created_at))
    .await
    .map_err(Error::store)?;
  ctx.index.resolve(record.source_ref(), ResolvedEntity::post(post, key));

  let fields = [
    ("ucf_meeting_date", refs.date("meeting_date").map(|d| d.format("%Y-%m-%d").to_string())),
    (
      "ucf_meeting_start_time",
      refs.time("meeting_start_time").map(|t| t.format("%H:%M").to_string()),
    ),
    (
      "ucf_meeting_end_time",
      refs.time("meeting_end_time").map(|t| t.format("%H:%M").to_string()),
    ),
    ("ucf_meeting_location", record.attributes.get("meeting_location").map(str::to_owned)),
  ];
  let r = applier.set_text_fields(post.into(), &fields).await;
  note(ctx, record, "fields not written", r);

  if let Some(term) = committee {
    let r = applier
      .dest
      .set_post_terms(post, term, GROUP_TAXONOMY)
      .await
      .map_err(Error::store);
    note(ctx, record, "committee not assigned", r);
  }

  for (name, slot) in [("agenda", AGENDA_SLOT), ("minutes", MINUTES_SLOT)] {
    if let Some(asset) = refs.asset(name) {
      applier
        .attach_or_warn(ctx, RecordType::Meeting, key, asset, post.into(), slot)
        .await;
    }
  }
  Ok(Outcome::Created)
}
