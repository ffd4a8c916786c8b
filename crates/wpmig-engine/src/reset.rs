//! The `reset` pipeline: remove everything `import` creates.
//!
//! Each entity is deleted on its own; a failure is recorded against that
//! entity and the reset moves on.

use std::collections::HashSet;

use wpmig_core::{
  entity::{FieldOwner, MediaId},
  record::RecordType,
  store::{Destination, PostQuery},
};

use crate::{
  apply::integer_value,
  error::{Error, Result},
  import::{
    AGENDA_SLOT, CHARTER_SLOT, GROUP_TAXONOMY, MEETING_POST_TYPE, MINUTES_SLOT,
    PERSON_POST_TYPE, THUMBNAIL_SLOT,
  },
  report::{Outcome, RunReport},
};

/// Post types to clear, with the media slots each carries.
const POST_KINDS: &[(RecordType, &str, &[&str])] = &[
  (RecordType::Person, PERSON_POST_TYPE, &[THUMBNAIL_SLOT]),
  (RecordType::Meeting, MEETING_POST_TYPE, &[AGENDA_SLOT, MINUTES_SLOT]),
];

struct Resetter<'a, D> {
  dest:    &'a D,
  report:  RunReport,
  /// Media already deleted; several slots may share one item.
  removed: HashSet<MediaId>,
}

/// Delete imported people, meetings, committees and their media.
///
/// Only listing the entities to delete can fail the run.
pub async fn reset<D: Destination>(dest: &D) -> Result<RunReport> {
  let mut r = Resetter { dest, report: RunReport::new(), removed: HashSet::new() };
  tracing::info!(run_id = %r.report.run_id, "starting reset");

  for &(record_type, post_type, slots) in POST_KINDS {
    let posts = dest
      .list_posts(&PostQuery::of_type(post_type))
      .await
      .map_err(Error::store)?;
    tracing::info!(count = posts.len(), "removing {}", record_type.plural());

    for post in posts {
      for slot in slots {
        r.remove_bound_media(record_type, &post.title, slot, post.id.into()).await;
      }
      let result = dest.delete_post(post.id).await;
      r.settle(record_type, &post.title, result);
    }
  }

  let terms = dest.list_terms(GROUP_TAXONOMY).await.map_err(Error::store)?;
  tracing::info!(count = terms.len(), "removing {}", RecordType::Committee.plural());
  for term in terms {
    r.remove_bound_media(RecordType::Committee, &term.name, CHARTER_SLOT, term.id.into())
      .await;
    let result = dest.delete_term(term.id).await;
    r.settle(RecordType::Committee, &term.name, result);
  }

  for record_type in [
    RecordType::Person,
    RecordType::Meeting,
    RecordType::Committee,
    RecordType::Attachment,
  ] {
    r.report.finish(record_type);
  }
  Ok(r.report)
}

impl<D: Destination> Resetter<'_, D> {
  async fn remove_bound_media(
    &mut self,
    record_type: RecordType,
    subject: &str,
    slot: &str,
    owner: FieldOwner,
  ) {
    let value = match self.dest.get_custom_field(slot, owner).await {
      Ok(value) => value,
      Err(e) => {
        self.report.warn(record_type, Some(subject.to_owned()), format!("cannot read {slot}: {e}"));
        return;
      }
    };
    let Some(media) = value.as_ref().and_then(integer_value).map(MediaId) else { return };
    if !self.removed.insert(media) {
      return;
    }

    let result = self.dest.delete_media(media).await;
    self.settle(RecordType::Attachment, &format!("{subject} ({slot})"), result);
  }

  fn settle<E: std::fmt::Display>(
    &mut self,
    record_type: RecordType,
    subject: &str,
    result: Result<(), E>,
  ) {
    let outcome = match result {
      Ok(()) => Outcome::Removed,
      Err(e) => {
        self.report.warn(record_type, Some(subject.to_owned()), format!("not removed: {e}"));
        Outcome::Failed
      }
    };
    tracing::debug!(%record_type, subject, ?outcome, "reset entity");
    self.report.tick(record_type, outcome);
  }
}
