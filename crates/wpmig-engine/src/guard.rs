//! Existence guard: reuse destination entities instead of duplicating them.
//!
//! Posts match on exact, case-sensitive title across every post type, the
//! way the legacy importer matched. Terms match on name within a taxonomy.

use wpmig_core::{
  entity::{PostId, ResolvedEntity, TermId},
  store::Destination,
};

use crate::{
  error::{Error, Result},
  index::ReferenceIndex,
};

/// What kind of destination entity a natural key names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
  Post,
  Term { taxonomy: &'a str },
}

/// The existing entity for `natural_key`, if any.
pub async fn find_existing<D: Destination>(
  dest: &D,
  target: Target<'_>,
  natural_key: &str,
) -> Result<Option<ResolvedEntity>> {
  Ok(match target {
    Target::Post => find_post(dest, natural_key)
      .await?
      .map(|id| ResolvedEntity::post(id, natural_key)),
    Target::Term { taxonomy } => find_term(dest, taxonomy, natural_key)
      .await?
      .map(|id| ResolvedEntity::term(id, natural_key)),
  })
}

pub async fn find_post<D: Destination>(dest: &D, title: &str) -> Result<Option<PostId>> {
  let found = dest.find_post_by_title(title).await.map_err(Error::store)?;
  if let Some(id) = found {
    tracing::debug!(title, post_id = %id, "reusing existing post");
  }
  Ok(found)
}

pub async fn find_term<D: Destination>(
  dest: &D,
  taxonomy: &str,
  name: &str,
) -> Result<Option<TermId>> {
  let found = dest.find_term_by_name(taxonomy, name).await.map_err(Error::store)?;
  if let Some(id) = found {
    tracing::debug!(taxonomy, name, term_id = %id, "reusing existing term");
  }
  Ok(found)
}

/// A term found or created by [`ensure_term`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnsuredTerm {
  pub id:      TermId,
  pub created: bool,
}

/// Find `name` in `taxonomy`, creating it if absent. Each `(taxonomy, name)`
/// reaches the destination at most once per run; later calls hit the
/// index's term cache.
pub async fn ensure_term<D: Destination>(
  dest: &D,
  index: &mut ReferenceIndex,
  taxonomy: &str,
  name: &str,
  description: Option<&str>,
) -> Result<EnsuredTerm> {
  if let Some(id) = index.cached_term(taxonomy, name) {
    return Ok(EnsuredTerm { id, created: false });
  }

  let ensured = match find_term(dest, taxonomy, name).await? {
    Some(id) => EnsuredTerm { id, created: false },
    None => {
      let id = dest
        .create_term(taxonomy, name, description)
        .await
        .map_err(Error::store)?;
      tracing::debug!(taxonomy, name, term_id = %id, "created term");
      EnsuredTerm { id, created: true }
    }
  };

  index.cache_term(taxonomy, name, ensured.id);
  Ok(ensured)
}
