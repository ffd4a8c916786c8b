//! The `migrate` pipeline: reshape legacy content already on the destination
//! into the fields and taxonomies the new theme reads.
//!
//! Unlike `import`, the source is the destination itself. Stages run in a
//! fixed order (people, degree types, departments, org groups,
//! publications) and each entity is migrated independently.

use serde::Deserialize;
use serde_json::{Value, json};
use wpmig_core::{
  entity::{FieldOwner, NewPost, Post, PostId, Term, TermId},
  record::RecordType,
  store::{Destination, PostQuery},
};

use crate::{
  apply::integer_value,
  context::PipelineContext,
  error::{Error, Result},
  guard,
  import::{CATEGORY_TAXONOMY, GROUP_TAXONOMY, PERSON_POST_TYPE},
  report::{Outcome, RunReport},
};

/// The custom-fields plugin every migrated field depends on.
pub const FIELDS_PLUGIN: &str = "advanced-custom-fields";

const PUBLICATION_CATEGORY: &str = "Publication";
const FEATURED_CATEGORY: &str = "Featured";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MigrateOptions {
  /// Base url of the legacy site. Links pointing at it are rewritten to the
  /// destination's url when the two differ.
  pub legacy_site_url: Option<String>,
}

/// How re-tagged posts receive their new term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retag {
  /// The new term becomes the post's only term in the taxonomy.
  Replace,
  /// The new term is added next to any the post already has.
  Append,
}

/// A legacy grouping taxonomy and where its terms move to.
struct Grouping {
  record_type: RecordType,
  from:        &'static str,
  to:          &'static str,
  post_type:   &'static str,
  retag:       Retag,
}

const DEGREE_TYPES: Grouping = Grouping {
  record_type: RecordType::DegreeType,
  from:        "degree_types",
  to:          "program_types",
  post_type:   "degree",
  retag:       Retag::Replace,
};

const ORG_GROUPS: Grouping = Grouping {
  record_type: RecordType::OrgGroup,
  from:        "org_groups",
  to:          GROUP_TAXONOMY,
  post_type:   PERSON_POST_TYPE,
  retag:       Retag::Append,
};

// ─── Entry point ─────────────────────────────────────────────────────────────

/// Migrate legacy content in place.
///
/// Fails before touching anything when the fields plugin is missing, and
/// when the legacy content or the fixed publication categories cannot be
/// read or set up.
pub async fn migrate<D: Destination>(dest: &D, options: &MigrateOptions) -> Result<RunReport> {
  if !dest.has_plugin(FIELDS_PLUGIN).await.map_err(Error::store)? {
    return Err(Error::MissingPlugin(FIELDS_PLUGIN.to_owned()));
  }

  let mut ctx = PipelineContext::new(RunReport::new());
  tracing::info!(run_id = %ctx.report.run_id, "starting migration");

  let people = dest
    .list_posts(&PostQuery::of_type(PERSON_POST_TYPE))
    .await
    .map_err(Error::store)?;
  let degree_types = dest.list_terms(DEGREE_TYPES.from).await.map_err(Error::store)?;
  let departments = dest.list_terms("departments").await.map_err(Error::store)?;
  let org_groups = dest.list_terms(ORG_GROUPS.from).await.map_err(Error::store)?;
  let publications = dest
    .list_posts(&PostQuery::of_type("publication"))
    .await
    .map_err(Error::store)?;

  let m = Migrator {
    dest,
    site_url: dest.site_url(),
    legacy_site_url: options.legacy_site_url.clone(),
  };

  tracing::info!(count = people.len(), "migrating people");
  for post in &people {
    let result = m.migrate_person(&mut ctx.report, post).await;
    settle(&mut ctx.report, RecordType::Person, &post.title, result);
  }

  m.migrate_grouping(&mut ctx, &DEGREE_TYPES, &degree_types).await;

  tracing::info!(count = departments.len(), "migrating departments");
  for term in &departments {
    let result = m.migrate_department(&mut ctx.report, term).await;
    settle(&mut ctx.report, RecordType::Department, &term.name, result);
  }

  m.migrate_grouping(&mut ctx, &ORG_GROUPS, &org_groups).await;

  let publication =
    guard::ensure_term(dest, &mut ctx.index, CATEGORY_TAXONOMY, PUBLICATION_CATEGORY, None)
      .await?;
  let featured =
    guard::ensure_term(dest, &mut ctx.index, CATEGORY_TAXONOMY, FEATURED_CATEGORY, None).await?;
  let categories = PublicationCategories { publication: publication.id, featured: featured.id };
  tracing::info!(count = publications.len(), "migrating publications");
  for post in &publications {
    let result = m.migrate_publication(&mut ctx, &categories, post).await;
    settle(&mut ctx.report, RecordType::Publication, &post.title, result);
  }

  for record_type in [
    RecordType::Person,
    RecordType::DegreeType,
    RecordType::Department,
    RecordType::OrgGroup,
    RecordType::Publication,
  ] {
    ctx.report.finish(record_type);
  }
  Ok(ctx.into_report())
}

fn settle(report: &mut RunReport, record_type: RecordType, subject: &str, result: Result<Outcome>) {
  let outcome = result.unwrap_or_else(|e| {
    report.warn(record_type, Some(subject.to_owned()), format!("not migrated: {e}"));
    Outcome::Failed
  });
  tracing::debug!(%record_type, subject, ?outcome, "migrated entity");
  report.tick(record_type, outcome);
}

fn note<E: std::fmt::Display>(
  report: &mut RunReport,
  record_type: RecordType,
  subject: &str,
  what: &str,
  result: Result<(), E>,
) {
  if let Err(e) = result {
    report.warn(record_type, Some(subject.to_owned()), format!("{what}: {e}"));
  }
}

/// Whether a stored value counts as set. Empty strings, `"0"`, zero, `false`
/// and empty collections were all "unset" on the legacy site.
fn is_set(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
    Value::String(s) => !s.is_empty() && s != "0",
    Value::Array(a) => !a.is_empty(),
    Value::Object(o) => !o.is_empty(),
  }
}

// ─── Link rewriting ──────────────────────────────────────────────────────────

/// Point a link at the legacy host to `site_url` instead.
///
/// Left alone when the destination is itself served from the legacy host.
pub fn rewrite_legacy_link(link: &str, legacy_site_url: &str, site_url: &str) -> String {
  let legacy = legacy_site_url.trim_end_matches('/');
  let host = legacy.split_once("://").map_or(legacy, |(_, host)| host);
  if host.is_empty() || !link.contains(host) || site_url.contains(host) {
    return link.to_owned();
  }

  for scheme in ["https://", "http://"] {
    if let Some(rest) = link.strip_prefix(&format!("{scheme}{host}")) {
      return format!("{}{rest}", site_url.trim_end_matches('/'));
    }
  }
  link.to_owned()
}

/// Protocol-relative media links do not embed; give them a scheme.
pub fn absolute_media_link(link: &str) -> String {
  match link.strip_prefix("//") {
    Some(rest) => format!("https://{rest}"),
    None => link.to_owned(),
  }
}

// ─── Migrator ────────────────────────────────────────────────────────────────

struct PublicationCategories {
  publication: TermId,
  featured:    TermId,
}

struct Migrator<'a, D> {
  dest:            &'a D,
  site_url:        String,
  legacy_site_url: Option<String>,
}

impl<D: Destination> Migrator<'_, D> {
  async fn field(&self, key: &str, owner: FieldOwner) -> Result<Option<Value>> {
    let value = self.dest.get_custom_field(key, owner).await.map_err(Error::store)?;
    Ok(value.filter(is_set))
  }

  async fn set_field(&self, key: &str, owner: FieldOwner, value: Value) -> Result<()> {
    self.dest.set_custom_field(key, owner, value).await.map_err(Error::store)
  }

  // ── People ─────────────────────────────────────────────────────────────

  /// Phone list, media list and CV into the new theme's fields.
  async fn migrate_person(&self, report: &mut RunReport, post: &Post) -> Result<Outcome> {
    let owner = FieldOwner::Post(post.id);
    let mut changed = false;

    if let Some(phones) = self.field("person_phones", owner).await? {
      match phones.as_str() {
        Some(phones) => {
          let rows: Vec<Value> = phones
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|number| json!({ "number": number }))
            .collect();
          self.set_field("person_phone_numbers", owner, Value::Array(rows)).await?;
          changed = true;
        }
        None => report.warn(
          RecordType::Person,
          Some(post.title.clone()),
          "person_phones is not a comma-separated list; left as is",
        ),
      }
    }

    if let Some(medias) = self.field("person_media", owner).await? {
      match medias.as_array() {
        Some(medias) => {
          let rows: Vec<Value> = medias
            .iter()
            .map(|media| {
              let link = media.get("link").and_then(Value::as_str).unwrap_or_default();
              json!({
                "title": media.get("title").cloned().unwrap_or(Value::Null),
                "link": absolute_media_link(link),
              })
            })
            .collect();
          self.set_field("person_medias", owner, Value::Array(rows)).await?;
          changed = true;
        }
        None => report.warn(
          RecordType::Person,
          Some(post.title.clone()),
          "person_media is not a list; left as is",
        ),
      }
    }

    if let Some(cv) = self.field("person_cv", owner).await? {
      match integer_value(&cv) {
        Some(id) => {
          self.set_field("person_cv", owner, Value::from(id)).await?;
          changed = true;
        }
        None => report.warn(
          RecordType::Person,
          Some(post.title.clone()),
          format!("person_cv {cv} is not an attachment id"),
        ),
      }
    }

    Ok(if changed { Outcome::Reused } else { Outcome::Skipped })
  }

  // ── Groupings ──────────────────────────────────────────────────────────

  async fn migrate_grouping(&self, ctx: &mut PipelineContext, grouping: &Grouping, terms: &[Term]) {
    tracing::info!(count = terms.len(), "migrating {}", grouping.record_type.plural());
    for term in terms {
      let result = self.migrate_group_term(ctx, grouping, term).await;
      settle(&mut ctx.report, grouping.record_type, &term.name, result);
    }
  }

  /// Copy one legacy term into the new taxonomy and re-tag its posts.
  async fn migrate_group_term(
    &self,
    ctx: &mut PipelineContext,
    grouping: &Grouping,
    term: &Term,
  ) -> Result<Outcome> {
    let ensured = guard::ensure_term(self.dest, &mut ctx.index, grouping.to, &term.name, None)
      .await?;

    let query = PostQuery::of_type(grouping.post_type).tagged(term.id);
    let posts = self.dest.list_posts(&query).await.map_err(Error::store)?;
    for post in &posts {
      let result = match grouping.retag {
        Retag::Replace => {
          self.dest.replace_post_terms(post.id, grouping.to, &[ensured.id]).await
        }
        Retag::Append => self.dest.set_post_terms(post.id, ensured.id, grouping.to).await,
      };
      note(
        &mut ctx.report,
        grouping.record_type,
        &term.name,
        &format!("{} not re-tagged", post.title),
        result,
      );
    }

    Ok(if ensured.created { Outcome::Created } else { Outcome::Reused })
  }

  // ── Departments ────────────────────────────────────────────────────────

  /// The department's "links to page" option becomes a website field.
  async fn migrate_department(&self, report: &mut RunReport, term: &Term) -> Result<Outcome> {
    let option = format!("tax_departments_{}", term.id);
    let page = self
      .dest
      .get_option(&option)
      .await
      .map_err(Error::store)?
      .as_ref()
      .and_then(|meta| meta.get("department_links_to_page"))
      .and_then(integer_value)
      .filter(|&id| id > 0);
    let Some(page) = page else { return Ok(Outcome::Skipped) };

    let Some(url) = self.dest.permalink(PostId(page)).await.map_err(Error::store)? else {
      report.warn(
        RecordType::Department,
        Some(term.name.clone()),
        format!("links to page {page}, which does not exist"),
      );
      return Ok(Outcome::Skipped);
    };

    self.set_field("departments_website", term.id.into(), Value::from(url)).await?;
    Ok(Outcome::Reused)
  }

  // ── Publications ───────────────────────────────────────────────────────

  /// Turn a publication into a categorised regular post.
  async fn migrate_publication(
    &self,
    ctx: &mut PipelineContext,
    categories: &PublicationCategories,
    publication: &Post,
  ) -> Result<Outcome> {
    let owner = FieldOwner::Post(publication.id);
    let pub_types = self
      .dest
      .post_terms(publication.id, "publication_types")
      .await
      .map_err(Error::store)?;
    let people = self.field("publication_people", owner).await?;
    let links_to = self
      .field("_links_to", owner)
      .await?
      .and_then(|v| v.as_str().map(|link| self.current_link(link)));
    let links_to_target = self.field("_links_to_target", owner).await?;

    // A publication that redirects to a regular post becomes that post.
    let mut redirected = None;
    let mut redirect_post = None;
    if let Some(link) = &links_to {
      redirected = self.dest.post_for_url(link).await.map_err(Error::store)?;
      if let Some(id) = redirected {
        let target = self.dest.get_post(id).await.map_err(Error::store)?;
        if target.is_some_and(|p| p.post_type == "post") {
          redirect_post = Some(id);
        }
      }
    }

    let (post, outcome) = match redirect_post {
      Some(id) => {
        tracing::debug!(title = %publication.title, post_id = %id, "publication redirects to a post");
        (id, Outcome::Reused)
      }
      None => match self.migrated_copy(categories.publication, &publication.title).await? {
        Some(id) => {
          tracing::debug!(title = %publication.title, post_id = %id, "publication already migrated");
          (id, Outcome::Reused)
        }
        None => {
          let id = self
            .dest
            .create_post(NewPost {
              post_type:  "post".to_owned(),
              title:      publication.title.clone(),
              body:       publication.body.clone(),
              status:     publication.status.clone(),
              created_at: publication.created_at,
            })
            .await
            .map_err(Error::store)?;
          (id, Outcome::Created)
        }
      },
    };

    let report = &mut ctx.report;
    let subject = publication.title.as_str();
    let target = FieldOwner::Post(post);
    if redirected != Some(post) {
      if let Some(link) = links_to {
        let r = self.set_field("_links_to", target, Value::from(link)).await;
        note(report, RecordType::Publication, subject, "_links_to not saved", r);
      }
      if let Some(link_target) = links_to_target {
        let r = self.set_field("_links_to_target", target, link_target).await;
        note(report, RecordType::Publication, subject, "_links_to_target not saved", r);
      }
    }
    if let Some(people) = people {
      let r = self.set_field("post_associated_people", target, people).await;
      note(report, RecordType::Publication, subject, "associated people not saved", r);
    }

    let mut terms = vec![categories.publication];
    for pub_type in &pub_types {
      let category = if pub_type.name == FEATURED_CATEGORY {
        Some(categories.featured)
      } else {
        guard::find_term(self.dest, CATEGORY_TAXONOMY, &pub_type.name).await?
      };
      match category {
        Some(id) if !terms.contains(&id) => terms.push(id),
        Some(_) => {}
        None => report.warn(
          RecordType::Publication,
          Some(subject.to_owned()),
          format!("publication type {:?} has no matching category", pub_type.name),
        ),
      }
    }
    let r = self.dest.replace_post_terms(post, CATEGORY_TAXONOMY, &terms).await;
    note(report, RecordType::Publication, subject, "categories not assigned", r);

    Ok(outcome)
  }

  /// A regular post from an earlier migration of the same publication.
  async fn migrated_copy(&self, category: TermId, title: &str) -> Result<Option<PostId>> {
    if title.is_empty() {
      return Ok(None);
    }
    let query = PostQuery::of_type("post").titled(title).tagged(category).limit(1);
    let found = self.dest.list_posts(&query).await.map_err(Error::store)?;
    Ok(found.first().map(|p| p.id))
  }

  fn current_link(&self, link: &str) -> String {
    match &self.legacy_site_url {
      Some(legacy) => rewrite_legacy_link(link, legacy, &self.site_url),
      None => link.to_owned(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn legacy_links_follow_the_site() {
    assert_eq!(
      rewrite_legacy_link(
        "http://old.example/news/item/",
        "https://old.example/",
        "https://staging.example"
      ),
      "https://staging.example/news/item/"
    );
    // Production keeps its own links.
    assert_eq!(
      rewrite_legacy_link("https://old.example/a/", "https://old.example", "https://old.example"),
      "https://old.example/a/"
    );
    assert_eq!(
      rewrite_legacy_link("https://elsewhere.example/a/", "old.example", "https://new.example"),
      "https://elsewhere.example/a/"
    );
  }

  #[test]
  fn protocol_relative_links_get_https() {
    assert_eq!(absolute_media_link("//youtu.be/x"), "https://youtu.be/x");
    assert_eq!(absolute_media_link("http://youtu.be/x"), "http://youtu.be/x");
    assert_eq!(absolute_media_link("https://a.example//b"), "https://a.example//b");
  }

  #[test]
  fn legacy_unset_values() {
    assert!(!is_set(&Value::Null));
    assert!(!is_set(&Value::from("")));
    assert!(!is_set(&Value::from("0")));
    assert!(!is_set(&Value::from(0)));
    assert!(!is_set(&json!([])));
    assert!(is_set(&Value::from("555-1234")));
    assert!(is_set(&json!([{ "title": "t" }])));
  }
}
