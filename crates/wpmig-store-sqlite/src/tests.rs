//! Integration tests for `SqliteStore` against an in-memory database.

use std::io::Write as _;

use serde_json::json;
use wpmig_core::{
  entity::{FieldOwner, MediaMetadata, NewPost, PostId, TermId},
  record::PostStatus,
  store::{Destination, PostQuery},
};

use crate::{Error, SqliteStore, StoreSettings};

async fn store() -> (SqliteStore, tempfile::TempDir) {
  let uploads = tempfile::tempdir().expect("upload dir");
  let store = SqliteStore::open_in_memory(StoreSettings {
    site_url:   "https://new.example/".into(),
    upload_dir: uploads.path().to_path_buf(),
  })
  .await
  .expect("in-memory store");
  (store, uploads)
}

fn metadata(name: &str, upload_date: Option<&str>) -> MediaMetadata {
  MediaMetadata {
    name:        name.into(),
    mime_type:   "application/pdf".into(),
    upload_date: upload_date.map(str::to_owned),
    title:       "Agenda".into(),
    source_url:  "http://old.example/wp-content/uploads/2015/02/agenda.pdf".into(),
  }
}

// ─── Site ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn plugins_and_options() {
  let (s, _dir) = store().await;
  assert!(!s.has_plugin("advanced-custom-fields").await.unwrap());
  s.activate_plugin("advanced-custom-fields").await.unwrap();
  assert!(s.has_plugin("advanced-custom-fields").await.unwrap());

  assert_eq!(s.get_option("tax_departments_4").await.unwrap(), None);
  s.set_option("tax_departments_4", json!({"department_links_to_page": 9}))
    .await
    .unwrap();
  assert_eq!(
    s.get_option("tax_departments_4").await.unwrap(),
    Some(json!({"department_links_to_page": 9}))
  );
  assert_eq!(s.site_url(), "https://new.example");
}

// ─── Posts ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_find_and_get_post() {
  let (s, _dir) = store().await;
  let mut draft = NewPost::new("person", "Ada Lovelace");
  draft.status = PostStatus::Draft;
  let id = s.create_post(draft).await.unwrap();

  assert_eq!(s.find_post_by_title("Ada Lovelace").await.unwrap(), Some(id));
  assert_eq!(s.find_post_by_title("ada lovelace").await.unwrap(), None);

  let post = s.get_post(id).await.unwrap().unwrap();
  assert_eq!(post.post_type, "person");
  assert_eq!(post.status, PostStatus::Draft);
  assert!(s.get_post(PostId(999)).await.unwrap().is_none());
}

#[tokio::test]
async fn list_posts_filters_combine() {
  let (s, _dir) = store().await;
  let a = s.create_post(NewPost::new("meeting", "June")).await.unwrap();
  let _ = s.create_post(NewPost::new("meeting", "July")).await.unwrap();
  let _ = s.create_post(NewPost::new("person", "June")).await.unwrap();
  let term = s.create_term("people_group", "Board", None).await.unwrap();
  s.set_post_terms(a, term, "people_group").await.unwrap();

  let meetings = s.list_posts(&PostQuery::of_type("meeting")).await.unwrap();
  assert_eq!(meetings.len(), 2);

  let june = s
    .list_posts(&PostQuery::of_type("meeting").titled("June"))
    .await
    .unwrap();
  assert_eq!(june.iter().map(|p| p.id).collect::<Vec<_>>(), [a]);

  let tagged = s.list_posts(&PostQuery::default().tagged(term)).await.unwrap();
  assert_eq!(tagged.len(), 1);

  let limited = s.list_posts(&PostQuery::default().limit(1)).await.unwrap();
  assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn permalinks_round_trip_through_post_for_url() {
  let (s, _dir) = store().await;
  let first = s.create_post(NewPost::new("post", "Annual Report")).await.unwrap();
  let second = s.create_post(NewPost::new("post", "Annual Report")).await.unwrap();
  let person = s.create_post(NewPost::new("person", "Ada")).await.unwrap();

  let url = s.permalink(second).await.unwrap().unwrap();
  assert_eq!(url, "https://new.example/annual-report-2/");
  assert_eq!(s.post_for_url(&url).await.unwrap(), Some(second));
  assert_eq!(
    s.post_for_url("https://new.example/annual-report").await.unwrap(),
    Some(first)
  );

  let person_url = s.permalink(person).await.unwrap().unwrap();
  assert_eq!(person_url, "https://new.example/person/ada/");
  assert_eq!(s.post_for_url(&person_url).await.unwrap(), Some(person));

  assert_eq!(s.post_for_url("https://elsewhere.example/ada/").await.unwrap(), None);
}

#[tokio::test]
async fn delete_post_drops_fields_and_terms() {
  let (s, _dir) = store().await;
  let id = s.create_post(NewPost::new("person", "Ada")).await.unwrap();
  let term = s.create_term("category", "Trustee", None).await.unwrap();
  s.set_post_terms(id, term, "category").await.unwrap();
  s.set_custom_field("person_phone", id.into(), json!("555")).await.unwrap();

  s.delete_post(id).await.unwrap();
  assert!(s.get_post(id).await.unwrap().is_none());
  assert_eq!(s.get_custom_field("person_phone", id.into()).await.unwrap(), None);
  assert!(matches!(s.delete_post(id).await, Err(Error::PostNotFound(_))));
  assert!(s.list_terms("category").await.unwrap().len() == 1);
}

// ─── Terms ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_term_is_rejected() {
  let (s, _dir) = store().await;
  let id = s.create_term("people_group", "Board", Some("Trustees")).await.unwrap();
  assert_eq!(s.find_term_by_name("people_group", "Board").await.unwrap(), Some(id));
  assert_eq!(s.find_term_by_name("category", "Board").await.unwrap(), None);

  let err = s.create_term("people_group", "Board", None).await.unwrap_err();
  assert!(matches!(err, Error::TermExists { .. }));

  // Same name in another taxonomy is a different term.
  s.create_term("category", "Board", None).await.unwrap();

  let terms = s.list_terms("people_group").await.unwrap();
  assert_eq!(terms.len(), 1);
  assert_eq!(terms[0].description, "Trustees");
}

#[tokio::test]
async fn set_post_terms_appends_and_checks_taxonomy() {
  let (s, _dir) = store().await;
  let post = s.create_post(NewPost::new("person", "Ada")).await.unwrap();
  let a = s.create_term("people_group", "A", None).await.unwrap();
  let b = s.create_term("people_group", "B", None).await.unwrap();
  let cat = s.create_term("category", "Trustee", None).await.unwrap();

  s.set_post_terms(post, a, "people_group").await.unwrap();
  s.set_post_terms(post, b, "people_group").await.unwrap();
  s.set_post_terms(post, b, "people_group").await.unwrap();
  assert_eq!(s.post_terms(post, "people_group").await.unwrap().len(), 2);

  let err = s.set_post_terms(post, cat, "people_group").await.unwrap_err();
  assert!(matches!(err, Error::TaxonomyMismatch { .. }));
  let err = s.set_post_terms(post, TermId(404), "people_group").await.unwrap_err();
  assert!(matches!(err, Error::TermNotFound(_)));
  let err = s.set_post_terms(PostId(404), a, "people_group").await.unwrap_err();
  assert!(matches!(err, Error::PostNotFound(_)));
}

#[tokio::test]
async fn replace_post_terms_only_touches_one_taxonomy() {
  let (s, _dir) = store().await;
  let post = s.create_post(NewPost::new("post", "Paper")).await.unwrap();
  let old = s.create_term("category", "Old", None).await.unwrap();
  let new = s.create_term("category", "Publication", None).await.unwrap();
  let group = s.create_term("people_group", "Board", None).await.unwrap();

  s.set_post_terms(post, old, "category").await.unwrap();
  s.set_post_terms(post, group, "people_group").await.unwrap();
  s.replace_post_terms(post, "category", &[new]).await.unwrap();

  let cats = s.post_terms(post, "category").await.unwrap();
  assert_eq!(cats.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), ["Publication"]);
  assert_eq!(s.post_terms(post, "people_group").await.unwrap().len(), 1);
}

#[tokio::test]
async fn delete_term_detaches_posts() {
  let (s, _dir) = store().await;
  let post = s.create_post(NewPost::new("person", "Ada")).await.unwrap();
  let term = s.create_term("people_group", "Board", None).await.unwrap();
  s.set_post_terms(post, term, "people_group").await.unwrap();
  s.set_custom_field("people_group_charter", term.into(), json!(3)).await.unwrap();

  s.delete_term(term).await.unwrap();
  assert!(s.post_terms(post, "people_group").await.unwrap().is_empty());
  assert_eq!(
    s.get_custom_field("people_group_charter", term.into()).await.unwrap(),
    None
  );
  assert!(matches!(s.delete_term(term).await, Err(Error::TermNotFound(_))));
}

// ─── Media ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn store_media_copies_into_dated_folder() {
  let (s, dir) = store().await;
  let mut src = tempfile::NamedTempFile::new().unwrap();
  src.write_all(b"%PDF-1.4 agenda").unwrap();

  let first = s
    .store_media(src.path(), metadata("agenda.pdf", Some("2015/02")))
    .await
    .unwrap();
  let second = s
    .store_media(src.path(), metadata("agenda.pdf", Some("2015/02")))
    .await
    .unwrap();
  assert_ne!(first, second);

  let media = s.list_media().await.unwrap();
  assert_eq!(media.len(), 2);
  assert_eq!(media[0].file_path, "2015/02/agenda.pdf");
  assert_eq!(media[1].file_path, "2015/02/agenda-2.pdf");
  assert_eq!(media[0].content_hash, media[1].content_hash);
  assert_eq!(media[0].content_hash.len(), 64);
  assert!(dir.path().join("2015/02/agenda.pdf").exists());

  // The caller's file is untouched.
  assert!(src.path().exists());
}

#[tokio::test]
async fn bad_upload_date_falls_back_to_current_month() {
  let (s, _dir) = store().await;
  let src = tempfile::NamedTempFile::new().unwrap();
  s.store_media(src.path(), metadata("x.pdf", Some("../../etc"))).await.unwrap();

  let media = s.list_media().await.unwrap();
  assert!(!media[0].file_path.starts_with(".."));
  assert!(media[0].file_path.ends_with("/x.pdf"));
}

#[tokio::test]
async fn delete_media_removes_file() {
  let (s, dir) = store().await;
  let src = tempfile::NamedTempFile::new().unwrap();
  let id = s.store_media(src.path(), metadata("a.pdf", Some("2015/02"))).await.unwrap();

  s.delete_media(id).await.unwrap();
  assert!(s.list_media().await.unwrap().is_empty());
  assert!(!dir.path().join("2015/02/a.pdf").exists());
  assert!(matches!(s.delete_media(id).await, Err(Error::MediaNotFound(_))));
}

#[tokio::test]
async fn failed_insert_leaves_no_file_behind() {
  let (s, dir) = store().await;
  let mut src = tempfile::NamedTempFile::new().unwrap();
  src.write_all(b"%PDF-1.4 agenda").unwrap();
  s.conn
    .call(|conn| {
      conn.execute_batch("DROP TABLE media")?;
      Ok(())
    })
    .await
    .unwrap();

  let err = s
    .store_media(src.path(), metadata("agenda.pdf", Some("2015/02")))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Database(_)));
  assert!(!dir.path().join("2015/02/agenda.pdf").exists());
}

#[tokio::test]
async fn unusable_file_name_is_rejected() {
  let (s, _dir) = store().await;
  let src = tempfile::NamedTempFile::new().unwrap();
  let err = s.store_media(src.path(), metadata("..", None)).await.unwrap_err();
  assert!(matches!(err, Error::InvalidFileName(_)));
}

// ─── Custom fields ───────────────────────────────────────────────────────────

#[tokio::test]
async fn custom_fields_overwrite() {
  let (s, _dir) = store().await;
  let post = s.create_post(NewPost::new("person", "Ada")).await.unwrap();
  let owner = FieldOwner::Post(post);

  s.set_custom_field("person_phone_numbers", owner, json!([{"number": "1"}]))
    .await
    .unwrap();
  s.set_custom_field("person_phone_numbers", owner, json!([{"number": "2"}]))
    .await
    .unwrap();
  assert_eq!(
    s.get_custom_field("person_phone_numbers", owner).await.unwrap(),
    Some(json!([{"number": "2"}]))
  );

  // Post and term owners with the same numeric id do not collide.
  assert_eq!(
    s.get_custom_field("person_phone_numbers", FieldOwner::Term(TermId(post.0)))
      .await
      .unwrap(),
    None
  );
}
