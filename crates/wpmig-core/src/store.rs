//! The `Destination` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `wpmig-store-sqlite`).
//! The engine depends on this abstraction, not on any concrete backend.

use std::{future::Future, path::Path};

use serde_json::Value;

use crate::entity::{
  FieldOwner, Media, MediaId, MediaMetadata, NewPost, Post, PostId, Term, TermId,
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`Destination::list_posts`].
#[derive(Debug, Clone, Default)]
pub struct PostQuery {
  /// Restrict to one post type; `None` matches every type.
  pub post_type: Option<String>,
  /// Exact, case-sensitive title match.
  pub title:     Option<String>,
  /// Only posts tagged with this term.
  pub term:      Option<TermId>,
  pub limit:     Option<usize>,
}

impl PostQuery {
  pub fn of_type(post_type: impl Into<String>) -> Self {
    Self { post_type: Some(post_type.into()), ..Self::default() }
  }

  pub fn titled(mut self, title: impl Into<String>) -> Self {
    self.title = Some(title.into());
    self
  }

  pub fn tagged(mut self, term: TermId) -> Self {
    self.term = Some(term);
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the destination site's storage.
///
/// The engine drives a destination from a single task and awaits every call
/// before issuing the next; implementations need no internal locking beyond
/// what their own I/O requires.
pub trait Destination: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Site ──────────────────────────────────────────────────────────────

  /// Whether the named plugin is active on the destination.
  fn has_plugin<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Base url of the destination site, without a trailing slash.
  fn site_url(&self) -> String;

  /// A site option by name (legacy term metadata lives here).
  fn get_option<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<Value>, Self::Error>> + Send + 'a;

  // ── Posts ─────────────────────────────────────────────────────────────

  /// First post of any type whose title equals `title` exactly.
  fn find_post_by_title<'a>(
    &'a self,
    title: &'a str,
  ) -> impl Future<Output = Result<Option<PostId>, Self::Error>> + Send + 'a;

  fn get_post(
    &self,
    id: PostId,
  ) -> impl Future<Output = Result<Option<Post>, Self::Error>> + Send + '_;

  /// Posts matching `query`, oldest first.
  fn list_posts<'a>(
    &'a self,
    query: &'a PostQuery,
  ) -> impl Future<Output = Result<Vec<Post>, Self::Error>> + Send + 'a;

  fn create_post(
    &self,
    post: NewPost,
  ) -> impl Future<Output = Result<PostId, Self::Error>> + Send + '_;

  /// Delete a post together with its term assignments and custom fields.
  fn delete_post(
    &self,
    id: PostId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Public url of a post, if it exists.
  fn permalink(
    &self,
    id: PostId,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  /// The post a site url points at, if any.
  fn post_for_url<'a>(
    &'a self,
    url: &'a str,
  ) -> impl Future<Output = Result<Option<PostId>, Self::Error>> + Send + 'a;

  // ── Terms ─────────────────────────────────────────────────────────────

  /// Term with exactly this name in `taxonomy`.
  fn find_term_by_name<'a>(
    &'a self,
    taxonomy: &'a str,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<TermId>, Self::Error>> + Send + 'a;

  /// Create a term. Fails if `name` already exists in `taxonomy`.
  fn create_term<'a>(
    &'a self,
    taxonomy: &'a str,
    name: &'a str,
    description: Option<&'a str>,
  ) -> impl Future<Output = Result<TermId, Self::Error>> + Send + 'a;

  /// All terms of a taxonomy, including ones no post uses.
  fn list_terms<'a>(
    &'a self,
    taxonomy: &'a str,
  ) -> impl Future<Output = Result<Vec<Term>, Self::Error>> + Send + 'a;

  /// Add `term` to the post's terms in `taxonomy`, keeping existing ones.
  fn set_post_terms<'a>(
    &'a self,
    post: PostId,
    term: TermId,
    taxonomy: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Replace the post's terms in `taxonomy` with exactly `terms`.
  fn replace_post_terms<'a>(
    &'a self,
    post: PostId,
    taxonomy: &'a str,
    terms: &'a [TermId],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn post_terms<'a>(
    &'a self,
    post: PostId,
    taxonomy: &'a str,
  ) -> impl Future<Output = Result<Vec<Term>, Self::Error>> + Send + 'a;

  /// Delete a term together with its assignments and custom fields.
  fn delete_term(
    &self,
    id: TermId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Media ─────────────────────────────────────────────────────────────

  /// Copy the file at `local_path` into the media library.
  ///
  /// The caller keeps ownership of `local_path` and removes it afterwards.
  fn store_media<'a>(
    &'a self,
    local_path: &'a Path,
    metadata: MediaMetadata,
  ) -> impl Future<Output = Result<MediaId, Self::Error>> + Send + 'a;

  fn list_media(
    &self,
  ) -> impl Future<Output = Result<Vec<Media>, Self::Error>> + Send + '_;

  /// Remove a media item and its stored file.
  fn delete_media(
    &self,
    id: MediaId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Custom fields ─────────────────────────────────────────────────────

  fn get_custom_field<'a>(
    &'a self,
    key: &'a str,
    owner: FieldOwner,
  ) -> impl Future<Output = Result<Option<Value>, Self::Error>> + Send + 'a;

  /// Insert or overwrite a field value.
  fn set_custom_field<'a>(
    &'a self,
    key: &'a str,
    owner: FieldOwner,
    value: Value,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
