//! [`SqliteStore`]: the SQLite implementation of [`Destination`].

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use serde_json::Value;
use sha2::{Digest, Sha256};

use wpmig_core::{
  entity::{
    FieldOwner, Media, MediaId, MediaMetadata, NewPost, Post, PostId, Term, TermId,
  },
  store::{Destination, PostQuery},
};

use crate::{
  encode::{
    encode_dt, encode_owner, sanitize_file_name, slugify, valid_upload_date, RawMedia,
    RawPost, RawTerm,
  },
  schema::SCHEMA,
  Error, Result,
};

// ─── Settings ────────────────────────────────────────────────────────────────

/// Site-level values the store cannot derive from its database.
#[derive(Debug, Clone)]
pub struct StoreSettings {
  /// Base url used to build permalinks, e.g. `https://example.edu`.
  pub site_url:   String,
  /// Directory media files are copied into.
  pub upload_dir: PathBuf,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A destination site backed by a single SQLite file plus an upload
/// directory.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
  settings:        Arc<StoreSettings>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>, settings: StoreSettings) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, settings).await
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory(settings: StoreSettings) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, settings).await
  }

  async fn init(conn: tokio_rusqlite::Connection, mut settings: StoreSettings) -> Result<Self> {
    settings.site_url = settings.site_url.trim_end_matches('/').to_owned();
    let store = Self { conn, settings: Arc::new(settings) };
    store
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(store)
  }

  /// Mark a plugin as active.
  pub async fn activate_plugin(&self, name: &str) -> Result<()> {
    let name = name.to_owned();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO plugins (name) VALUES (?1)",
          rusqlite::params![name],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert or overwrite a site option.
  pub async fn set_option(&self, name: &str, value: Value) -> Result<()> {
    let name       = name.to_owned();
    let value_json = serde_json::to_string(&value)?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO options (name, value_json) VALUES (?1, ?2)
           ON CONFLICT (name) DO UPDATE SET value_json = excluded.value_json",
          rusqlite::params![name, value_json],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn post_exists(&self, id: PostId) -> Result<bool> {
    let exists = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM posts WHERE post_id = ?1",
              rusqlite::params![id.0],
              |_| Ok(()),
            )
            .optional()?
            .is_some(),
        )
      })
      .await?;
    Ok(exists)
  }

  /// Error unless `term` exists and belongs to `taxonomy`.
  async fn check_taxonomy(&self, term: TermId, taxonomy: &str) -> Result<()> {
    let actual: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT taxonomy FROM terms WHERE term_id = ?1",
              rusqlite::params![term.0],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    match actual {
      None => Err(Error::TermNotFound(term)),
      Some(t) if t != taxonomy => Err(Error::TaxonomyMismatch {
        term,
        taxonomy: taxonomy.to_owned(),
      }),
      Some(_) => Ok(()),
    }
  }

  /// Pick a free file name under `dir`, appending `-N` before the extension.
  async fn unique_file_name(dir: &Path, name: &str) -> Result<String> {
    let (stem, ext) = match name.rsplit_once('.') {
      Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
      _ => (name, None),
    };

    let mut candidate = name.to_owned();
    let mut n = 1;
    while tokio::fs::try_exists(dir.join(&candidate)).await? {
      n += 1;
      candidate = match ext {
        Some(ext) => format!("{stem}-{n}.{ext}"),
        None => format!("{stem}-{n}"),
      };
    }
    Ok(candidate)
  }
}

/// Remove a media file whose row was never written.
async fn discard(path: &Path) {
  if let Err(e) = tokio::fs::remove_file(path).await
    && e.kind() != std::io::ErrorKind::NotFound
  {
    tracing::warn!(path = %path.display(), error = %e, "failed to remove orphaned media file");
  }
}

// ─── Destination impl ────────────────────────────────────────────────────────

impl Destination for SqliteStore {
  type Error = Error;

  // ── Site ──────────────────────────────────────────────────────────────────

  async fn has_plugin(&self, name: &str) -> Result<bool> {
    let name = name.to_owned();
    let active = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM plugins WHERE name = ?1",
              rusqlite::params![name],
              |_| Ok(()),
            )
            .optional()?
            .is_some(),
        )
      })
      .await?;
    Ok(active)
  }

  fn site_url(&self) -> String { self.settings.site_url.clone() }

  async fn get_option(&self, name: &str) -> Result<Option<Value>> {
    let name = name.to_owned();
    let raw: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT value_json FROM options WHERE name = ?1",
              rusqlite::params![name],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
  }

  // ── Posts ─────────────────────────────────────────────────────────────────

  async fn find_post_by_title(&self, title: &str) -> Result<Option<PostId>> {
    let title = title.to_owned();
    let id: Option<i64> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT post_id FROM posts WHERE title = ?1 ORDER BY post_id LIMIT 1",
              rusqlite::params![title],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(id.map(PostId))
  }

  async fn get_post(&self, id: PostId) -> Result<Option<Post>> {
    let raw: Option<RawPost> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM posts p WHERE p.post_id = ?1", RawPost::COLUMNS),
              rusqlite::params![id.0],
              RawPost::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawPost::into_post).transpose()
  }

  async fn list_posts(&self, query: &PostQuery) -> Result<Vec<Post>> {
    let post_type = query.post_type.clone();
    let title     = query.title.clone();
    let term      = query.term.map(|t| t.0);
    let limit_val = query.limit.map_or(-1, |l| l as i64);

    let raws: Vec<RawPost> = self
      .conn
      .call(move |conn| {
        // Build WHERE clause dynamically.
        let mut conds: Vec<&'static str> = vec![];
        if post_type.is_some() {
          conds.push("p.post_type = ?1");
        }
        if title.is_some() {
          conds.push("p.title = ?2");
        }
        if term.is_some() {
          conds.push(
            "EXISTS (SELECT 1 FROM term_relationships r
                     WHERE r.post_id = p.post_id AND r.term_id = ?3)",
          );
        }

        let where_clause = if conds.is_empty() {
          String::new()
        } else {
          format!("WHERE {}", conds.join(" AND "))
        };

        let sql = format!(
          "SELECT {} FROM posts p
           {where_clause}
           ORDER BY p.post_id
           LIMIT ?4",
          RawPost::COLUMNS
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![post_type.as_deref(), title.as_deref(), term, limit_val],
            RawPost::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPost::into_post).collect()
  }

  async fn create_post(&self, post: NewPost) -> Result<PostId> {
    let base        = slugify(&post.title);
    let created_str = post.created_at.map(encode_dt);
    let status      = post.status.as_str().to_owned();

    let id = self
      .conn
      .call(move |conn| {
        let mut slug = base.clone();
        let mut n = 1;
        while conn
          .query_row(
            "SELECT 1 FROM posts WHERE slug = ?1",
            rusqlite::params![slug],
            |_| Ok(()),
          )
          .optional()?
          .is_some()
        {
          n += 1;
          slug = format!("{base}-{n}");
        }

        conn.execute(
          "INSERT INTO posts (post_type, title, slug, body, status, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![post.post_type, post.title, slug, post.body, status, created_str],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    tracing::trace!(post_id = id, "created post");
    Ok(PostId(id))
  }

  async fn delete_post(&self, id: PostId) -> Result<()> {
    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM fields WHERE owner_kind = 'post' AND owner_id = ?1",
          rusqlite::params![id.0],
        )?;
        tx.execute(
          "DELETE FROM term_relationships WHERE post_id = ?1",
          rusqlite::params![id.0],
        )?;
        let n = tx.execute("DELETE FROM posts WHERE post_id = ?1", rusqlite::params![id.0])?;
        tx.commit()?;
        Ok(n)
      })
      .await?;

    if deleted == 0 {
      return Err(Error::PostNotFound(id));
    }
    Ok(())
  }

  async fn permalink(&self, id: PostId) -> Result<Option<String>> {
    let row: Option<(String, String)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT post_type, slug FROM posts WHERE post_id = ?1",
              rusqlite::params![id.0],
              |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?,
        )
      })
      .await?;

    Ok(row.map(|(post_type, slug)| match post_type.as_str() {
      "post" | "page" => format!("{}/{slug}/", self.settings.site_url),
      _ => format!("{}/{post_type}/{slug}/", self.settings.site_url),
    }))
  }

  async fn post_for_url(&self, url: &str) -> Result<Option<PostId>> {
    let Some(path) = url.trim().strip_prefix(self.settings.site_url.as_str()) else {
      return Ok(None);
    };
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<String> = path
      .split('/')
      .filter(|s| !s.is_empty())
      .map(str::to_owned)
      .collect();

    let (post_type, slug) = match segments.as_slice() {
      [slug] => (None, slug.clone()),
      [post_type, slug] => (Some(post_type.clone()), slug.clone()),
      _ => return Ok(None),
    };

    let id: Option<i64> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT post_id FROM posts
               WHERE slug = ?1
                 AND CASE WHEN ?2 IS NULL THEN post_type IN ('post', 'page')
                          ELSE post_type = ?2 END",
              rusqlite::params![slug, post_type],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(id.map(PostId))
  }

  // ── Terms ─────────────────────────────────────────────────────────────────

  async fn find_term_by_name(&self, taxonomy: &str, name: &str) -> Result<Option<TermId>> {
    let taxonomy = taxonomy.to_owned();
    let name     = name.to_owned();
    let id: Option<i64> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT term_id FROM terms WHERE taxonomy = ?1 AND name = ?2",
              rusqlite::params![taxonomy, name],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(id.map(TermId))
  }

  async fn create_term(
    &self,
    taxonomy:    &str,
    name:        &str,
    description: Option<&str>,
  ) -> Result<TermId> {
    let taxonomy_owned = taxonomy.to_owned();
    let name_owned     = name.to_owned();
    let description    = description.unwrap_or_default().to_owned();

    let inserted: Option<i64> = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT OR IGNORE INTO terms (taxonomy, name, description) VALUES (?1, ?2, ?3)",
          rusqlite::params![taxonomy_owned, name_owned, description],
        )?;
        Ok((n > 0).then(|| conn.last_insert_rowid()))
      })
      .await?;

    inserted.map(TermId).ok_or_else(|| Error::TermExists {
      taxonomy: taxonomy.to_owned(),
      name:     name.to_owned(),
    })
  }

  async fn list_terms(&self, taxonomy: &str) -> Result<Vec<Term>> {
    let taxonomy = taxonomy.to_owned();
    let raws: Vec<RawTerm> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM terms t WHERE t.taxonomy = ?1 ORDER BY t.term_id",
          RawTerm::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![taxonomy], RawTerm::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(raws.into_iter().map(RawTerm::into_term).collect())
  }

  async fn set_post_terms(&self, post: PostId, term: TermId, taxonomy: &str) -> Result<()> {
    self.check_taxonomy(term, taxonomy).await?;
    if !self.post_exists(post).await? {
      return Err(Error::PostNotFound(post));
    }

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO term_relationships (post_id, term_id) VALUES (?1, ?2)",
          rusqlite::params![post.0, term.0],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn replace_post_terms(
    &self,
    post:     PostId,
    taxonomy: &str,
    terms:    &[TermId],
  ) -> Result<()> {
    for &term in terms {
      self.check_taxonomy(term, taxonomy).await?;
    }
    if !self.post_exists(post).await? {
      return Err(Error::PostNotFound(post));
    }

    let taxonomy = taxonomy.to_owned();
    let terms: Vec<i64> = terms.iter().map(|t| t.0).collect();
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM term_relationships
           WHERE post_id = ?1
             AND term_id IN (SELECT term_id FROM terms WHERE taxonomy = ?2)",
          rusqlite::params![post.0, taxonomy],
        )?;
        for term in terms {
          tx.execute(
            "INSERT OR IGNORE INTO term_relationships (post_id, term_id) VALUES (?1, ?2)",
            rusqlite::params![post.0, term],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn post_terms(&self, post: PostId, taxonomy: &str) -> Result<Vec<Term>> {
    let taxonomy = taxonomy.to_owned();
    let raws: Vec<RawTerm> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM terms t
           JOIN term_relationships r ON r.term_id = t.term_id
           WHERE r.post_id = ?1 AND t.taxonomy = ?2
           ORDER BY t.term_id",
          RawTerm::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![post.0, taxonomy], RawTerm::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(raws.into_iter().map(RawTerm::into_term).collect())
  }

  async fn delete_term(&self, id: TermId) -> Result<()> {
    let deleted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM fields WHERE owner_kind = 'term' AND owner_id = ?1",
          rusqlite::params![id.0],
        )?;
        tx.execute(
          "DELETE FROM term_relationships WHERE term_id = ?1",
          rusqlite::params![id.0],
        )?;
        let n = tx.execute("DELETE FROM terms WHERE term_id = ?1", rusqlite::params![id.0])?;
        tx.commit()?;
        Ok(n)
      })
      .await?;

    if deleted == 0 {
      return Err(Error::TermNotFound(id));
    }
    Ok(())
  }

  // ── Media ─────────────────────────────────────────────────────────────────

  async fn store_media(&self, local_path: &Path, metadata: MediaMetadata) -> Result<MediaId> {
    let name = sanitize_file_name(&metadata.name)
      .ok_or_else(|| Error::InvalidFileName(metadata.name.clone()))?;
    let folder = metadata
      .upload_date
      .filter(|d| valid_upload_date(d))
      .unwrap_or_else(|| Utc::now().format("%Y/%m").to_string());

    let dir = self.settings.upload_dir.join(&folder);
    tokio::fs::create_dir_all(&dir).await?;
    let file_name = Self::unique_file_name(&dir, &name).await?;

    let bytes = tokio::fs::read(local_path).await?;
    let content_hash = hex::encode(Sha256::digest(&bytes));
    let target = dir.join(&file_name);
    if let Err(e) = tokio::fs::write(&target, &bytes).await {
      discard(&target).await;
      return Err(e.into());
    }

    let file_path  = format!("{folder}/{file_name}");
    let created_at = encode_dt(Utc::now().naive_utc());
    let mime_type  = metadata.mime_type;
    let title      = metadata.title;
    let source_url = metadata.source_url;
    let stored     = file_path.clone();

    let inserted = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO media (file_path, mime_type, title, source_url, content_hash, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![file_path, mime_type, title, source_url, content_hash, created_at],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await;
    let id = match inserted {
      Ok(id) => id,
      Err(e) => {
        discard(&target).await;
        return Err(e.into());
      }
    };

    tracing::debug!(media_id = id, file = %stored, "stored media");
    Ok(MediaId(id))
  }

  async fn list_media(&self) -> Result<Vec<Media>> {
    let raws: Vec<RawMedia> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT media_id, file_path, mime_type, source_url, content_hash
           FROM media ORDER BY media_id",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawMedia {
              media_id:     row.get(0)?,
              file_path:    row.get(1)?,
              mime_type:    row.get(2)?,
              source_url:   row.get(3)?,
              content_hash: row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(raws.into_iter().map(RawMedia::into_media).collect())
  }

  async fn delete_media(&self, id: MediaId) -> Result<()> {
    let file_path: Option<String> = self
      .conn
      .call(move |conn| {
        let path = conn
          .query_row(
            "SELECT file_path FROM media WHERE media_id = ?1",
            rusqlite::params![id.0],
            |r| r.get(0),
          )
          .optional()?;
        conn.execute("DELETE FROM media WHERE media_id = ?1", rusqlite::params![id.0])?;
        Ok(path)
      })
      .await?;

    let file_path = file_path.ok_or(Error::MediaNotFound(id))?;
    match tokio::fs::remove_file(self.settings.upload_dir.join(&file_path)).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        tracing::warn!(media_id = %id, file = %file_path, "media file already missing");
        Ok(())
      }
      Err(e) => Err(e.into()),
    }
  }

  // ── Custom fields ─────────────────────────────────────────────────────────

  async fn get_custom_field(&self, key: &str, owner: FieldOwner) -> Result<Option<Value>> {
    let key = key.to_owned();
    let (kind, owner_id) = encode_owner(owner);
    let raw: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT value_json FROM fields
               WHERE owner_kind = ?1 AND owner_id = ?2 AND key = ?3",
              rusqlite::params![kind, owner_id, key],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
  }

  async fn set_custom_field(&self, key: &str, owner: FieldOwner, value: Value) -> Result<()> {
    let key        = key.to_owned();
    let value_json = serde_json::to_string(&value)?;
    let (kind, owner_id) = encode_owner(owner);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO fields (owner_kind, owner_id, key, value_json) VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (owner_kind, owner_id, key)
           DO UPDATE SET value_json = excluded.value_json",
          rusqlite::params![kind, owner_id, key, value_json],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
