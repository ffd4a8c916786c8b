//! SQL schema for the destination store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS posts (
    post_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    post_type   TEXT NOT NULL,
    title       TEXT NOT NULL,
    slug        TEXT NOT NULL UNIQUE,
    body        TEXT NOT NULL DEFAULT '',
    status      TEXT NOT NULL,           -- 'publish' | 'draft' | legacy verbatim
    created_at  TEXT                     -- '%Y-%m-%d %H:%M:%S' or NULL
);

CREATE TABLE IF NOT EXISTS terms (
    term_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    taxonomy    TEXT NOT NULL,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    UNIQUE (taxonomy, name)
);

CREATE TABLE IF NOT EXISTS term_relationships (
    post_id     INTEGER NOT NULL REFERENCES posts(post_id) ON DELETE CASCADE,
    term_id     INTEGER NOT NULL REFERENCES terms(term_id) ON DELETE CASCADE,
    PRIMARY KEY (post_id, term_id)
);

CREATE TABLE IF NOT EXISTS media (
    media_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path    TEXT NOT NULL,          -- relative to the upload directory
    mime_type    TEXT NOT NULL,
    title        TEXT NOT NULL DEFAULT '',
    source_url   TEXT NOT NULL DEFAULT '',
    content_hash TEXT NOT NULL,          -- SHA-256 hex of the stored bytes
    created_at   TEXT NOT NULL
);

-- Custom field values for posts and terms, JSON-encoded.
CREATE TABLE IF NOT EXISTS fields (
    owner_kind  TEXT NOT NULL,           -- 'post' | 'term'
    owner_id    INTEGER NOT NULL,
    key         TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    PRIMARY KEY (owner_kind, owner_id, key)
);

CREATE TABLE IF NOT EXISTS options (
    name        TEXT PRIMARY KEY,
    value_json  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS plugins (
    name        TEXT PRIMARY KEY
);

CREATE INDEX IF NOT EXISTS posts_title_idx   ON posts(title);
CREATE INDEX IF NOT EXISTS posts_type_idx    ON posts(post_type);
CREATE INDEX IF NOT EXISTS term_rel_term_idx ON term_relationships(term_id);

PRAGMA user_version = 1;
";
