// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Edition persistence backed by SQLite.
//
// One row per edition. Scalar fields get their own columns so they can be
// indexed and filtered; the page array is stored as a JSON document and is
// always written whole. `id`, `native_id` and `slug` are unique, and a
// uniqueness violation on insert/update is reported as an outcome rather
// than an error so the caller can pick another id or slug and retry.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use broadsheet_core::error::{BroadsheetError, Result};
use broadsheet_core::types::{Edition, EditionId, EditionLookup, EditionStatus, Page};

use crate::slug::SlugProbe;

/// SQLite schema for the editions table.
const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS editions (
        id INTEGER PRIMARY KEY,
        native_id TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        slug TEXT UNIQUE,
        publication_date TEXT NOT NULL,
        status TEXT NOT NULL,
        pages TEXT NOT NULL DEFAULT '[]',
        cover_share_url TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS editions_by_date ON editions (publication_date DESC, id DESC);
"#;

const SELECT_COLUMNS: &str = "SELECT id, native_id, title, slug, publication_date, status, \
                              pages, cover_share_url, created_at, updated_at FROM editions";

/// Result of inserting a new edition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another edition already has this public id.
    IdTaken,
    /// Another edition already has this slug.
    SlugTaken,
}

/// Result of replacing an existing edition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Updated,
    SlugTaken,
    /// No row with this id (deleted concurrently).
    Missing,
}

/// Edition table handle.
///
/// Synchronous, like every `rusqlite` API; async callers hold it behind a
/// mutex and keep critical sections free of `.await`.
pub struct EditionStore {
    conn: Connection,
}

impl EditionStore {
    /// Open (or create) the edition database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| BroadsheetError::Database(format!("open: {e}")))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| BroadsheetError::Database(format!("WAL pragma: {e}")))?;

        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| BroadsheetError::Database(format!("create table: {e}")))?;

        info!("edition database opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BroadsheetError::Database(format!("open in-memory: {e}")))?;

        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| BroadsheetError::Database(format!("create table: {e}")))?;

        debug!("in-memory edition database opened");
        Ok(Self { conn })
    }

    #[instrument(skip(self, edition), fields(id = %edition.id))]
    pub fn insert(&self, edition: &Edition) -> Result<InsertOutcome> {
        let pages_json = serde_json::to_string(&edition.pages)?;

        let outcome = self.conn.execute(
            "INSERT INTO editions (id, native_id, title, slug, publication_date, status,
             pages, cover_share_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                edition.id.0,
                edition.native_id.to_string(),
                edition.title,
                edition.slug,
                edition.publication_date.to_string(),
                edition.status.as_str(),
                pages_json,
                edition.cover_share_url,
                edition.created_at.to_rfc3339(),
                edition.updated_at.to_rfc3339(),
            ],
        );

        match outcome {
            Ok(_) => {
                info!(id = %edition.id, slug = ?edition.slug, "edition inserted");
                Ok(InsertOutcome::Inserted)
            }
            Err(e) => match unique_violation(&e) {
                Some("id") => Ok(InsertOutcome::IdTaken),
                Some("slug") => Ok(InsertOutcome::SlugTaken),
                _ => Err(BroadsheetError::Database(format!("insert edition: {e}"))),
            },
        }
    }

    /// Overwrite every mutable column of the row with `edition.id`.
    #[instrument(skip(self, edition), fields(id = %edition.id))]
    pub fn replace(&self, edition: &Edition) -> Result<ReplaceOutcome> {
        let pages_json = serde_json::to_string(&edition.pages)?;

        let outcome = self.conn.execute(
            "UPDATE editions SET title = ?1, slug = ?2, publication_date = ?3, status = ?4,
             pages = ?5, cover_share_url = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                edition.title,
                edition.slug,
                edition.publication_date.to_string(),
                edition.status.as_str(),
                pages_json,
                edition.cover_share_url,
                edition.updated_at.to_rfc3339(),
                edition.id.0,
            ],
        );

        match outcome {
            Ok(0) => Ok(ReplaceOutcome::Missing),
            Ok(_) => {
                debug!(id = %edition.id, "edition replaced");
                Ok(ReplaceOutcome::Updated)
            }
            Err(e) if unique_violation(&e) == Some("slug") => Ok(ReplaceOutcome::SlugTaken),
            Err(e) => Err(BroadsheetError::Database(format!("update edition: {e}"))),
        }
    }

    #[instrument(skip(self), fields(lookup = %lookup))]
    pub fn get(&self, lookup: &EditionLookup) -> Result<Option<Edition>> {
        let (clause, key): (&str, rusqlite::types::Value) = match lookup {
            EditionLookup::ByNativeId(uuid) => ("native_id = ?1", uuid.to_string().into()),
            EditionLookup::ById(id) => ("id = ?1", id.0.into()),
            EditionLookup::BySlug(slug) => ("slug = ?1", slug.clone().into()),
        };

        self.conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE {clause}"),
                params![key],
                row_to_edition,
            )
            .optional()
            .map_err(|e| BroadsheetError::Database(format!("get edition: {e}")))
    }

    /// Remove the row. Returns whether one existed.
    #[instrument(skip(self), fields(id = %id))]
    pub fn delete(&self, id: EditionId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM editions WHERE id = ?1", params![id.0])
            .map_err(|e| BroadsheetError::Database(format!("delete edition: {e}")))?;

        info!(id = %id, existed = rows > 0, "edition deleted");
        Ok(rows > 0)
    }

    /// Editions, newest publication date first, optionally filtered by status.
    #[instrument(skip(self))]
    pub fn list(&self, status: Option<EditionStatus>) -> Result<Vec<Edition>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{SELECT_COLUMNS} WHERE (?1 IS NULL OR status = ?1)
                 ORDER BY publication_date DESC, id DESC"
            ))
            .map_err(|e| BroadsheetError::Database(format!("prepare list: {e}")))?;

        let editions = stmt
            .query_map(params![status.map(|s| s.as_str())], row_to_edition)
            .map_err(|e| BroadsheetError::Database(format!("query list: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| BroadsheetError::Database(format!("collect rows: {e}")))?;

        debug!(count = editions.len(), "editions listed");
        Ok(editions)
    }
}

impl SlugProbe for EditionStore {
    fn slug_taken(&self, slug: &str, exclude: Option<EditionId>) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM editions WHERE slug = ?1 AND (?2 IS NULL OR id != ?2))",
                params![slug, exclude.map(|id| id.0)],
                |row| row.get(0),
            )
            .map_err(|e| BroadsheetError::Database(format!("probe slug: {e}")))
    }
}

/// Column named by a UNIQUE/PRIMARY KEY violation, e.g. `Some("slug")`.
fn unique_violation(err: &rusqlite::Error) -> Option<&str> {
    match err {
        rusqlite::Error::SqliteFailure(failure, Some(message))
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            message
                .strip_prefix("UNIQUE constraint failed: ")
                .map(|column| column.rsplit('.').next().unwrap_or(column))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

/// Column indices must match `SELECT_COLUMNS`.
fn row_to_edition(row: &rusqlite::Row<'_>) -> rusqlite::Result<Edition> {
    let id: i64 = row.get(0)?;
    let native_id: String = row.get(1)?;
    let title: String = row.get(2)?;
    let slug: Option<String> = row.get(3)?;
    let publication_date: String = row.get(4)?;
    let status: String = row.get(5)?;
    let pages_json: String = row.get(6)?;
    let cover_share_url: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    let native_id = Uuid::parse_str(&native_id).map_err(|e| conversion_error(1, e))?;
    let publication_date =
        NaiveDate::parse_from_str(&publication_date, "%Y-%m-%d").map_err(|e| conversion_error(4, e))?;
    let status: EditionStatus = status.parse().map_err(|e| conversion_error(5, e))?;
    let pages: Vec<Page> = serde_json::from_str(&pages_json).map_err(|e| conversion_error(6, e))?;
    let created_at = parse_timestamp(&created_at).map_err(|e| conversion_error(8, e))?;
    let updated_at = parse_timestamp(&updated_at).map_err(|e| conversion_error(9, e))?;

    Ok(Edition {
        id: EditionId(id),
        native_id,
        title,
        slug,
        publication_date,
        status,
        pages,
        created_at,
        updated_at,
        cover_share_url,
    })
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}
