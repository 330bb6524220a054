//! Database connection, schema, and shared row-mapping helpers.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;

use crate::error::Result;

/// Storage format for calendar dates.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed store for all EchoPod records.
///
/// Holds a single connection; callers serialize access behind their own
/// lock. Every ledger mutation is a read of one row followed by a single
/// `UPDATE` of that row, so with per-request lock holds the store's
/// last-write-wins behavior is exactly the documented concurrency model.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (or creates) the database at `path` and applies the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Opens an in-memory database, for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Direct access to the underlying connection.
    pub(crate) const fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Creates any missing tables and indexes.
    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id                      INTEGER PRIMARY KEY AUTOINCREMENT,
                username                TEXT NOT NULL UNIQUE,
                email                   TEXT NOT NULL UNIQUE,
                password_hash           TEXT NOT NULL,
                is_admin                INTEGER NOT NULL DEFAULT 0,
                is_vip                  INTEGER NOT NULL DEFAULT 0,
                is_active               INTEGER NOT NULL DEFAULT 1,
                created_at              TEXT NOT NULL,
                last_login              TEXT,
                hearts                  INTEGER NOT NULL,
                bonus_hearts            INTEGER NOT NULL DEFAULT 0,
                max_hearts              INTEGER NOT NULL,
                last_heart_update       TEXT NOT NULL,
                last_daily_reset        TEXT NOT NULL,
                is_newbie               INTEGER NOT NULL DEFAULT 1,
                newbie_protection_count INTEGER NOT NULL,
                consecutive_correct     INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS courses (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                title               TEXT NOT NULL,
                difficulty          TEXT NOT NULL DEFAULT 'normal',
                description         TEXT,
                original_audio_path TEXT,
                srt_path            TEXT,
                user_id             INTEGER NOT NULL REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS sentences (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                course_id          INTEGER NOT NULL REFERENCES courses(id),
                text               TEXT NOT NULL,
                start_seconds      REAL,
                end_seconds        REAL,
                audio_segment_path TEXT
            );

            CREATE TABLE IF NOT EXISTS user_progress (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id      INTEGER NOT NULL REFERENCES users(id),
                course_id    INTEGER NOT NULL REFERENCES courses(id),
                completed    INTEGER NOT NULL DEFAULT 0,
                completed_at TEXT,
                UNIQUE (user_id, course_id)
            );

            CREATE TABLE IF NOT EXISTS level_completions (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id),
                course_id   INTEGER NOT NULL REFERENCES courses(id),
                level_index INTEGER NOT NULL,
                UNIQUE (user_id, course_id, level_index)
            );

            CREATE INDEX IF NOT EXISTS idx_sentences_course ON sentences(course_id);
            CREATE INDEX IF NOT EXISTS idx_courses_user ON courses(user_id);
            CREATE INDEX IF NOT EXISTS idx_progress_user ON user_progress(user_id);
            CREATE INDEX IF NOT EXISTS idx_levels_user_course
                ON level_completions(user_id, course_id);",
        )?;
        Ok(())
    }

    /// Drops every table and recreates the schema. Used by `init-db`.
    pub fn reset(&self) -> Result<()> {
        self.conn.execute_batch(
            "DROP TABLE IF EXISTS level_completions;
             DROP TABLE IF EXISTS user_progress;
             DROP TABLE IF EXISTS sentences;
             DROP TABLE IF EXISTS courses;
             DROP TABLE IF EXISTS users;",
        )?;
        self.migrate()
    }
}

// ============================================================================
// Row-mapping helpers
// ============================================================================

/// Renders a timestamp into its storage form.
pub(crate) fn ts_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Renders a date into its storage form.
pub(crate) fn date_to_sql(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses a stored timestamp, reporting corruption as a column error.
pub(crate) fn ts_from_sql(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Parses a stored date, reporting corruption as a column error.
pub(crate) fn date_from_sql(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
