//! Learner progress: per-course completion and per-level completion.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::error::Result;
use crate::store::{ts_from_sql, ts_to_sql, Store};

/// One user's completion record for one course, joined with its title.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressRecord {
    /// The course this record covers.
    pub course_id: i64,
    /// Course title at query time.
    pub course_title: String,
    /// Whether the course has been completed.
    pub completed: bool,
    /// When it was completed, if it was.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Store {
    /// Marks a course completed for a user, creating or updating the unique
    /// per-user-per-course record.
    pub fn mark_course_complete(
        &self,
        user_id: i64,
        course_id: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO user_progress (user_id, course_id, completed, completed_at)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT (user_id, course_id)
             DO UPDATE SET completed = 1, completed_at = ?3",
            params![user_id, course_id, ts_to_sql(now)],
        )?;
        Ok(())
    }

    /// Whether a user has completed a given course.
    pub fn course_completed(&self, user_id: i64, course_id: i64) -> Result<bool> {
        let completed: Option<bool> = self
            .conn()
            .query_row(
                "SELECT completed FROM user_progress WHERE user_id = ?1 AND course_id = ?2",
                params![user_id, course_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(completed.unwrap_or(false))
    }

    /// Ids of every course the user has completed.
    pub fn completed_course_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self.conn().prepare(
            "SELECT course_id FROM user_progress WHERE user_id = ?1 AND completed = 1",
        )?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// Every progress record for a user, joined with course titles.
    pub fn progress_for_user(&self, user_id: i64) -> Result<Vec<ProgressRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT p.course_id, c.title, p.completed, p.completed_at
             FROM user_progress p
             JOIN courses c ON c.id = p.course_id
             WHERE p.user_id = ?1
             ORDER BY p.course_id",
        )?;
        let records = stmt
            .query_map(params![user_id], |row| {
                let completed_at: Option<String> = row.get(3)?;
                Ok(ProgressRecord {
                    course_id: row.get(0)?,
                    course_title: row.get(1)?,
                    completed: row.get(2)?,
                    completed_at: completed_at
                        .as_deref()
                        .map(|s| ts_from_sql(3, s))
                        .transpose()?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Records a level completion. Returns `false` when the level was
    /// already recorded (the operation is idempotent).
    pub fn insert_level_completion(
        &self,
        user_id: i64,
        course_id: i64,
        level_index: i64,
    ) -> Result<bool> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO level_completions (user_id, course_id, level_index)
             VALUES (?1, ?2, ?3)",
            params![user_id, course_id, level_index],
        )?;
        Ok(inserted > 0)
    }

    /// Level indexes the user has completed within a course, ascending.
    pub fn completed_levels(&self, user_id: i64, course_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self.conn().prepare(
            "SELECT level_index FROM level_completions
             WHERE user_id = ?1 AND course_id = ?2
             ORDER BY level_index",
        )?;
        let levels = stmt
            .query_map(params![user_id, course_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(levels)
    }

    /// Total recorded level completions across all users.
    pub fn count_level_completions(&self) -> Result<i64> {
        let count = self
            .conn()
            .query_row("SELECT COUNT(*) FROM level_completions", [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }
}
