//! Courses and their sentence-level exercises.

use echopod_core::hearts::Difficulty;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use crate::error::Result;
use crate::store::Store;

/// A stored course: one audio recording plus its subtitle breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct Course {
    /// Row id.
    pub id: i64,
    /// Display title.
    pub title: String,
    /// Difficulty rating.
    pub difficulty: Difficulty,
    /// Free-form description.
    pub description: Option<String>,
    /// Stored path of the uploaded audio file.
    pub original_audio_path: Option<String>,
    /// Stored path of the uploaded subtitle file.
    pub srt_path: Option<String>,
    /// Creator's user id.
    pub user_id: i64,
}

/// Fields required to create a course.
#[derive(Debug, Clone)]
pub struct NewCourse {
    /// Display title.
    pub title: String,
    /// Difficulty rating.
    pub difficulty: Difficulty,
    /// Free-form description.
    pub description: Option<String>,
    /// Stored path of the uploaded audio file.
    pub original_audio_path: Option<String>,
    /// Stored path of the uploaded subtitle file.
    pub srt_path: Option<String>,
    /// Creator's user id.
    pub user_id: i64,
}

/// A stored sentence exercise.
#[derive(Debug, Clone, Serialize)]
pub struct Sentence {
    /// Row id.
    pub id: i64,
    /// Owning course.
    pub course_id: i64,
    /// Cue text.
    pub text: String,
    /// Cue start in seconds.
    pub start_seconds: Option<f64>,
    /// Cue end in seconds.
    pub end_seconds: Option<f64>,
    /// Optional per-sentence audio clip path.
    pub audio_segment_path: Option<String>,
}

/// Sentence fields supplied at course creation.
#[derive(Debug, Clone)]
pub struct NewSentence {
    /// Cue text.
    pub text: String,
    /// Cue start in seconds.
    pub start_seconds: Option<f64>,
    /// Cue end in seconds.
    pub end_seconds: Option<f64>,
}

fn map_course(row: &Row<'_>) -> rusqlite::Result<Course> {
    let difficulty: String = row.get(2)?;
    Ok(Course {
        id: row.get(0)?,
        title: row.get(1)?,
        difficulty: Difficulty::from_str_case_insensitive(&difficulty).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                Type::Text,
                format!("unknown difficulty '{difficulty}'").into(),
            )
        })?,
        description: row.get(3)?,
        original_audio_path: row.get(4)?,
        srt_path: row.get(5)?,
        user_id: row.get(6)?,
    })
}

const COURSE_COLUMNS: &str =
    "id, title, difficulty, description, original_audio_path, srt_path, user_id";

impl Store {
    /// Inserts a course and returns its id.
    pub fn insert_course(&self, course: &NewCourse) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO courses (title, difficulty, description, original_audio_path,
                 srt_path, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                course.title,
                course.difficulty.as_str(),
                course.description,
                course.original_audio_path,
                course.srt_path,
                course.user_id,
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Loads one course.
    pub fn find_course(&self, id: i64) -> Result<Option<Course>> {
        let course = self
            .conn()
            .query_row(
                &format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?1"),
                params![id],
                map_course,
            )
            .optional()?;
        Ok(course)
    }

    /// Lists every course, oldest first.
    pub fn list_courses(&self) -> Result<Vec<Course>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT {COURSE_COLUMNS} FROM courses ORDER BY id"))?;
        let courses = stmt
            .query_map([], map_course)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(courses)
    }

    /// Lists the courses created by one user.
    pub fn courses_by_user(&self, user_id: i64) -> Result<Vec<Course>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE user_id = ?1 ORDER BY id"
        ))?;
        let courses = stmt
            .query_map(params![user_id], map_course)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(courses)
    }

    /// Number of courses created by one user.
    pub fn count_courses_by_user(&self, user_id: i64) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM courses WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Total number of courses.
    pub fn count_courses(&self) -> Result<i64> {
        let count = self
            .conn()
            .query_row("SELECT COUNT(*) FROM courses", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Updates a course's title and/or description.
    pub fn update_course_meta(
        &self,
        id: i64,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<()> {
        if let Some(title) = title {
            self.conn().execute(
                "UPDATE courses SET title = ?1 WHERE id = ?2",
                params![title, id],
            )?;
        }
        if let Some(description) = description {
            self.conn().execute(
                "UPDATE courses SET description = ?1 WHERE id = ?2",
                params![description, id],
            )?;
        }
        Ok(())
    }

    /// Deletes a course and its sentences and progress records.
    pub fn delete_course(&self, id: i64) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM level_completions WHERE course_id = ?1",
            params![id],
        )?;
        conn.execute(
            "DELETE FROM user_progress WHERE course_id = ?1",
            params![id],
        )?;
        conn.execute("DELETE FROM sentences WHERE course_id = ?1", params![id])?;
        conn.execute("DELETE FROM courses WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Bulk-inserts the sentences for a freshly created course.
    pub fn insert_sentences(&self, course_id: i64, sentences: &[NewSentence]) -> Result<usize> {
        let mut stmt = self.conn().prepare(
            "INSERT INTO sentences (course_id, text, start_seconds, end_seconds)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for sentence in sentences {
            stmt.execute(params![
                course_id,
                sentence.text,
                sentence.start_seconds,
                sentence.end_seconds,
            ])?;
        }
        Ok(sentences.len())
    }

    /// Lists a course's sentences in cue order.
    pub fn sentences_for_course(&self, course_id: i64) -> Result<Vec<Sentence>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, course_id, text, start_seconds, end_seconds, audio_segment_path
             FROM sentences WHERE course_id = ?1 ORDER BY id",
        )?;
        let sentences = stmt
            .query_map(params![course_id], |row| {
                Ok(Sentence {
                    id: row.get(0)?,
                    course_id: row.get(1)?,
                    text: row.get(2)?,
                    start_seconds: row.get(3)?,
                    end_seconds: row.get(4)?,
                    audio_segment_path: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sentences)
    }

    /// Collects every stored file path belonging to a user's courses, for
    /// the caller to unlink before [`Store::delete_user`].
    pub fn file_paths_for_user_courses(&self, user_id: i64) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        for course in self.courses_by_user(user_id)? {
            paths.extend(course.original_audio_path.clone());
            paths.extend(course.srt_path.clone());
            for sentence in self.sentences_for_course(course.id)? {
                paths.extend(sentence.audio_segment_path);
            }
        }
        Ok(paths)
    }
}
