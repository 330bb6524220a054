//! First-run seeding: a default admin account and two sample courses.

use chrono::{DateTime, Utc};
use echopod_core::hearts::{Difficulty, HeartState};
use echopod_core::srt;
use tracing::warn;

use crate::courses::{NewCourse, NewSentence};
use crate::error::Result;
use crate::store::Store;
use crate::users::NewUser;

/// Username of the seeded administrator account.
pub const DEFAULT_ADMIN_USERNAME: &str = "default_user";

/// What [`seed`] created, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    /// Accounts created (0 or 1).
    pub users_created: usize,
    /// Courses created.
    pub courses_created: usize,
    /// Sentence exercises created.
    pub sentences_created: usize,
}

/// Seeds an empty database.
///
/// Creates the default admin/VIP account when no users exist, and two sample
/// courses (with sentences parsed from `sample_srt`, when provided) when no
/// courses exist. Safe to call repeatedly; a populated table is left alone.
pub fn seed(
    store: &Store,
    admin_password_hash: &str,
    sample_srt: Option<&str>,
    now: DateTime<Utc>,
) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    if store.count_users()? == 0 {
        store.insert_user(
            &NewUser {
                username: DEFAULT_ADMIN_USERNAME.to_string(),
                email: "admin@example.com".to_string(),
                password_hash: admin_password_hash.to_string(),
                is_admin: true,
                is_vip: true,
                hearts: HeartState::new(now),
            },
            now,
        )?;
        summary.users_created = 1;
    }

    if store.count_courses()? == 0 {
        let Some(admin) = store.find_user_by_username(DEFAULT_ADMIN_USERNAME)? else {
            return Ok(summary);
        };

        let sentences: Vec<NewSentence> = match sample_srt.map(srt::parse) {
            Some(Ok(subs)) => subs
                .into_iter()
                .map(|sub| NewSentence {
                    text: sub.text,
                    start_seconds: Some(sub.start_seconds),
                    end_seconds: Some(sub.end_seconds),
                })
                .collect(),
            Some(Err(e)) => {
                warn!(error = %e, "Sample subtitle file failed to parse; seeding courses without sentences");
                Vec::new()
            }
            None => Vec::new(),
        };

        let samples = [
            NewCourse {
                title: "Basic English Listening".to_string(),
                difficulty: Difficulty::Easy,
                description: Some("Everyday dialogue practice for beginners".to_string()),
                original_audio_path: None,
                srt_path: None,
                user_id: admin.id,
            },
            NewCourse {
                title: "Business English".to_string(),
                difficulty: Difficulty::Normal,
                description: Some("Listening material for common business settings".to_string()),
                original_audio_path: None,
                srt_path: None,
                user_id: admin.id,
            },
        ];

        for course in &samples {
            let course_id = store.insert_course(course)?;
            summary.courses_created += 1;
            summary.sentences_created += store.insert_sentences(course_id, &sentences)?;
        }
    }

    Ok(summary)
}
