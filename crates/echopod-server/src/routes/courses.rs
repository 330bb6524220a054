//! Course handlers: upload, listing, metadata, sentences, deletion.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use axum::extract::multipart::Multipart;
use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use echopod_core::hearts::Difficulty;
use echopod_core::srt;
use echopod_store::{NewCourse, NewSentence, User};

use crate::api::{AppState, MessageResponse};
use crate::auth::{AuthUser, MaybeUser};
use crate::error::ApiError;

/// Whether a user may modify or delete a course.
fn can_edit(user: &User, course_owner: i64) -> bool {
    user.is_admin || user.id == course_owner
}

/// Reduces an uploaded filename to a safe basename.
///
/// Path separators and anything outside `[A-Za-z0-9._-]` become `_`, and
/// leading dots are stripped so the result can neither traverse out of the
/// upload directory nor hide itself.
fn sanitize_filename(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Best-effort removal of stored files; absence is not an error.
pub(crate) async fn remove_stored_files(paths: &[String]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path, error = %e, "Failed to remove stored file");
            }
        }
    }
}

// ============================================================================
// Create (multipart upload)
// ============================================================================

/// Response body for course creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCourseResponse {
    /// Outcome description.
    pub message: String,
    /// Id of the new course.
    pub course_id: i64,
}

#[derive(Default)]
struct UploadForm {
    title: Option<String>,
    description: Option<String>,
    difficulty: Option<String>,
    audio: Option<(String, Vec<u8>)>,
    subtitle: Option<(String, Vec<u8>)>,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::MalformedRequest(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => {
                form.title = Some(field.text().await.map_err(|e| {
                    ApiError::MalformedRequest(format!("Invalid title field: {e}"))
                })?);
            }
            "description" => {
                form.description = Some(field.text().await.map_err(|e| {
                    ApiError::MalformedRequest(format!("Invalid description field: {e}"))
                })?);
            }
            "difficulty" => {
                form.difficulty = Some(field.text().await.map_err(|e| {
                    ApiError::MalformedRequest(format!("Invalid difficulty field: {e}"))
                })?);
            }
            "audio_file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::MalformedRequest(format!("Invalid audio file: {e}"))
                })?;
                form.audio = Some((filename, bytes.to_vec()));
            }
            "subtitle_file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::MalformedRequest(format!("Invalid subtitle file: {e}"))
                })?;
                form.subtitle = Some((filename, bytes.to_vec()));
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Handler for `POST /api/courses`.
///
/// VIP/admin only. Stores the uploaded audio (and optional SRT) under the
/// upload directory and breaks the SRT into sentence rows; an unparseable
/// SRT is logged and skipped rather than failing the upload.
pub async fn create_course(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<CreateCourseResponse>), ApiError> {
    if !user.is_vip && !user.is_admin {
        return Err(ApiError::Forbidden(
            "Only VIP users or admins can create courses".to_string(),
        ));
    }

    let form = read_upload_form(multipart).await?;

    let title = form
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::MalformedRequest("Title is required".to_string()))?
        .to_string();

    let difficulty = match form.difficulty.as_deref() {
        None | Some("") => Difficulty::Normal,
        Some(raw) => Difficulty::from_str_case_insensitive(raw)
            .ok_or_else(|| ApiError::MalformedRequest("Invalid difficulty level".to_string()))?,
    };

    let (audio_name, audio_bytes) = form
        .audio
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| ApiError::MalformedRequest("No audio file provided".to_string()))?;

    let upload_dir = Path::new(&state.config.upload_dir);
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to create upload dir: {e}")))?;

    let audio_path = upload_dir.join(sanitize_filename(&audio_name));
    tokio::fs::write(&audio_path, &audio_bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to store audio file: {e}")))?;
    let audio_path = audio_path.to_string_lossy().into_owned();

    // The subtitle file is optional; a course without one simply has no
    // sentence breakdown.
    let mut srt_path = None;
    let mut sentences = Vec::new();
    if let Some((name, bytes)) = form.subtitle.filter(|(name, _)| !name.is_empty()) {
        let path = upload_dir.join(sanitize_filename(&name));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| ApiError::Internal(format!("failed to store subtitle file: {e}")))?;
        srt_path = Some(path.to_string_lossy().into_owned());

        match srt::parse(&String::from_utf8_lossy(&bytes)) {
            Ok(subs) => {
                sentences = subs
                    .into_iter()
                    .map(|sub| NewSentence {
                        text: sub.text,
                        start_seconds: Some(sub.start_seconds),
                        end_seconds: Some(sub.end_seconds),
                    })
                    .collect();
            }
            Err(e) => {
                warn!(error = %e, "Uploaded subtitle file failed to parse; course created without sentences");
            }
        }
    }

    let store = state.store.lock().await;
    let course_id = store.insert_course(&NewCourse {
        title: title.clone(),
        difficulty,
        description: form.description,
        original_audio_path: Some(audio_path),
        srt_path,
        user_id: user.id,
    })?;
    let sentence_count = store.insert_sentences(course_id, &sentences)?;
    drop(store);

    info!(
        course_id,
        user_id = user.id,
        title = %title,
        sentences = sentence_count,
        "Course created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateCourseResponse {
            message: "Course created successfully".to_string(),
            course_id,
        }),
    ))
}

// ============================================================================
// Listing and detail
// ============================================================================

/// One entry in the course listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseListItem {
    /// Course id.
    pub id: i64,
    /// Display title.
    pub title: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Difficulty rating.
    pub difficulty: Difficulty,
    /// Creator's user id.
    pub user_id: i64,
    /// Whether the requesting user has completed this course; `false` for
    /// anonymous requests.
    pub completed: bool,
}

/// Handler for `GET /api/courses/all`.
///
/// Public; a valid bearer token personalizes the `completed` flags.
pub async fn list_courses(
    State(state): State<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
) -> Result<Json<Vec<CourseListItem>>, ApiError> {
    let store = state.store.lock().await;
    let courses = store.list_courses()?;
    let completed: HashSet<i64> = match user {
        Some(ref user) => store.completed_course_ids(user.id)?.into_iter().collect(),
        None => HashSet::new(),
    };
    drop(store);

    let items = courses
        .into_iter()
        .map(|course| CourseListItem {
            completed: completed.contains(&course.id),
            id: course.id,
            title: course.title,
            description: course.description,
            difficulty: course.difficulty,
            user_id: course.user_id,
        })
        .collect();

    Ok(Json(items))
}

/// Course detail returned by `GET /api/courses/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseDetail {
    /// Course id.
    pub id: i64,
    /// Display title.
    pub title: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Difficulty rating.
    pub difficulty: Difficulty,
    /// Basename of the stored audio file, servable under `/uploads`.
    pub audio_filename: Option<String>,
    /// Basename of the stored subtitle file.
    pub srt_filename: Option<String>,
}

fn basename(path: &str) -> Option<String> {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Handler for `GET /api/courses/{id}`.
pub async fn get_course(
    State(state): State<Arc<AppState>>,
    UrlPath(course_id): UrlPath<i64>,
) -> Result<Json<CourseDetail>, ApiError> {
    let store = state.store.lock().await;
    let course = store
        .find_course(course_id)?
        .ok_or_else(|| ApiError::NotFound(format!("Course {course_id} not found")))?;
    drop(store);

    Ok(Json(CourseDetail {
        id: course.id,
        title: course.title,
        description: course.description,
        difficulty: course.difficulty,
        audio_filename: course.original_audio_path.as_deref().and_then(basename),
        srt_filename: course.srt_path.as_deref().and_then(basename),
    }))
}

// ============================================================================
// Update and delete
// ============================================================================

/// Request body for `PUT /api/courses/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCourseRequest {
    /// Replacement title.
    #[serde(default)]
    pub title: Option<String>,
    /// Replacement description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Handler for `PUT /api/courses/{id}`. Owner or admin only.
pub async fn update_course(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    UrlPath(course_id): UrlPath<i64>,
    Json(request): Json<UpdateCourseRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let store = state.store.lock().await;
    let course = store
        .find_course(course_id)?
        .ok_or_else(|| ApiError::NotFound(format!("Course {course_id} not found")))?;

    if !can_edit(&user, course.user_id) {
        return Err(ApiError::Forbidden("Permission denied".to_string()));
    }

    store.update_course_meta(
        course_id,
        request.title.as_deref(),
        request.description.as_deref(),
    )?;
    drop(store);

    info!(course_id, user_id = user.id, "Course updated");
    Ok(Json(MessageResponse::new("Course updated successfully")))
}

/// Handler for `DELETE /api/courses/{id}`. Owner or admin only; removes the
/// stored files along with the rows.
pub async fn delete_course(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    UrlPath(course_id): UrlPath<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let store = state.store.lock().await;
    let course = store
        .find_course(course_id)?
        .ok_or_else(|| ApiError::NotFound(format!("Course {course_id} not found")))?;

    if !can_edit(&user, course.user_id) {
        return Err(ApiError::Forbidden("Permission denied".to_string()));
    }

    let mut stored_files: Vec<String> = Vec::new();
    stored_files.extend(course.original_audio_path.clone());
    stored_files.extend(course.srt_path.clone());
    for sentence in store.sentences_for_course(course_id)? {
        stored_files.extend(sentence.audio_segment_path);
    }

    store.delete_course(course_id)?;
    drop(store);

    remove_stored_files(&stored_files).await;

    info!(course_id, user_id = user.id, "Course deleted");
    Ok(Json(MessageResponse::new("Course deleted successfully")))
}

// ============================================================================
// Sentences
// ============================================================================

/// One sentence-level exercise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceDto {
    /// Cue number within the course, 1-based.
    pub id: u32,
    /// Cue text.
    pub text: String,
    /// Cue start in seconds.
    pub start_time: f64,
    /// Cue end in seconds.
    pub end_time: f64,
}

/// Handler for `GET /api/courses/{id}/sentences`.
///
/// Serves the sentence rows created at upload time; courses that predate
/// their rows fall back to re-parsing the stored SRT file.
pub async fn course_sentences(
    State(state): State<Arc<AppState>>,
    UrlPath(course_id): UrlPath<i64>,
) -> Result<Json<Vec<SentenceDto>>, ApiError> {
    let store = state.store.lock().await;
    let course = store
        .find_course(course_id)?
        .ok_or_else(|| ApiError::NotFound(format!("Course {course_id} not found")))?;
    let rows = store.sentences_for_course(course_id)?;
    drop(store);

    if !rows.is_empty() {
        let sentences = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| SentenceDto {
                id: u32::try_from(i + 1).unwrap_or(u32::MAX),
                text: row.text,
                start_time: row.start_seconds.unwrap_or(0.0),
                end_time: row.end_seconds.unwrap_or(0.0),
            })
            .collect();
        return Ok(Json(sentences));
    }

    let srt_path = course
        .srt_path
        .ok_or_else(|| ApiError::NotFound("SRT file not found".to_string()))?;
    let content = tokio::fs::read_to_string(&srt_path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ApiError::NotFound("SRT file not found".to_string())
        } else {
            ApiError::Internal(format!("failed to read subtitle file: {e}"))
        }
    })?;

    let subs = srt::parse(&content)
        .map_err(|e| ApiError::Internal(format!("failed to parse subtitle file: {e}")))?;

    Ok(Json(
        subs.into_iter()
            .map(|sub| SentenceDto {
                id: sub.index,
                text: sub.text,
                start_time: sub.start_seconds,
                end_time: sub.end_seconds,
            })
            .collect(),
    ))
}

// ============================================================================
// Tests
// ============================================================================
