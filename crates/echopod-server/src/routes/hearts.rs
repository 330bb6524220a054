//! Heart ledger handlers.
//!
//! Each handler is one atomic read-modify-write: load the user's ledger,
//! apply exactly one pure transition from `echopod-core`, and persist the
//! successor state with a single [`echopod_store::Store::update_hearts`]
//! call while holding the store lock. Concurrent requests from the same
//! user are last-write-wins by design.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use echopod_core::hearts::{HeartState, LossAction, LossDisposition, RewardKind};

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

// ============================================================================
// Query / passive regeneration
// ============================================================================

/// Ledger snapshot returned by `GET /api/user/hearts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartsSnapshot {
    /// Current regenerable hearts.
    pub current_hearts: u32,
    /// Regeneration ceiling.
    pub max_hearts: u32,
    /// Overflow hearts beyond the ceiling.
    pub bonus_hearts: u32,
    /// `current_hearts + bonus_hearts`; gates continued practice.
    pub total_hearts: u32,
    /// Last regeneration or loss.
    pub last_heart_update: DateTime<Utc>,
    /// When the next heart lands; `null` at the cap.
    pub next_recovery_time: Option<DateTime<Utc>>,
    /// Whether the account is still newbie-shielded.
    pub is_newbie: bool,
    /// Shielded errors remaining.
    pub newbie_protection_count: u32,
    /// Current correct-answer streak.
    pub consecutive_correct: u32,
}

impl From<&HeartState> for HeartsSnapshot {
    fn from(state: &HeartState) -> Self {
        Self {
            current_hearts: state.hearts,
            max_hearts: state.max_hearts,
            bonus_hearts: state.bonus_hearts,
            total_hearts: state.total_hearts(),
            last_heart_update: state.last_heart_update,
            next_recovery_time: state.next_recovery_time(),
            is_newbie: state.is_newbie,
            newbie_protection_count: state.newbie_protection_count,
            consecutive_correct: state.consecutive_correct,
        }
    }
}

/// Handler for `GET /api/user/hearts`.
///
/// Runs the refresh transition (daily reset, then hourly regeneration) and
/// persists the result when anything changed.
pub async fn get_hearts(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<HeartsSnapshot>, ApiError> {
    let now = Utc::now();
    let (refreshed, outcome) = user.hearts.refresh(now, now.date_naive());

    if outcome.changed() {
        let store = state.store.lock().await;
        store.update_hearts(user.id, &refreshed)?;
        drop(store);
        info!(
            user_id = user.id,
            daily_reset = outcome.daily_reset,
            recovered = outcome.recovered,
            "Hearts refreshed"
        );
    }

    Ok(Json(HeartsSnapshot::from(&refreshed)))
}

// ============================================================================
// Consume (loss event)
// ============================================================================

/// Request body for `POST /api/user/hearts/lose`.
///
/// `difficulty` is accepted for interface compatibility but does not scale
/// the deduction, which is a flat single heart.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoseHeartRequest {
    /// `wrong_answer` (default) or `view_original`.
    #[serde(default)]
    pub action_type: Option<String>,
    /// Practice mode shields the deduction.
    #[serde(default)]
    pub is_practice_mode: bool,
    /// Declared difficulty; validated, then ignored.
    #[serde(default)]
    pub difficulty: Option<String>,
}

/// Response body for `POST /api/user/hearts/lose`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoseHeartResponse {
    /// Always `true`; rejections use the error shape instead.
    pub success: bool,
    /// Hearts actually lost (0 or 1).
    pub hearts_lost: u32,
    /// Total hearts remaining after the event.
    pub remaining_hearts: u32,
    /// Present on shielded outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Shield budget left; present on the newbie-shielded outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newbie_protection_remaining: Option<u32>,
    /// Regular hearts after a deduction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_hearts: Option<u32>,
    /// Bonus hearts after a deduction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonus_hearts: Option<u32>,
}

/// Handler for `POST /api/user/hearts/lose`.
pub async fn lose_heart(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<LoseHeartRequest>,
) -> Result<Json<LoseHeartResponse>, ApiError> {
    let action = match request.action_type.as_deref() {
        None => LossAction::WrongAnswer,
        Some(raw) => LossAction::from_wire(raw).ok_or_else(|| {
            ApiError::MalformedRequest(format!("Unknown action_type '{raw}'"))
        })?,
    };
    if let Some(raw) = request.difficulty.as_deref() {
        echopod_core::hearts::Difficulty::from_str_case_insensitive(raw).ok_or_else(|| {
            ApiError::MalformedRequest(format!("Unknown difficulty '{raw}'"))
        })?;
    }

    let now = Utc::now();
    let (next, disposition) = user.hearts.consume(action, request.is_practice_mode, now);

    if disposition == LossDisposition::Rejected {
        return Err(ApiError::InsufficientHearts);
    }

    let store = state.store.lock().await;
    store.update_hearts(user.id, &next)?;
    drop(store);

    info!(
        user_id = user.id,
        ?action,
        practice_mode = request.is_practice_mode,
        ?disposition,
        "Loss event settled"
    );

    let response = match disposition {
        LossDisposition::NewbieShielded { remaining } => LoseHeartResponse {
            success: true,
            hearts_lost: 0,
            remaining_hearts: next.total_hearts(),
            message: Some("Newbie protection active; no hearts deducted".to_string()),
            newbie_protection_remaining: Some(remaining),
            current_hearts: None,
            bonus_hearts: None,
        },
        LossDisposition::PracticeShielded => LoseHeartResponse {
            success: true,
            hearts_lost: 0,
            remaining_hearts: next.total_hearts(),
            message: Some("Practice mode; no hearts deducted".to_string()),
            newbie_protection_remaining: None,
            current_hearts: None,
            bonus_hearts: None,
        },
        LossDisposition::Deducted => LoseHeartResponse {
            success: true,
            hearts_lost: 1,
            remaining_hearts: next.total_hearts(),
            message: None,
            newbie_protection_remaining: None,
            current_hearts: Some(next.hearts),
            bonus_hearts: Some(next.bonus_hearts),
        },
        // Handled above; kept for exhaustiveness.
        LossDisposition::Rejected => return Err(ApiError::InsufficientHearts),
    };

    Ok(Json(response))
}

// ============================================================================
// Reward
// ============================================================================

/// Request body for `POST /api/user/hearts/reward`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RewardRequest {
    /// `correct_answer` (default) or `perfect_course`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// Response body for `POST /api/user/hearts/reward`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardResponse {
    /// Always `true`.
    pub success: bool,
    /// Hearts granted by this event.
    pub hearts_rewarded: u32,
    /// Streak after the event.
    pub consecutive_correct: u32,
    /// Total hearts after the event.
    pub remaining_hearts: u32,
    /// Regular hearts after the event.
    pub current_hearts: u32,
    /// Bonus hearts after the event.
    pub bonus_hearts: u32,
    /// Payout description; empty when nothing was granted.
    pub message: String,
}

/// Handler for `POST /api/user/hearts/reward`.
pub async fn reward_hearts(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<RewardRequest>,
) -> Result<Json<RewardResponse>, ApiError> {
    let kind = match request.kind.as_deref() {
        None => RewardKind::CorrectAnswer,
        Some(raw) => RewardKind::from_wire(raw)
            .ok_or_else(|| ApiError::MalformedRequest("Invalid reward type".to_string()))?,
    };

    let (next, outcome) = user.hearts.reward(kind);

    let store = state.store.lock().await;
    store.update_hearts(user.id, &next)?;
    drop(store);

    info!(
        user_id = user.id,
        ?kind,
        granted = outcome.granted,
        streak = next.consecutive_correct,
        "Reward event settled"
    );

    let message = match kind {
        RewardKind::CorrectAnswer if outcome.granted > 0 => {
            if next.bonus_hearts > user.hearts.bonus_hearts {
                format!(
                    "{} correct in a row! Rewarded 1 bonus heart",
                    next.consecutive_correct
                )
            } else {
                format!(
                    "{} correct in a row! Rewarded 1 heart",
                    next.consecutive_correct
                )
            }
        }
        RewardKind::CorrectAnswer => String::new(),
        RewardKind::PerfectCourse => {
            format!("Perfect course! Rewarded {} bonus hearts", outcome.granted)
        }
    };

    Ok(Json(RewardResponse {
        success: true,
        hearts_rewarded: outcome.granted,
        consecutive_correct: next.consecutive_correct,
        remaining_hearts: next.total_hearts(),
        current_hearts: next.hearts,
        bonus_hearts: next.bonus_hearts,
        message,
    }))
}

// ============================================================================
// Streak adjustment
// ============================================================================

/// Request body for `POST /api/hearts/consecutive`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsecutiveRequest {
    /// `true` to increment the streak, `false` to reset it.
    #[serde(default = "default_increment")]
    pub increment: bool,
}

const fn default_increment() -> bool {
    true
}

/// Response body for `POST /api/hearts/consecutive`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsecutiveResponse {
    /// Always `true`.
    pub success: bool,
    /// Streak after the adjustment.
    pub consecutive_correct: u32,
}

/// Handler for `POST /api/hearts/consecutive`.
///
/// External streak bookkeeping for flows that score answers outside the
/// ledger.
pub async fn adjust_consecutive(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<ConsecutiveRequest>,
) -> Result<Json<ConsecutiveResponse>, ApiError> {
    let next = user.hearts.adjust_streak(request.increment);

    let store = state.store.lock().await;
    store.update_hearts(user.id, &next)?;
    drop(store);

    Ok(Json(ConsecutiveResponse {
        success: true,
        consecutive_correct: next.consecutive_correct,
    }))
}

// ============================================================================
// Tests
// ============================================================================
