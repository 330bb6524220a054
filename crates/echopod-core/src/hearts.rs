//! Heart ledger rules engine.
//!
//! This module defines the per-user hearts (lives) state machine: daily
//! reset, hourly passive regeneration, loss events with newbie and practice
//! shielding, and streak-based rewards.
//!
//! All transitions are pure: [`apply`] (and the per-event methods it
//! dispatches to) take the current state plus the event and clock inputs and
//! return a new state alongside a typed outcome. Persistence is the caller's
//! concern — a handler loads the state, applies exactly one transition, and
//! commits the result in a single write.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Regeneration ceiling for a freshly created account.
pub const DEFAULT_MAX_HEARTS: u32 = 5;

/// Number of shielded errors granted to a new account.
pub const NEWBIE_PROTECTION_BUDGET: u32 = 3;

/// Hours between passive single-heart recoveries.
pub const RECOVERY_INTERVAL_HOURS: i64 = 1;

/// Streak length that earns a bonus heart on each multiple.
pub const STREAK_REWARD_EVERY: u32 = 10;

/// Bonus hearts granted for finishing a course without mistakes.
pub const PERFECT_COURSE_BONUS: u32 = 2;

// ============================================================================
// HeartState
// ============================================================================

/// Per-user heart counters and bookkeeping timestamps.
///
/// Invariants upheld by the transitions below:
/// - `hearts <= max_hearts`
/// - once `is_newbie` turns false it never turns true again
/// - `hearts + bonus_hearts` (see [`HeartState::total_hearts`]) is the value
///   that gates whether the user may continue practicing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartState {
    /// Current regenerable lives, in `[0, max_hearts]`.
    pub hearts: u32,

    /// Overflow lives earned beyond the cap, consumed before `hearts`.
    pub bonus_hearts: u32,

    /// Regeneration ceiling.
    pub max_hearts: u32,

    /// Last time `hearts` changed due to regeneration or loss.
    pub last_heart_update: DateTime<Utc>,

    /// Date of the last full reset to `max_hearts`.
    pub last_daily_reset: NaiveDate,

    /// Whether the account is still inside its error-forgiveness window.
    pub is_newbie: bool,

    /// Shielded errors remaining while `is_newbie` is true.
    pub newbie_protection_count: u32,

    /// Count of uninterrupted correct answers.
    pub consecutive_correct: u32,
}

impl HeartState {
    /// Creates the state for a freshly registered account.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_max_hearts(DEFAULT_MAX_HEARTS, now)
    }

    /// Creates a fresh state with a custom regeneration ceiling.
    #[must_use]
    pub fn with_max_hearts(max_hearts: u32, now: DateTime<Utc>) -> Self {
        Self {
            hearts: max_hearts,
            bonus_hearts: 0,
            max_hearts,
            last_heart_update: now,
            last_daily_reset: now.date_naive(),
            is_newbie: true,
            newbie_protection_count: NEWBIE_PROTECTION_BUDGET,
            consecutive_correct: 0,
        }
    }

    /// Total spendable hearts: regular plus bonus.
    #[must_use]
    pub const fn total_hearts(&self) -> u32 {
        self.hearts + self.bonus_hearts
    }

    /// When the next passive recovery lands, or `None` at the cap.
    #[must_use]
    pub fn next_recovery_time(&self) -> Option<DateTime<Utc>> {
        (self.hearts < self.max_hearts)
            .then(|| self.last_heart_update + Duration::hours(RECOVERY_INTERVAL_HOURS))
    }

    /// Applies the daily reset / passive regeneration rules.
    ///
    /// The daily reset takes priority: on the first query of a new day the
    /// hearts snap back to the cap and no incremental regeneration is
    /// computed on top. Otherwise one heart is recovered per whole elapsed
    /// hour since the last update, capped at `max_hearts`. Calling this
    /// twice within the same second is a no-op the second time.
    #[must_use]
    pub fn refresh(&self, now: DateTime<Utc>, today: NaiveDate) -> (Self, RefreshOutcome) {
        let mut next = self.clone();

        if next.last_daily_reset < today {
            let recovered = next.max_hearts.saturating_sub(next.hearts);
            next.hearts = next.max_hearts;
            next.last_daily_reset = today;
            next.last_heart_update = now;
            return (
                next,
                RefreshOutcome {
                    daily_reset: true,
                    recovered,
                },
            );
        }

        let elapsed_hours = (now - next.last_heart_update).num_hours();
        if elapsed_hours >= RECOVERY_INTERVAL_HOURS && next.hearts < next.max_hearts {
            let room = next.max_hearts - next.hearts;
            let recovered = room.min(u32::try_from(elapsed_hours).unwrap_or(u32::MAX));
            next.hearts += recovered;
            next.last_heart_update = now;
            return (
                next,
                RefreshOutcome {
                    daily_reset: false,
                    recovered,
                },
            );
        }

        (
            next,
            RefreshOutcome {
                daily_reset: false,
                recovered: 0,
            },
        )
    }

    /// Applies a loss event.
    ///
    /// Shields are checked in order: newbie protection first, then practice
    /// mode. An unshielded loss deducts exactly one heart, bonus hearts
    /// first. A loss with zero total hearts is rejected and the input state
    /// is returned untouched — including the streak, which is only reset on
    /// paths that actually record the event.
    #[must_use]
    pub fn consume(
        &self,
        action: LossAction,
        practice_mode: bool,
        now: DateTime<Utc>,
    ) -> (Self, LossDisposition) {
        let mut next = self.clone();

        // Viewing the original text is not a wrong answer; it keeps the streak.
        if action != LossAction::ViewOriginal {
            next.consecutive_correct = 0;
        }

        if next.is_newbie && next.newbie_protection_count > 0 {
            next.newbie_protection_count -= 1;
            if next.newbie_protection_count == 0 {
                next.is_newbie = false;
            }
            let remaining = next.newbie_protection_count;
            return (next, LossDisposition::NewbieShielded { remaining });
        }

        if practice_mode {
            return (next, LossDisposition::PracticeShielded);
        }

        if next.total_hearts() == 0 {
            return (self.clone(), LossDisposition::Rejected);
        }

        if next.bonus_hearts > 0 {
            next.bonus_hearts -= 1;
        } else {
            next.hearts -= 1;
        }
        next.last_heart_update = now;

        (next, LossDisposition::Deducted)
    }

    /// Applies a reward event.
    ///
    /// A correct answer advances the streak and pays out one heart on every
    /// multiple of [`STREAK_REWARD_EVERY`], filling `hearts` up to the cap
    /// before spilling into `bonus_hearts`. A perfect course pays
    /// [`PERFECT_COURSE_BONUS`] straight into `bonus_hearts`. Rewards never
    /// touch `last_heart_update`, so the regeneration timer is unaffected.
    #[must_use]
    pub fn reward(&self, kind: RewardKind) -> (Self, RewardOutcome) {
        let mut next = self.clone();

        let granted = match kind {
            RewardKind::CorrectAnswer => {
                next.consecutive_correct += 1;
                if next.consecutive_correct % STREAK_REWARD_EVERY == 0 {
                    if next.hearts < next.max_hearts {
                        next.hearts += 1;
                    } else {
                        next.bonus_hearts += 1;
                    }
                    1
                } else {
                    0
                }
            }
            RewardKind::PerfectCourse => {
                next.bonus_hearts += PERFECT_COURSE_BONUS;
                PERFECT_COURSE_BONUS
            }
        };

        (next, RewardOutcome { granted })
    }

    /// Explicitly increments or resets the streak counter.
    ///
    /// Used by flows that track answer correctness outside this ledger.
    #[must_use]
    pub fn adjust_streak(&self, increment: bool) -> Self {
        let mut next = self.clone();
        if increment {
            next.consecutive_correct += 1;
        } else {
            next.consecutive_correct = 0;
        }
        next
    }
}

// ============================================================================
// Events and outcomes
// ============================================================================

/// The action that triggered a loss event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossAction {
    /// The learner answered a sentence incorrectly.
    WrongAnswer,
    /// The learner revealed the original text.
    ViewOriginal,
}

impl LossAction {
    /// Parses the wire value, e.g. `"wrong_answer"`.
    #[must_use]
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "wrong_answer" => Some(Self::WrongAnswer),
            "view_original" => Some(Self::ViewOriginal),
            _ => None,
        }
    }
}

/// The kind of reward being granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    /// A correct answer, advancing the streak.
    CorrectAnswer,
    /// A course finished without any mistakes.
    PerfectCourse,
}

impl RewardKind {
    /// Parses the wire value, e.g. `"perfect_course"`.
    #[must_use]
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "correct_answer" => Some(Self::CorrectAnswer),
            "perfect_course" => Some(Self::PerfectCourse),
            _ => None,
        }
    }
}

/// Course difficulty rating.
///
/// Carried on loss events for interface compatibility; deduction is a flat
/// single heart regardless of the declared difficulty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Difficulty {
    /// Beginner material.
    Easy,
    /// Everyday material (default).
    #[default]
    Normal,
    /// Advanced material.
    Hard,
}

impl Difficulty {
    /// Parses a string into a `Difficulty`, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "easy" => Some(Self::Easy),
            "normal" => Some(Self::Normal),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }

    /// The wire representation, e.g. `"normal"`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Normal => "normal",
            Self::Hard => "hard",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid difficulty '{s}': expected one of 'easy', 'normal', 'hard'"
            ))
        })
    }
}

impl Serialize for Difficulty {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// A single event against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartEvent {
    /// Daily-reset check plus passive regeneration.
    Refresh,
    /// A loss event (wrong answer or text reveal).
    Loss {
        /// What the learner did.
        action: LossAction,
        /// Practice mode shields the deduction.
        practice_mode: bool,
        /// Declared difficulty; accepted but not consulted.
        difficulty: Difficulty,
    },
    /// A reward event.
    Reward {
        /// What is being rewarded.
        kind: RewardKind,
    },
    /// External streak bookkeeping.
    StreakAdjust {
        /// `true` to increment, `false` to reset to zero.
        increment: bool,
    },
}

/// Result of a [`HeartState::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Whether a full daily reset was performed.
    pub daily_reset: bool,
    /// Hearts restored by this refresh.
    pub recovered: u32,
}

impl RefreshOutcome {
    /// Whether the refresh changed the state at all.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.daily_reset || self.recovered > 0
    }
}

/// How a loss event was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossDisposition {
    /// Absorbed by the newbie shield; no deduction.
    NewbieShielded {
        /// Shielded errors left after this one.
        remaining: u32,
    },
    /// Practice mode; no deduction.
    PracticeShielded,
    /// One heart was deducted.
    Deducted,
    /// No hearts left; nothing changed.
    Rejected,
}

impl LossDisposition {
    /// Hearts actually lost for this disposition (0 or 1).
    #[must_use]
    pub const fn hearts_lost(&self) -> u32 {
        match self {
            Self::Deducted => 1,
            _ => 0,
        }
    }

    /// Whether the event was accepted (everything except [`Self::Rejected`]).
    #[must_use]
    pub const fn accepted(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// Result of a [`HeartState::reward`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardOutcome {
    /// Hearts granted by this event.
    pub granted: u32,
}

/// Outcome of [`apply`], tagged by event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Refresh result.
    Refreshed(RefreshOutcome),
    /// Loss result.
    Loss(LossDisposition),
    /// Reward result.
    Rewarded(RewardOutcome),
    /// Streak adjustment applied.
    StreakAdjusted,
}

/// Applies one event to a heart state, returning the successor state and
/// the outcome. Never mutates its input.
#[must_use]
pub fn apply(
    state: &HeartState,
    event: HeartEvent,
    now: DateTime<Utc>,
    today: NaiveDate,
) -> (HeartState, Outcome) {
    match event {
        HeartEvent::Refresh => {
            let (next, outcome) = state.refresh(now, today);
            (next, Outcome::Refreshed(outcome))
        }
        HeartEvent::Loss {
            action,
            practice_mode,
            difficulty: _,
        } => {
            let (next, outcome) = state.consume(action, practice_mode, now);
            (next, Outcome::Loss(outcome))
        }
        HeartEvent::Reward { kind } => {
            let (next, outcome) = state.reward(kind);
            (next, Outcome::Rewarded(outcome))
        }
        HeartEvent::StreakAdjust { increment } => {
            (state.adjust_streak(increment), Outcome::StreakAdjusted)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
