//! EchoPod domain rules.
//!
//! This crate holds the parts of EchoPod that are pure domain logic, kept
//! free of HTTP and storage concerns so they can be tested in isolation:
//!
//! - [`hearts`] - the heart (lives) ledger: daily reset, passive
//!   regeneration, loss shielding, and streak rewards, modeled as pure
//!   state transitions
//! - [`captcha`] - the expiring CAPTCHA challenge store
//! - [`srt`] - SubRip subtitle parsing into sentence-level exercises

pub mod captcha;
pub mod hearts;
pub mod srt;

pub use captcha::{CaptchaStore, CaptchaVerification, IssuedCaptcha};
pub use hearts::{
    apply, Difficulty, HeartEvent, HeartState, LossAction, LossDisposition, Outcome,
    RefreshOutcome, RewardKind, RewardOutcome, DEFAULT_MAX_HEARTS, NEWBIE_PROTECTION_BUDGET,
    PERFECT_COURSE_BONUS, RECOVERY_INTERVAL_HOURS, STREAK_REWARD_EVERY,
};
pub use srt::{SrtError, Subtitle};
