//! SQLite persistence for EchoPod.
//!
//! The storage contract is deliberately small: load-one-by-identity and
//! commit-field-update per record. The heart ledger in particular touches the
//! database through exactly two calls — load the user's row, then
//! [`Store::update_hearts`] with the successor state computed by
//! `echopod-core`. All SQL lives in this crate.

pub mod courses;
pub mod error;
pub mod progress;
pub mod seed;
pub mod store;
pub mod users;

pub use courses::{Course, NewCourse, NewSentence, Sentence};
pub use error::{Result, StoreError};
pub use progress::ProgressRecord;
pub use seed::{seed, SeedSummary, DEFAULT_ADMIN_USERNAME};
pub use store::Store;
pub use users::{NewUser, User, UserUpdate};
