//! HTTP handlers, grouped by resource.

pub mod accounts;
pub mod courses;
pub mod hearts;
pub mod progress;
pub mod users;
