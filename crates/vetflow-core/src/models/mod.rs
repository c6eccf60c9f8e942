//! Domain models for the vetflow system.

mod action;
mod appointment;
mod directory;
mod lab_test;
mod message;

pub use action::*;
pub use appointment::*;
pub use directory::*;
pub use lab_test::*;
pub use message::*;

use chrono::{DateTime, SubsecRound, Utc};

/// Current instant at storage precision (microseconds).
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
