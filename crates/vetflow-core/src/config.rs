//! Clinic scheduling policy and runtime settings.

use std::env;
use std::str::FromStr;

use chrono::{Duration, FixedOffset, Offset, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::models::AppointmentKind;

/// Clinic-wide settings consumed by the workflow engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClinicConfig {
    /// Default length of a NORMAL appointment
    pub normal_duration_minutes: i64,
    /// Default length of an EMERGENCY appointment
    pub emergency_duration_minutes: i64,
    /// Minimum distance between two start times of the same actor
    pub min_gap_minutes: i64,
    /// Clinic wall clock, used for "calendar day" and "clock hour"
    pub utc_offset_seconds: i32,
    /// How long a writer waits on a locked database
    pub busy_timeout_ms: u64,
    pub max_message_len: usize,
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            normal_duration_minutes: 60,
            emergency_duration_minutes: 120,
            min_gap_minutes: 60,
            utc_offset_seconds: 0,
            busy_timeout_ms: 5_000,
            max_message_len: 1_000,
        }
    }
}

impl ClinicConfig {
    /// Read `VETFLOW_*` environment variables, keeping defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            normal_duration_minutes: env_or(
                "VETFLOW_NORMAL_DURATION_MINUTES",
                defaults.normal_duration_minutes,
            ),
            emergency_duration_minutes: env_or(
                "VETFLOW_EMERGENCY_DURATION_MINUTES",
                defaults.emergency_duration_minutes,
            ),
            min_gap_minutes: env_or("VETFLOW_MIN_GAP_MINUTES", defaults.min_gap_minutes),
            utc_offset_seconds: env_or("VETFLOW_UTC_OFFSET_SECONDS", defaults.utc_offset_seconds),
            busy_timeout_ms: env_or("VETFLOW_BUSY_TIMEOUT_MS", defaults.busy_timeout_ms),
            max_message_len: env_or("VETFLOW_MAX_MESSAGE_LEN", defaults.max_message_len),
        }
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Duration used when a request omits its end time.
    ///
    /// Values outside one minute to one day fall back to the default.
    pub fn default_duration(&self, kind: AppointmentKind) -> Duration {
        let defaults = Self::default();
        match kind {
            AppointmentKind::Emergency => minutes_within(
                "emergency_duration_minutes",
                self.emergency_duration_minutes,
                defaults.emergency_duration_minutes,
                1,
            ),
            AppointmentKind::Normal => minutes_within(
                "normal_duration_minutes",
                self.normal_duration_minutes,
                defaults.normal_duration_minutes,
                1,
            ),
        }
    }

    /// Minimum start gap. Zero leaves only the same-hour rule; negative or
    /// longer than a day falls back to the default.
    pub fn min_gap(&self) -> Duration {
        minutes_within(
            "min_gap_minutes",
            self.min_gap_minutes,
            Self::default().min_gap_minutes,
            0,
        )
    }

    /// The clinic's fixed UTC offset. Out-of-range values fall back to UTC.
    pub fn clinic_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_seconds).unwrap_or_else(|| {
            warn!(
                "utc_offset_seconds {} out of range, using UTC",
                self.utc_offset_seconds
            );
            Utc.fix()
        })
    }
}

const MAX_POLICY_MINUTES: i64 = 24 * 60;

fn minutes_within(field: &str, value: i64, default: i64, min: i64) -> Duration {
    match Duration::try_minutes(value).filter(|_| (min..=MAX_POLICY_MINUTES).contains(&value)) {
        Some(duration) => duration,
        None => {
            warn!("{} {} out of range, using {}", field, value, default);
            Duration::minutes(default)
        }
    }
}

fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has unparsable value {:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
