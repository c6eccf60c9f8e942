//! Time conflict checking for vets and assistants.
//!
//! Two commitments of the same actor conflict when their starts fall in the
//! same clock hour of the same clinic day, or lie less than `min_gap` apart.
//! End times play no part in the check.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};

use crate::config::ClinicConfig;

/// Pure start-time conflict policy, evaluated on the clinic's wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictPolicy {
    min_gap: Duration,
    offset: FixedOffset,
}

impl ConflictPolicy {
    pub fn new(min_gap: Duration, offset: FixedOffset) -> Self {
        Self { min_gap, offset }
    }

    pub fn from_config(config: &ClinicConfig) -> Self {
        Self::new(config.min_gap(), config.clinic_offset())
    }

    /// Whether two start instants collide. Symmetric in its arguments.
    pub fn conflicts(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        let gap = if a >= b { a - b } else { b - a };
        if gap < self.min_gap {
            return true;
        }

        let (la, lb) = (a.with_timezone(&self.offset), b.with_timezone(&self.offset));
        la.date_naive() == lb.date_naive() && la.hour() == lb.hour()
    }

    /// The first existing start that collides with `proposed`, if any.
    pub fn first_conflict<I>(&self, existing: I, proposed: DateTime<Utc>) -> Option<DateTime<Utc>>
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        existing
            .into_iter()
            .find(|start| self.conflicts(*start, proposed))
    }

    pub fn is_available<I>(&self, existing: I, proposed: DateTime<Utc>) -> bool
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        self.first_conflict(existing, proposed).is_none()
    }

    /// The clinic calendar date of an instant.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// UTC bounds `[start, end)` of a clinic calendar day.
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let local_midnight = date.and_time(NaiveTime::MIN);
        let offset = Duration::seconds(i64::from(self.offset.local_minus_utc()));
        let start = Utc.from_utc_datetime(&(local_midnight - offset));
        (start, start + Duration::days(1))
    }

    /// UTC bounds of the clinic day containing `instant`.
    pub fn day_bounds_of(&self, instant: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        self.day_bounds(self.local_date(instant))
    }
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self::from_config(&ClinicConfig::default())
    }
}
