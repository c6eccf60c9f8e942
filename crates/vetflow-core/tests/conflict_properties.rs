//! Property tests for the start-time conflict policy.

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Timelike, Utc};
use proptest::prelude::*;
use vetflow_core::ConflictPolicy;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

fn minute_of_week() -> impl Strategy<Value = i64> {
    0i64..(7 * 24 * 60)
}

fn policy_strategy() -> impl Strategy<Value = ConflictPolicy> {
    (0i64..=120, -12i32..=14).prop_map(|(gap, hours)| {
        ConflictPolicy::new(
            Duration::minutes(gap),
            FixedOffset::east_opt(hours * 3600).unwrap(),
        )
    })
}

proptest! {
    #[test]
    fn conflict_is_symmetric(policy in policy_strategy(), a in minute_of_week(), b in minute_of_week()) {
        let (a, b) = (base() + Duration::minutes(a), base() + Duration::minutes(b));
        prop_assert_eq!(policy.conflicts(a, b), policy.conflicts(b, a));
    }

    #[test]
    fn start_always_conflicts_with_itself(policy in policy_strategy(), a in minute_of_week()) {
        let a = base() + Duration::minutes(a);
        prop_assert!(policy.conflicts(a, a));
    }

    #[test]
    fn hourly_gap_decides_under_default_policy(a in minute_of_week(), b in minute_of_week()) {
        let policy = ConflictPolicy::default();
        let (a, b) = (base() + Duration::minutes(a), base() + Duration::minutes(b));
        let gap = if a >= b { a - b } else { b - a };
        prop_assert_eq!(policy.conflicts(a, b), gap < Duration::hours(1));
    }

    #[test]
    fn same_clock_hour_conflicts_without_gap(hours in -12i32..=14, a in minute_of_week(), b in minute_of_week()) {
        let offset = FixedOffset::east_opt(hours * 3600).unwrap();
        let policy = ConflictPolicy::new(Duration::zero(), offset);
        let (a, b) = (base() + Duration::minutes(a), base() + Duration::minutes(b));

        let (la, lb) = (a.with_timezone(&offset), b.with_timezone(&offset));
        let same_hour = la.date_naive() == lb.date_naive() && la.hour() == lb.hour();
        prop_assert_eq!(policy.conflicts(a, b), a == b || same_hour);
    }

    #[test]
    fn day_bounds_contain_the_instant(policy in policy_strategy(), a in minute_of_week()) {
        let a = base() + Duration::minutes(a);
        let (from, until) = policy.day_bounds_of(a);
        prop_assert!(from <= a && a < until);
        prop_assert_eq!(until - from, Duration::days(1));
    }
}

#[test]
fn test_exactly_one_hour_apart_is_available() {
    let policy = ConflictPolicy::default();
    let nine = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
    let ten = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();

    assert!(!policy.conflicts(nine, ten));
    assert!(policy.is_available([nine], ten));
    assert_eq!(
        policy.first_conflict([nine, ten], ten - Duration::minutes(1)),
        Some(nine)
    );
}
