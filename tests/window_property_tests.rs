use chrono::{Duration, TimeZone};
use chrono_tz::Tz;
use duskr::window::LocalTime;
use proptest::prelude::*;

/// Generate valid wall-clock times
fn local_time_strategy() -> impl Strategy<Value = LocalTime> {
    (0u8..24, 0u8..60).prop_map(|(hour, minute)| LocalTime::new(hour, minute).unwrap())
}

/// Generate reference instants across several years and zones, including
/// zones with DST transitions
fn instant_strategy() -> impl Strategy<Value = chrono::DateTime<Tz>> {
    let zones = prop_oneof![
        Just(Tz::UTC),
        Just(chrono_tz::America::New_York),
        Just(chrono_tz::Europe::Paris),
        Just(chrono_tz::Australia::Sydney),
        Just(chrono_tz::Asia::Kolkata),
    ];
    (zones, 0i64..(4 * 365 * 24 * 60)).prop_map(|(zone, minutes)| {
        let base = Tz::UTC.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        (base + Duration::minutes(minutes)).with_timezone(&zone)
    })
}

proptest! {
    /// The previous occurrence never lies in the future and is at most one
    /// day in the past.
    #[test]
    fn occurrence_before_stays_within_a_day(
        time in local_time_strategy(),
        reference in instant_strategy()
    ) {
        let before = time.occurrence_before(&reference);
        prop_assert!(before <= reference);
        prop_assert!(reference - before < Duration::days(1) + Duration::hours(2));
    }

    /// The next occurrence never lies in the past and is at most one day
    /// in the future.
    #[test]
    fn occurrence_after_stays_within_a_day(
        time in local_time_strategy(),
        reference in instant_strategy()
    ) {
        let after = time.occurrence_after(&reference);
        prop_assert!(after >= reference);
        prop_assert!(after - reference < Duration::days(1) + Duration::hours(2));
    }

    /// Both occurrence lookups are inclusive: applied to their own result
    /// they are fixed points.
    #[test]
    fn occurrences_are_idempotent_at_the_boundary(
        time in local_time_strategy(),
        reference in instant_strategy()
    ) {
        let before = time.occurrence_before(&reference);
        prop_assert_eq!(time.occurrence_before(&before), before);
        let after = time.occurrence_after(&reference);
        prop_assert_eq!(time.occurrence_after(&after), after);
    }

    /// A window anchored before `now` always ends after its start, and the
    /// containment decision matches the half-open interval.
    #[test]
    fn window_anchoring_is_ordered(
        start in local_time_strategy(),
        end in local_time_strategy(),
        now in instant_strategy()
    ) {
        let window_start = start.occurrence_before(&now);
        let window_end = end.occurrence_after(&window_start);
        prop_assert!(window_start <= now);
        prop_assert!(window_end >= window_start);
    }
}
