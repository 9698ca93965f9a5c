//! Daily wall-clock times and occurrence arithmetic.
//!
//! `LocalTime` is a recurring time of day (hour and minute). The custom
//! schedule needs concrete occurrences of such a time relative to a
//! reference instant: the latest occurrence at or before it, and the
//! earliest at or after it. Both are computed in the reference's own time
//! zone, so a reference built in a stale zone yields a stale-zone answer.
//! The caller owns zone freshness.
//!
//! The arithmetic steps the calendar date by exactly one day when the
//! same-day candidate lands on the wrong side of the reference, which makes
//! midnight, month, and year boundaries fall out naturally.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use chrono::offset::LocalResult;
use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A recurring daily wall-clock time. Always a valid hour/minute pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime {
    hour: u8,
    minute: u8,
}

impl LocalTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 || minute > 59 {
            bail!("invalid time of day: {hour:02}:{minute:02}");
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// The latest instant at or before `reference` whose wall-clock reading
    /// equals this time, in the reference's zone. Inclusive: a reference
    /// sitting exactly on this time is returned unchanged.
    pub fn occurrence_before<Z: TimeZone>(&self, reference: &DateTime<Z>) -> DateTime<Z> {
        let zone = reference.timezone();
        let candidate = self.on_date(&zone, reference.date_naive());
        if candidate > *reference {
            self.on_date(
                &zone,
                reference
                    .date_naive()
                    .checked_sub_days(Days::new(1))
                    .expect("date arithmetic within chrono range"),
            )
        } else {
            candidate
        }
    }

    /// The earliest instant at or after `reference` with this wall-clock
    /// reading, in the reference's zone. Inclusive at the boundary.
    pub fn occurrence_after<Z: TimeZone>(&self, reference: &DateTime<Z>) -> DateTime<Z> {
        let zone = reference.timezone();
        let candidate = self.on_date(&zone, reference.date_naive());
        if candidate < *reference {
            self.on_date(
                &zone,
                reference
                    .date_naive()
                    .checked_add_days(Days::new(1))
                    .expect("date arithmetic within chrono range"),
            )
        } else {
            candidate
        }
    }

    fn on_date<Z: TimeZone>(&self, zone: &Z, date: NaiveDate) -> DateTime<Z> {
        let naive = date
            .and_hms_opt(self.hour as u32, self.minute as u32, 0)
            .expect("hour/minute validated in constructor");
        resolve_local(zone, naive)
    }
}

/// Map a naive local reading to a concrete instant in `zone`.
///
/// Ambiguous readings (fall-back repeats) take the earlier instant. Readings
/// inside a spring-forward gap take the first valid instant after the gap.
pub(crate) fn resolve_local<Z: TimeZone>(zone: &Z, naive: NaiveDateTime) -> DateTime<Z> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(instant) => instant,
        LocalResult::Ambiguous(earlier, _) => earlier,
        LocalResult::None => {
            // DST gaps are at most a couple of hours; probe forward in
            // quarter-hour steps until the reading exists again.
            let mut probe = naive;
            loop {
                probe += Duration::minutes(15);
                if let LocalResult::Single(instant) | LocalResult::Ambiguous(instant, _) =
                    zone.from_local_datetime(&probe)
                {
                    return instant;
                }
            }
        }
    }
}

/// Re-express an instant in a new zone, keeping its calendar year,
/// day-of-year, hour, and minute. Used by the custom schedule's zone-change
/// hysteresis: the transition's local wall-clock reading is authoritative,
/// not its absolute instant.
pub(crate) fn carry_wall_clock<Z: TimeZone>(instant: &DateTime<Z>, zone: &Z) -> DateTime<Z> {
    let date = NaiveDate::from_yo_opt(instant.year(), instant.ordinal())
        .expect("ordinal taken from a valid date");
    let naive = date
        .and_hms_opt(instant.hour(), instant.minute(), 0)
        .expect("hour/minute taken from a valid time");
    resolve_local(zone, naive)
}

impl fmt::Display for LocalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for LocalTime {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (hour, minute) = match s.split_once(':') {
            Some(parts) => parts,
            None => bail!("expected HH:MM, got {s:?}"),
        };
        let hour: u8 = hour.parse().map_err(|_| {
            anyhow::anyhow!("expected HH:MM, got {s:?}")
        })?;
        let minute: u8 = minute.parse().map_err(|_| {
            anyhow::anyhow!("expected HH:MM, got {s:?}")
        })?;
        Self::new(hour, minute)
    }
}

impl Serialize for LocalTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for LocalTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
