//! Schedule model types.

use std::str::FromStr;

use chrono::{DateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// World that is always protected when the configured set is empty.
pub const DEFAULT_PROTECTED_WORLD: &str = "default";

pub(crate) fn default_time_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(6, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// When a schedule fires, carrying only the fields its cadence needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Once a week on the given weekday.
    Weekly { day: Weekday },
    /// Every day.
    Daily,
    /// Once a month on the given day, clamped to the month's length.
    Monthly { day_of_month: u8 },
}

/// Time zone a schedule is evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleZone {
    /// The process-local time zone.
    System,
    /// A named IANA time zone.
    Named(Tz),
}

/// A resolved wipe schedule for one world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub cadence: Cadence,
    pub time_of_day: NaiveTime,
    pub zone: ScheduleZone,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            cadence: Cadence::Weekly { day: Weekday::Mon },
            time_of_day: default_time_of_day(),
            zone: ScheduleZone::System,
        }
    }
}

impl Schedule {
    /// Weekly schedule on the given day.
    pub fn weekly(day: Weekday, time_of_day: NaiveTime) -> Self {
        Self {
            cadence: Cadence::Weekly { day },
            time_of_day,
            zone: ScheduleZone::System,
        }
    }

    /// Daily schedule.
    pub fn daily(time_of_day: NaiveTime) -> Self {
        Self {
            cadence: Cadence::Daily,
            time_of_day,
            zone: ScheduleZone::System,
        }
    }

    /// Monthly schedule; the day is clamped into `1..=31` here and to the
    /// concrete month length when occurrences are computed.
    pub fn monthly(day_of_month: u8, time_of_day: NaiveTime) -> Self {
        Self {
            cadence: Cadence::Monthly {
                day_of_month: day_of_month.clamp(1, 31),
            },
            time_of_day,
            zone: ScheduleZone::System,
        }
    }

    pub fn with_zone(mut self, zone: ScheduleZone) -> Self {
        self.zone = zone;
        self
    }
}

/// Persisted, string-typed schedule fields as the external config layer
/// hands them in. Anything missing or unparsable resolves to a documented
/// default; resolution never fails.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawSchedule {
    pub mode: Option<String>,
    pub day: Option<String>,
    pub day_of_month: Option<i64>,
    pub time: Option<String>,
    pub zone: Option<String>,
}

impl RawSchedule {
    /// Resolve into a typed schedule, substituting defaults for invalid
    /// fields. Substitutions are logged, never fatal.
    pub fn resolve(&self, world: &str) -> Schedule {
        let mut day = Weekday::Mon;
        if let Some(raw) = self.day.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            match Weekday::from_str(raw) {
                Ok(parsed) => day = parsed,
                Err(_) => {
                    warn!(world, value = raw, "invalid schedule day, using Monday");
                }
            }
        }

        let mut day_of_month = 1u8;
        if let Some(raw) = self.day_of_month {
            if (1..=31).contains(&raw) {
                day_of_month = raw as u8;
            } else {
                warn!(world, value = raw, "invalid schedule dayOfMonth, using 1");
            }
        }

        let cadence = match self.mode.as_deref().map(str::trim) {
            None | Some("") => Cadence::Weekly { day },
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "weekly" => Cadence::Weekly { day },
                "daily" => Cadence::Daily,
                "monthly" => Cadence::Monthly { day_of_month },
                _ => {
                    warn!(world, value = raw, "invalid schedule mode, using weekly");
                    Cadence::Weekly { day }
                }
            },
        };

        let mut time_of_day = default_time_of_day();
        if let Some(raw) = self.time.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            match NaiveTime::parse_from_str(raw, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            {
                Ok(parsed) => time_of_day = parsed,
                Err(_) => {
                    warn!(world, value = raw, "invalid schedule time, using 06:00");
                }
            }
        }

        let mut zone = ScheduleZone::System;
        if let Some(raw) = self.zone.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            if !raw.eq_ignore_ascii_case("system") {
                match Tz::from_str(raw) {
                    Ok(tz) => zone = ScheduleZone::Named(tz),
                    Err(_) => {
                        warn!(world, value = raw, "invalid schedule zone, using system zone");
                    }
                }
            }
        }

        Schedule {
            cadence,
            time_of_day,
            zone,
        }
    }
}

/// Persisted per-world entry: schedule plus wipe bookkeeping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawWorldEntry {
    pub schedule: Option<RawSchedule>,
    pub regenerate_on_wipe: Option<bool>,
    pub last_wipe: Option<String>,
}

/// A scheduled world as held by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldEntry {
    /// Display name, original casing preserved.
    pub name: String,
    pub schedule: Schedule,
    /// Per-world regenerate override; `None` falls back to the global default.
    pub regenerate: Option<bool>,
    /// Instant of the last completed wipe, if any.
    pub last_wipe: Option<DateTime<Utc>>,
}

/// Lenient instant parsing: RFC 3339, falling back to epoch milliseconds.
pub(crate) fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    trimmed
        .parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
}
