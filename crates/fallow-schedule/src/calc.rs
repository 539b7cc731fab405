//! Occurrence calculator.
//!
//! Pure calendar math: given an instant and a schedule, find the previous
//! and next occurrence in the schedule's zone. Both functions are total
//! and uphold `previous_occurrence(now) <= now < next_occurrence(now)`.

use chrono::{
    DateTime, Datelike, Duration, Local, LocalResult, Months, NaiveDate, NaiveTime, TimeZone,
    Timelike, Utc, Weekday,
};

use crate::{Cadence, Schedule, ScheduleZone};

/// The most recent occurrence at or before `now`.
pub fn previous_occurrence(now: DateTime<Utc>, schedule: &Schedule) -> DateTime<Utc> {
    match schedule.zone {
        ScheduleZone::System => {
            previous_in_zone(now.with_timezone(&Local), schedule).with_timezone(&Utc)
        }
        ScheduleZone::Named(tz) => {
            previous_in_zone(now.with_timezone(&tz), schedule).with_timezone(&Utc)
        }
    }
}

/// The first occurrence strictly after `now`.
pub fn next_occurrence(now: DateTime<Utc>, schedule: &Schedule) -> DateTime<Utc> {
    match schedule.zone {
        ScheduleZone::System => {
            next_in_zone(now.with_timezone(&Local), schedule).with_timezone(&Utc)
        }
        ScheduleZone::Named(tz) => next_in_zone(now.with_timezone(&tz), schedule).with_timezone(&Utc),
    }
}

fn next_in_zone<Z: TimeZone>(now: DateTime<Z>, schedule: &Schedule) -> DateTime<Z> {
    let zone = now.timezone();
    let today = now.date_naive();
    let time = truncated(schedule.time_of_day);

    match schedule.cadence {
        Cadence::Daily => {
            let candidate = at_time(&zone, today, time);
            if candidate <= now {
                at_time(&zone, today + Duration::days(1), time)
            } else {
                candidate
            }
        }
        Cadence::Weekly { day } => {
            let date = today + Duration::days(days_forward(today.weekday(), day));
            let candidate = at_time(&zone, date, time);
            if candidate <= now {
                at_time(&zone, date + Duration::days(7), time)
            } else {
                candidate
            }
        }
        Cadence::Monthly { day_of_month } => {
            let target = u32::from(day_of_month.clamp(1, 31));
            let candidate = at_time(&zone, clamp_to_month(today, target), time);
            if candidate <= now {
                let next_month = today.checked_add_months(Months::new(1)).unwrap_or(today);
                at_time(&zone, clamp_to_month(next_month, target), time)
            } else {
                candidate
            }
        }
    }
}

fn previous_in_zone<Z: TimeZone>(now: DateTime<Z>, schedule: &Schedule) -> DateTime<Z> {
    let zone = now.timezone();
    let today = now.date_naive();
    let time = truncated(schedule.time_of_day);

    match schedule.cadence {
        Cadence::Daily => {
            let candidate = at_time(&zone, today, time);
            if candidate > now {
                at_time(&zone, today - Duration::days(1), time)
            } else {
                candidate
            }
        }
        Cadence::Weekly { day } => {
            let date = today - Duration::days(days_back(today.weekday(), day));
            let candidate = at_time(&zone, date, time);
            if candidate > now {
                at_time(&zone, date - Duration::days(7), time)
            } else {
                candidate
            }
        }
        Cadence::Monthly { day_of_month } => {
            let target = u32::from(day_of_month.clamp(1, 31));
            let candidate = at_time(&zone, clamp_to_month(today, target), time);
            if candidate > now {
                let previous_month = today.checked_sub_months(Months::new(1)).unwrap_or(today);
                at_time(&zone, clamp_to_month(previous_month, target), time)
            } else {
                candidate
            }
        }
    }
}

/// Candidates fire on whole minutes.
fn truncated(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}

/// Days from `from` forward to the next `to` (0 when equal).
fn days_forward(from: Weekday, to: Weekday) -> i64 {
    i64::from((to.num_days_from_monday() + 7 - from.num_days_from_monday()) % 7)
}

/// Days from `from` back to the most recent `to` (0 when equal).
fn days_back(from: Weekday, to: Weekday) -> i64 {
    i64::from((from.num_days_from_monday() + 7 - to.num_days_from_monday()) % 7)
}

/// The requested day of month resolved against the month's actual length.
fn clamp_to_month(date: NaiveDate, target_day: u32) -> NaiveDate {
    let resolved = target_day.min(days_in_month(date));
    date.with_day(resolved).unwrap_or(date)
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = (date.year(), date.month());
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    first_of_next
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// Materialize a wall-clock time on a date in a zone.
///
/// Ambiguous local times (DST fall-back) take the earlier offset. Local
/// times inside a DST gap resolve to the first valid instant after the
/// nominal time.
fn at_time<Z: TimeZone>(zone: &Z, date: NaiveDate, time: NaiveTime) -> DateTime<Z> {
    let naive = date.and_time(time);
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(instant) => instant,
        LocalResult::Ambiguous(earlier, _) => earlier,
        LocalResult::None => {
            let mut shifted = naive;
            for _ in 0..6 {
                shifted = shifted + Duration::minutes(30);
                if let LocalResult::Single(instant) = zone.from_local_datetime(&shifted) {
                    return instant;
                }
            }
            zone.from_utc_datetime(&naive)
        }
    }
}
