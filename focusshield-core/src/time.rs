//! Week boundaries and per-week metrics
//!
//! Every function here works in the timezone carried by its arguments. The
//! CLI passes `chrono::Local`, so weeks and days follow the user's clock;
//! tests pass `Utc` or a fixed offset.

use std::collections::BTreeMap;

use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};

use crate::types::{FocusSession, MeetingBlock};

/// Map a wall-clock time to an instant in `tz`.
///
/// Ambiguous times (DST fall-back) take the earlier instant. Times inside a
/// DST gap move forward by an hour, which lands on the first valid instant
/// for the usual one-hour gap.
pub fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Monday 00:00:00.000 of the week containing `at`.
pub fn week_start<Tz: TimeZone>(at: &DateTime<Tz>) -> DateTime<Tz> {
    let monday = monday_of(at.date_naive());
    resolve_local(&at.timezone(), monday.and_time(NaiveTime::MIN))
}

/// Sunday 23:59:59.999 of the week containing `at`.
pub fn week_end<Tz: TimeZone>(at: &DateTime<Tz>) -> DateTime<Tz> {
    let sunday = monday_of(at.date_naive()) + Duration::days(6);
    let last_milli = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    resolve_local(&at.timezone(), sunday.and_time(last_milli))
}

/// Inclusive window of the week `week_offset` weeks before the one containing `now`.
pub fn week_window<Tz: TimeZone>(
    now: &DateTime<Tz>,
    week_offset: u32,
) -> (DateTime<Tz>, DateTime<Tz>) {
    let tz = now.timezone();
    let monday = monday_of(now.date_naive()) - Duration::days(7 * i64::from(week_offset));
    let sunday = monday + Duration::days(6);
    let last_milli = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    (
        resolve_local(&tz, monday.and_time(NaiveTime::MIN)),
        resolve_local(&tz, sunday.and_time(last_milli)),
    )
}

/// Whole seconds between two instants, never negative.
pub fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    u64::try_from((to - from).num_seconds()).unwrap_or(0)
}

/// Total length of the blocks in fractional hours.
///
/// Plain timestamp subtraction, so blocks crossing midnight count correctly.
pub fn calculate_meeting_hours<'a>(blocks: impl IntoIterator<Item = &'a MeetingBlock>) -> f64 {
    blocks.into_iter().map(MeetingBlock::hours).sum()
}

/// Average number of sessions and meetings per active day, to one decimal.
///
/// Days are calendar days in `tz`. Days without events are left out of the
/// average; no events at all gives 0.
pub fn calculate_context_switches<'a, Tz: TimeZone>(
    sessions: impl IntoIterator<Item = &'a FocusSession>,
    meetings: impl IntoIterator<Item = &'a MeetingBlock>,
    tz: &Tz,
) -> f64 {
    let mut per_day: BTreeMap<NaiveDate, u32> = BTreeMap::new();

    let starts = sessions
        .into_iter()
        .map(|s| s.started_at)
        .chain(meetings.into_iter().map(|m| m.start_at));
    for start in starts {
        *per_day
            .entry(start.with_timezone(tz).date_naive())
            .or_default() += 1;
    }

    if per_day.is_empty() {
        return 0.0;
    }

    let total: u32 = per_day.values().sum();
    let average = f64::from(total) / per_day.len() as f64;
    (average * 10.0).round() / 10.0
}

/// Parse a user-entered time: RFC 3339, or `YYYY-MM-DD HH:MM` in `tz`.
pub fn parse_datetime<Tz: TimeZone>(tz: &Tz, input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .map(|naive| resolve_local(tz, naive).with_timezone(&Utc))
}
