//! Formatting helpers shared by the CLI views.

use chrono::{DateTime, TimeZone};

/// Countdown display, e.g. `25:00`. Minutes are not wrapped into hours.
pub fn format_time(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Human duration, e.g. `1h 5m` or `45m`.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;

    if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins}m")
    }
}

/// `May 15, 2024`
pub fn format_date<Tz: TimeZone>(ts: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    ts.format("%b %-d, %Y").to_string()
}

/// `May 13 - May 19, 2024`
pub fn format_date_range<Tz: TimeZone>(start: &DateTime<Tz>, end: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{} - {}", start.format("%b %-d"), format_date(end))
}

/// Clock time of day, e.g. `14:05`.
pub fn format_clock<Tz: TimeZone>(ts: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    ts.format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(1500), "25:00");
        assert_eq!(format_time(59), "00:59");
        assert_eq!(format_time(3725), "62:05");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0m");
        assert_eq!(format_duration(2700), "45m");
        assert_eq!(format_duration(3900), "1h 5m");
    }

    #[test]
    fn test_format_dates() {
        let start = Utc.with_ymd_and_hms(2024, 5, 13, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 19, 23, 59, 59).unwrap();
        assert_eq!(format_date(&start), "May 13, 2024");
        assert_eq!(format_date_range(&start, &end), "May 13 - May 19, 2024");
        assert_eq!(format_clock(&end), "23:59");
    }
}
