//! Weekly fragmentation reports
//!
//! Reports cover calendar weeks (Monday to Sunday) in the timezone of `now`.
//! Week 0 is the week containing `now`, week 1 the one before, and so on.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::time::{calculate_context_switches, calculate_meeting_hours, week_window};
use crate::types::{FocusSession, MeetingBlock};

/// Metrics for one week.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyReport {
    pub week_offset: u32,
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
    pub total_focus_minutes: u64,
    pub completed_sessions: usize,
    pub interrupted_sessions: usize,
    pub meeting_hours: f64,
    pub context_switch_index: f64,
    /// Number of sessions in the week. Not an actual count of notes.
    pub ship_notes_count: usize,
}

impl WeeklyReport {
    /// Focus hours as a percentage of meeting hours; 100 without meetings.
    pub fn deep_work_ratio_percent(&self) -> u64 {
        if self.meeting_hours > 0.0 {
            let focus_hours = self.total_focus_minutes as f64 / 60.0;
            (focus_hours / self.meeting_hours * 100.0).round() as u64
        } else {
            100
        }
    }

    /// Focus minutes per working day (five per week).
    pub fn avg_focus_minutes_per_day(&self) -> u64 {
        (self.total_focus_minutes as f64 / 5.0).round() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.ship_notes_count == 0 && self.meeting_hours == 0.0
    }
}

/// Build `week_count` reports, newest week first.
pub fn build_weekly_reports<Tz: TimeZone>(
    sessions: &[FocusSession],
    meeting_blocks: &[MeetingBlock],
    now: &DateTime<Tz>,
    week_count: u32,
) -> Vec<WeeklyReport> {
    (0..week_count)
        .map(|week_offset| build_week(sessions, meeting_blocks, now, week_offset))
        .collect()
}

fn build_week<Tz: TimeZone>(
    sessions: &[FocusSession],
    meeting_blocks: &[MeetingBlock],
    now: &DateTime<Tz>,
    week_offset: u32,
) -> WeeklyReport {
    let (start, end) = week_window(now, week_offset);
    let (start, end) = (start.with_timezone(&Utc), end.with_timezone(&Utc));
    let in_week = |ts: &DateTime<Utc>| *ts >= start && *ts <= end;

    let week_sessions: Vec<&FocusSession> =
        sessions.iter().filter(|s| in_week(&s.started_at)).collect();
    let week_meetings: Vec<&MeetingBlock> = meeting_blocks
        .iter()
        .filter(|b| in_week(&b.start_at))
        .collect();

    WeeklyReport {
        week_offset,
        week_start: start,
        week_end: end,
        total_focus_minutes: week_sessions.iter().map(|s| s.duration_sec / 60).sum(),
        completed_sessions: week_sessions.iter().filter(|s| s.is_completed()).count(),
        interrupted_sessions: week_sessions.iter().filter(|s| s.interrupted).count(),
        meeting_hours: calculate_meeting_hours(week_meetings.iter().copied()),
        context_switch_index: calculate_context_switches(
            week_sessions.iter().copied(),
            week_meetings.iter().copied(),
            &now.timezone(),
        ),
        ship_notes_count: week_sessions.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SyncState;
    use chrono::Duration;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn session(start: &str, duration_sec: u64, ended: bool, interrupted: bool) -> FocusSession {
        FocusSession {
            id: format!("s-{start}"),
            sync: SyncState::Local,
            started_at: ts(start),
            ended_at: ended.then(|| ts(start) + Duration::seconds(duration_sec as i64)),
            duration_sec,
            task_title: "Task".to_string(),
            artifact_url: None,
            interrupted,
            created_at: ts(start),
        }
    }

    fn meeting(start: &str, minutes: i64) -> MeetingBlock {
        MeetingBlock {
            id: format!("m-{start}"),
            sync: SyncState::Local,
            start_at: ts(start),
            end_at: ts(start) + Duration::minutes(minutes),
            title: None,
            created_at: ts(start),
        }
    }

    #[test]
    fn test_report_metrics() {
        let sessions = vec![
            session("2024-05-14T09:00:00Z", 1500, true, false),
            session("2024-05-14T10:00:00Z", 619, true, true),
            session("2024-05-14T13:00:00Z", 3000, false, false),
        ];
        let meetings = vec![meeting("2024-05-16T10:00:00Z", 90), meeting("2024-05-17T14:00:00Z", 120)];

        let now = ts("2024-05-18T12:00:00Z");
        let reports = build_weekly_reports(&sessions, &meetings, &now, 1);
        let week = &reports[0];

        assert_eq!(week.week_offset, 0);
        assert_eq!(week.week_start, ts("2024-05-13T00:00:00Z"));
        assert_eq!(week.week_end, ts("2024-05-19T23:59:59.999Z"));
        assert_eq!(week.total_focus_minutes, 25 + 10 + 50);
        assert_eq!(week.completed_sessions, 1);
        assert_eq!(week.interrupted_sessions, 1);
        assert_eq!(week.meeting_hours, 3.5);
        // 3 sessions on Tuesday, 1 meeting on each of Thursday and Friday
        assert_eq!(week.context_switch_index, 1.7);
        assert_eq!(week.ship_notes_count, 3);
    }

    #[test]
    fn test_reports_walk_back_week_by_week() {
        let sessions = vec![
            session("2024-05-15T14:00:00Z", 1500, true, false),
            session("2024-05-01T14:00:00Z", 1500, true, false),
        ];
        let now = ts("2024-05-15T16:00:00Z");
        let reports = build_weekly_reports(&sessions, &[], &now, 12);

        assert_eq!(reports.len(), 12);
        assert_eq!(reports[0].completed_sessions, 1);
        assert_eq!(reports[1].completed_sessions, 0);
        assert_eq!(reports[2].completed_sessions, 1);
        assert_eq!(reports[2].week_start, ts("2024-04-29T00:00:00Z"));
        assert!(reports[3..].iter().all(WeeklyReport::is_empty));
    }

    #[test]
    fn test_week_end_is_inclusive() {
        let sessions = vec![
            session("2024-05-19T23:59:59.999Z", 60, true, false),
            session("2024-05-20T00:00:00Z", 60, true, false),
        ];
        let now = ts("2024-05-15T12:00:00Z");
        let reports = build_weekly_reports(&sessions, &[], &now, 1);
        assert_eq!(reports[0].ship_notes_count, 1);
    }

    #[test]
    fn test_deep_work_ratio() {
        let sessions = vec![session("2024-05-14T09:00:00Z", 3 * 3600, true, false)];
        let meetings = vec![meeting("2024-05-14T14:00:00Z", 120)];
        let now = ts("2024-05-15T12:00:00Z");

        let report = &build_weekly_reports(&sessions, &meetings, &now, 1)[0];
        assert_eq!(report.deep_work_ratio_percent(), 150);
        assert_eq!(report.avg_focus_minutes_per_day(), 36);

        let no_meetings = &build_weekly_reports(&sessions, &[], &now, 1)[0];
        assert_eq!(no_meetings.deep_work_ratio_percent(), 100);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let now = ts("2024-05-15T12:00:00Z");
        let report = &build_weekly_reports(&[], &[], &now, 1)[0];
        let value = serde_json::to_value(report).unwrap();
        assert!(value.get("weekStart").is_some());
        assert!(value.get("totalFocusMinutes").is_some());
        assert!(value.get("contextSwitchIndex").is_some());
        assert!(value.get("shipNotesCount").is_some());
        assert_eq!(value["contextSwitchIndex"], serde_json::json!(0.0));
    }
}
