//! Text and JSON views for the CLI.

use chrono::Local;
use focusshield_core::format::{format_clock, format_date, format_date_range, format_duration};
use focusshield_core::reconcile::HistoryView;
use focusshield_core::{MeetingBlock, Plan, WeeklyReport};
use serde::Serialize;
use serde_json::json;

pub fn duration(seconds: u64) -> String {
    format_duration(seconds)
}

pub fn history(view: &HistoryView) {
    if view.sessions.is_empty() {
        println!("No sessions yet.");
        return;
    }

    for entry in &view.sessions {
        let session = &entry.session;
        let started = session.started_at.with_timezone(&Local);
        let status = if session.is_running() {
            "running"
        } else if session.interrupted {
            "stopped"
        } else {
            "done"
        };
        println!(
            "{} {}  {:>7}  {:<7}  {}",
            format_date(&started),
            format_clock(&started),
            format_duration(session.duration_sec),
            status,
            session.task_title
        );
        if let Some(url) = &session.artifact_url {
            println!("    artifact: {url}");
        }
        if let Some(note) = &entry.ship_note {
            println!("    shipped:  {}", note.note);
            if let Some(reason) = &note.blocked_reason {
                println!("    blocked:  {reason}");
            }
        }
    }

    if view.has_unsynced {
        println!();
        println!("Some records are only on this device.");
    }
}

pub fn history_json(view: &HistoryView) -> serde_json::Value {
    let sessions: Vec<_> = view
        .sessions
        .iter()
        .map(|entry| json!({ "session": entry.session, "shipNote": entry.ship_note }))
        .collect();
    json!({ "sessions": sessions, "hasUnsynced": view.has_unsynced })
}

pub fn meetings(blocks: &[MeetingBlock]) {
    if blocks.is_empty() {
        println!("No meeting blocks.");
        return;
    }

    let mut blocks: Vec<&MeetingBlock> = blocks.iter().collect();
    blocks.sort_by(|a, b| b.start_at.cmp(&a.start_at));
    for block in blocks {
        let start = block.start_at.with_timezone(&Local);
        let end = block.end_at.with_timezone(&Local);
        println!(
            "{} {}-{}  {:>5.1}h  {}  {}",
            format_date(&start),
            format_clock(&start),
            format_clock(&end),
            block.hours(),
            block.title.as_deref().unwrap_or("Meeting"),
            block.id
        );
    }
}

/// A report, or a placeholder for a week behind the paywall.
#[derive(Serialize)]
#[serde(untagged)]
pub enum ReportEntry<'a> {
    Unlocked(&'a WeeklyReport),
    #[serde(rename_all = "camelCase")]
    Locked { week_offset: u32, locked: bool },
}

impl ReportEntry<'_> {
    pub fn locked(week_offset: u32) -> Self {
        ReportEntry::Locked {
            week_offset,
            locked: true,
        }
    }
}

pub fn reports(entries: &[ReportEntry<'_>], plan: Plan) {
    let mut locked = 0;
    for entry in entries {
        match entry {
            ReportEntry::Unlocked(report) => report_block(report),
            ReportEntry::Locked { .. } => locked += 1,
        }
    }

    if locked > 0 {
        println!(
            "{locked} older week(s) locked on the {plan} plan. Upgrade to Pro to see your full history."
        );
    }
}

fn report_block(report: &WeeklyReport) {
    let start = report.week_start.with_timezone(&Local);
    let end = report.week_end.with_timezone(&Local);
    let label = match report.week_offset {
        0 => "This week".to_string(),
        1 => "Last week".to_string(),
        n => format!("{n} weeks ago"),
    };

    println!("{label}: {}", format_date_range(&start, &end));
    if report.is_empty() {
        println!("  No sessions or meetings.");
        println!();
        return;
    }

    println!(
        "  Focus:            {} ({} min/day)",
        format_duration(report.total_focus_minutes * 60),
        report.avg_focus_minutes_per_day()
    );
    println!(
        "  Sessions:         {} completed, {} interrupted",
        report.completed_sessions, report.interrupted_sessions
    );
    println!("  Meetings:         {:.1}h", report.meeting_hours);
    println!("  Deep work ratio:  {}%", report.deep_work_ratio_percent());
    println!("  Context switches: {:.1}/day", report.context_switch_index);
    println!("  Ship notes:       {}", report.ship_notes_count);
    println!();
}
