//! Foreground countdown with a progress bar
//!
//! Drives a [`FocusTimer`] on a current-thread runtime until it completes or
//! Ctrl+C interrupts it.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use focusshield_core::format::format_time;
use focusshield_core::{FocusSession, FocusTimer, StorageBackend, TimerEvent, Tracker};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
    Completed,
    Interrupted,
}

/// Block until the countdown ends.
pub fn run(title: &str, duration_sec: u64) -> Result<CountdownOutcome> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to create timer runtime")?;

    let (stop_tx, stop_rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("failed to set Ctrl+C handler")?;

    println!("Focusing on \"{title}\". Press Ctrl+C to stop early.");
    runtime.block_on(countdown(title, duration_sec, stop_rx))
}

/// Drive the countdown of a started session, then record how it ended.
///
/// If the countdown fails the session is still finished, as interrupted,
/// before the error is returned.
pub fn finish_after<B: StorageBackend>(
    tracker: &Tracker<'_, B>,
    session_id: &str,
    drive: impl FnOnce() -> Result<CountdownOutcome>,
) -> Result<(CountdownOutcome, FocusSession)> {
    match drive() {
        Ok(outcome) => {
            let finished = tracker
                .finish_session(session_id, outcome == CountdownOutcome::Interrupted, Utc::now())
                .context("failed to finish session")?;
            Ok((outcome, finished))
        }
        Err(e) => {
            if let Err(finish_err) = tracker.finish_session(session_id, true, Utc::now()) {
                tracing::warn!(error = %finish_err, "Failed to close session after countdown error");
            }
            Err(e)
        }
    }
}

async fn countdown(
    title: &str,
    duration_sec: u64,
    mut stop_rx: mpsc::UnboundedReceiver<()>,
) -> Result<CountdownOutcome> {
    let (mut timer, mut events) = FocusTimer::new();
    timer.start(duration_sec)?;

    let pb = ProgressBar::new(duration_sec);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {prefix}")
            .context("invalid progress template")?
            .progress_chars("#>-"),
    );
    pb.set_message(title.to_string());
    pb.set_prefix(format_time(duration_sec));

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(TimerEvent::Tick { remaining }) => {
                    pb.set_position(duration_sec - remaining);
                    pb.set_prefix(format_time(remaining));
                }
                Some(TimerEvent::Completed) => {
                    pb.finish_and_clear();
                    tracing::info!(duration_sec, "Countdown completed");
                    return Ok(CountdownOutcome::Completed);
                }
                None => bail!("timer stopped unexpectedly"),
            },
            _ = stop_rx.recv() => {
                let stopped = timer.stop();
                pb.abandon();
                tracing::info!(elapsed_sec = stopped.elapsed_sec(), "Countdown interrupted");
                return Ok(CountdownOutcome::Interrupted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use focusshield_core::{LocalStore, MemoryStorage};

    #[test]
    fn test_failed_countdown_closes_session() {
        let store = LocalStore::new(MemoryStorage::new());
        let tracker = Tracker::new(&store);
        let session = tracker
            .start_session("Refactor sync", 1500, None, Utc::now())
            .unwrap();

        let result = finish_after(&tracker, &session.id, || {
            Err(anyhow::anyhow!("timer stopped unexpectedly"))
        });
        assert!(result.is_err());

        let stored = &store.load().sessions[0];
        assert!(!stored.is_running());
        assert!(stored.interrupted);
        assert!(stored.duration_sec < 1500);
    }

    #[test]
    fn test_completed_countdown_finishes_session() {
        let store = LocalStore::new(MemoryStorage::new());
        let tracker = Tracker::new(&store);
        let session = tracker
            .start_session("Write docs", 1, None, Utc::now())
            .unwrap();

        let (outcome, finished) =
            finish_after(&tracker, &session.id, || Ok(CountdownOutcome::Completed)).unwrap();
        assert_eq!(outcome, CountdownOutcome::Completed);
        assert!(!finished.interrupted);
        assert!(finished.ended_at.is_some());
    }
}
