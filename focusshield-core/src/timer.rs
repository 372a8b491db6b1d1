//! Focus countdown timer
//!
//! [`FocusTimer`] owns the only handle to its tick task. The task wakes once
//! per tick interval, decrements the remaining seconds and reports progress
//! on an unbounded channel. Pausing, stopping and dropping the timer abort the
//! task before the state changes, so no tick can arrive afterwards.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub status: TimerStatus,
    pub duration_sec: u64,
    pub remaining_sec: u64,
}

impl TimerState {
    /// Seconds counted down so far.
    pub fn elapsed_sec(&self) -> u64 {
        self.duration_sec.saturating_sub(self.remaining_sec)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, TimerStatus::Running | TimerStatus::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// One tick elapsed; `remaining` is always above zero
    Tick { remaining: u64 },
    /// The countdown reached zero
    Completed,
}

pub struct FocusTimer {
    state: Arc<Mutex<TimerState>>,
    ticker: Option<JoinHandle<()>>,
    events: mpsc::UnboundedSender<TimerEvent>,
    tick_interval: Duration,
}

fn lock_error<T>(_: T) -> Error {
    Error::Timer("timer state lock poisoned".to_string())
}

impl FocusTimer {
    /// Timer ticking once per second, plus the receiver for its events.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        Self::with_tick_interval(Duration::from_secs(1))
    }

    pub fn with_tick_interval(
        tick_interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let timer = Self {
            state: Arc::new(Mutex::new(TimerState::default())),
            ticker: None,
            events,
            tick_interval,
        };
        (timer, receiver)
    }

    pub fn state(&self) -> TimerState {
        self.state.lock().map(|s| *s).unwrap_or_default()
    }

    /// Begin a countdown of `duration_sec` seconds.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, duration_sec: u64) -> Result<()> {
        if duration_sec == 0 {
            return Err(Error::Timer("duration must be greater than zero".to_string()));
        }

        {
            let mut state = self.state.lock().map_err(lock_error)?;
            if state.is_active() {
                return Err(Error::Timer("timer already active".to_string()));
            }
            *state = TimerState {
                status: TimerStatus::Running,
                duration_sec,
                remaining_sec: duration_sec,
            };
        }

        tracing::debug!(duration_sec, "Timer started");
        self.spawn_ticker();
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.cancel_ticker();
        let mut state = self.state.lock().map_err(lock_error)?;
        if state.status != TimerStatus::Running {
            return Err(Error::Timer("timer is not running".to_string()));
        }
        state.status = TimerStatus::Paused;
        tracing::debug!(remaining_sec = state.remaining_sec, "Timer paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        {
            let mut state = self.state.lock().map_err(lock_error)?;
            if state.status != TimerStatus::Paused {
                return Err(Error::Timer("timer is not paused".to_string()));
            }
            state.status = TimerStatus::Running;
        }
        self.spawn_ticker();
        Ok(())
    }

    /// Cancel the countdown and reset to idle.
    ///
    /// Returns the state as it was when stopped.
    pub fn stop(&mut self) -> TimerState {
        self.cancel_ticker();
        let stopped = match self.state.lock() {
            Ok(mut state) => std::mem::take(&mut *state),
            Err(_) => TimerState::default(),
        };
        tracing::debug!(
            elapsed_sec = stopped.elapsed_sec(),
            status = ?stopped.status,
            "Timer stopped"
        );
        stopped
    }

    fn spawn_ticker(&mut self) {
        self.cancel_ticker();

        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let tick_interval = self.tick_interval;

        self.ticker = Some(tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;

                let remaining = {
                    let Ok(mut state) = state.lock() else {
                        return;
                    };
                    if state.status != TimerStatus::Running {
                        return;
                    }
                    state.remaining_sec = state.remaining_sec.saturating_sub(1);
                    if state.remaining_sec == 0 {
                        state.status = TimerStatus::Completed;
                    }
                    state.remaining_sec
                };

                if remaining == 0 {
                    tracing::debug!("Timer completed");
                    let _ = events.send(TimerEvent::Completed);
                    return;
                }
                if events.send(TimerEvent::Tick { remaining }).is_err() {
                    // Nobody is listening any more
                    return;
                }
            }
        }));
    }

    fn cancel_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }
}

impl Drop for FocusTimer {
    fn drop(&mut self) {
        self.cancel_ticker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    #[tokio::test(start_paused = true)]
    async fn test_countdown_runs_to_completion() {
        let (mut timer, mut rx) = FocusTimer::new();
        timer.start(3).unwrap();

        assert_eq!(rx.recv().await, Some(TimerEvent::Tick { remaining: 2 }));
        assert_eq!(rx.recv().await, Some(TimerEvent::Tick { remaining: 1 }));
        assert_eq!(rx.recv().await, Some(TimerEvent::Completed));

        let state = timer.state();
        assert_eq!(state.status, TimerStatus::Completed);
        assert_eq!(state.elapsed_sec(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_zero_and_double_start() {
        let (mut timer, _rx) = FocusTimer::new();
        assert!(timer.start(0).is_err());

        timer.start(10).unwrap();
        assert!(timer.start(10).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_leaves_no_dangling_tick() {
        let (mut timer, mut rx) = FocusTimer::new();
        timer.start(10).unwrap();
        assert_eq!(rx.recv().await, Some(TimerEvent::Tick { remaining: 9 }));

        let stopped = timer.stop();
        assert_eq!(stopped.elapsed_sec(), 1);
        assert_eq!(stopped.status, TimerStatus::Running);
        assert_eq!(timer.state().status, TimerStatus::Idle);

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume() {
        let (mut timer, mut rx) = FocusTimer::new();
        timer.start(10).unwrap();
        assert_eq!(rx.recv().await, Some(TimerEvent::Tick { remaining: 9 }));

        timer.pause().unwrap();
        assert!(timer.pause().is_err());
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(timer.state().remaining_sec, 9);
        assert_eq!(timer.state().status, TimerStatus::Paused);

        timer.resume().unwrap();
        assert_eq!(rx.recv().await, Some(TimerEvent::Tick { remaining: 8 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_completion() {
        let (mut timer, mut rx) = FocusTimer::with_tick_interval(Duration::from_millis(100));
        timer.start(1).unwrap();
        assert_eq!(rx.recv().await, Some(TimerEvent::Completed));

        timer.start(2).unwrap();
        assert_eq!(rx.recv().await, Some(TimerEvent::Tick { remaining: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_ticker() {
        let (mut timer, mut rx) = FocusTimer::new();
        timer.start(10).unwrap();
        drop(timer);

        // The sender went away with the timer and the task was aborted
        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(rx.recv().await, None);
    }
}
