//! User actions that create or update local records
//!
//! Each action validates its input first and only then writes through the
//! [`LocalStore`]. A rejected action leaves the document untouched.

use chrono::{DateTime, Utc};

use crate::error::{Result, ValidationError};
use crate::store::{LocalStore, StorageBackend};
use crate::time::elapsed_secs;
use crate::types::{FocusSession, MeetingBlock, SessionPatch, ShipNote, SyncState};

/// Minimum length of a ship note, in characters after trimming.
pub const MIN_SHIP_NOTE_CHARS: usize = 10;

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

pub struct Tracker<'a, B: StorageBackend> {
    store: &'a LocalStore<B>,
}

impl<'a, B: StorageBackend> Tracker<'a, B> {
    pub fn new(store: &'a LocalStore<B>) -> Self {
        Self { store }
    }

    /// Record a running session with its planned duration.
    pub fn start_session(
        &self,
        task_title: &str,
        duration_sec: u64,
        artifact_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<FocusSession> {
        let task_title = task_title.trim();
        if task_title.is_empty() {
            return Err(ValidationError::EmptyTaskTitle.into());
        }

        let session = FocusSession {
            id: LocalStore::<B>::generate_id(),
            sync: SyncState::Local,
            started_at: now,
            ended_at: None,
            duration_sec,
            task_title: task_title.to_string(),
            artifact_url: non_blank(artifact_url),
            interrupted: false,
            created_at: now,
        };

        tracing::info!(id = %session.id, duration_sec, "Session started");
        self.store.append(session.clone());
        Ok(session)
    }

    /// End a session, replacing its planned duration with the time it ran.
    pub fn finish_session(
        &self,
        id: &str,
        interrupted: bool,
        now: DateTime<Utc>,
    ) -> Result<FocusSession> {
        let session = self
            .store
            .find_session(id)
            .ok_or_else(|| ValidationError::SessionNotFound(id.to_string()))?;

        let duration_sec = elapsed_secs(session.started_at, now);
        let patch = SessionPatch {
            ended_at: Some(now),
            duration_sec: Some(duration_sec),
            interrupted: Some(interrupted),
            ..Default::default()
        };

        let mut finished = session;
        patch.clone().apply(&mut finished);
        self.store.update_session(id, patch);

        tracing::info!(id, duration_sec, interrupted, "Session finished");
        Ok(finished)
    }

    /// Attach the note describing what a session produced.
    pub fn save_ship_note(
        &self,
        session_id: &str,
        note: &str,
        blocked_reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ShipNote> {
        let note = note.trim();
        let len = note.chars().count();
        if len < MIN_SHIP_NOTE_CHARS {
            return Err(ValidationError::ShipNoteTooShort {
                min: MIN_SHIP_NOTE_CHARS,
                len,
            }
            .into());
        }

        let doc = self.store.load();
        if !doc.sessions.iter().any(|s| s.id == session_id) {
            return Err(ValidationError::SessionNotFound(session_id.to_string()).into());
        }
        if doc.ship_notes.iter().any(|n| n.session_id == session_id) {
            return Err(ValidationError::DuplicateShipNote(session_id.to_string()).into());
        }

        let ship_note = ShipNote {
            id: LocalStore::<B>::generate_id(),
            session_id: session_id.to_string(),
            sync: SyncState::Local,
            note: note.to_string(),
            blocked_reason: non_blank(blocked_reason),
            created_at: now,
        };

        tracing::info!(id = %ship_note.id, session_id, "Ship note saved");
        self.store.append(ship_note.clone());
        Ok(ship_note)
    }

    pub fn add_meeting(
        &self,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        title: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<MeetingBlock> {
        if end_at <= start_at {
            return Err(ValidationError::MeetingEndBeforeStart.into());
        }

        let block = MeetingBlock {
            id: LocalStore::<B>::generate_id(),
            sync: SyncState::Local,
            start_at,
            end_at,
            title: non_blank(title),
            created_at: now,
        };

        tracing::info!(id = %block.id, hours = block.hours(), "Meeting block added");
        self.store.append(block.clone());
        Ok(block)
    }

    /// Returns whether a block with this id existed.
    pub fn remove_meeting(&self, id: &str) -> bool {
        let removed = self.store.remove_meeting_block(id);
        tracing::info!(id, removed, "Meeting block removal");
        removed
    }

    /// Anonymous users who completed a session and wrote a note get nudged
    /// to sign in so their data is kept.
    pub fn should_suggest_sign_in(&self) -> bool {
        self.store.completed_sessions_count() >= 1 && self.store.ship_notes_count() >= 1
    }
}
