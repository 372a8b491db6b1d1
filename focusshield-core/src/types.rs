//! Core domain types for focusshield
//!
//! These types are shared by the local document, the remote store rows and
//! the derived views.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | A timed focus session on one task |
//! | **Ship note** | A short note written after a session describing what was produced |
//! | **Meeting block** | A manually recorded meeting interval |
//! | **Local document** | The single JSON document holding every locally-created record |
//! | **Synced** | A record known to exist in the signed-in user's remote account |
//!
//! ### Sync state
//!
//! On the wire and on disk a record carries two optional fields, `user_id` and
//! `synced`. In Rust they are folded into [`SyncState`] so that "local only"
//! and "pushed to an account" are distinct variants rather than a flag and an
//! id that may disagree.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ============================================
// Sync state
// ============================================

/// Whether a record has reached the remote account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SyncFields", into = "SyncFields")]
pub enum SyncState {
    /// Created on this device and not yet pushed
    #[default]
    Local,
    /// Present remotely. `user_id` is absent only in documents written
    /// before user ids were stamped locally.
    Synced { user_id: Option<String> },
}

impl SyncState {
    pub fn synced(user_id: impl Into<String>) -> Self {
        SyncState::Synced {
            user_id: Some(user_id.into()),
        }
    }

    pub fn is_synced(&self) -> bool {
        matches!(self, SyncState::Synced { .. })
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            SyncState::Local => None,
            SyncState::Synced { user_id } => user_id.as_deref(),
        }
    }
}

/// Persisted shape of [`SyncState`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SyncFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    synced: Option<bool>,
}

impl From<SyncFields> for SyncState {
    fn from(fields: SyncFields) -> Self {
        match (fields.synced, fields.user_id) {
            (Some(true), user_id) => SyncState::Synced { user_id },
            // A user id alone is not proof of a push; remote reads mark their own rows
            _ => SyncState::Local,
        }
    }
}

impl From<SyncState> for SyncFields {
    fn from(state: SyncState) -> Self {
        match state {
            SyncState::Local => SyncFields::default(),
            SyncState::Synced { user_id } => SyncFields {
                user_id,
                synced: Some(true),
            },
        }
    }
}

// ============================================
// Records
// ============================================

/// The three record lists of the local document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Sessions,
    ShipNotes,
    MeetingBlocks,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [
        RecordKind::Sessions,
        RecordKind::ShipNotes,
        RecordKind::MeetingBlocks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Sessions => "sessions",
            RecordKind::ShipNotes => "ship_notes",
            RecordKind::MeetingBlocks => "meeting_blocks",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behaviour shared by every record stored in the local document.
pub trait Record: Clone + Serialize + DeserializeOwned {
    const KIND: RecordKind;

    fn id(&self) -> &str;

    fn sync(&self) -> &SyncState;

    fn sync_mut(&mut self) -> &mut SyncState;

    /// The list of this kind inside a document.
    fn list(doc: &LocalDocument) -> &Vec<Self>;

    fn list_mut(doc: &mut LocalDocument) -> &mut Vec<Self>;

    fn is_synced(&self) -> bool {
        self.sync().is_synced()
    }
}

/// A timed focus session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusSession {
    pub id: String,
    #[serde(flatten)]
    pub sync: SyncState,
    pub started_at: DateTime<Utc>,
    /// Absent while the session is running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Planned duration while running; actual elapsed seconds once ended
    #[serde(default)]
    pub duration_sec: u64,
    #[serde(default)]
    pub task_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    /// True when stopped by hand rather than by the countdown reaching zero
    #[serde(default)]
    pub interrupted: bool,
    pub created_at: DateTime<Utc>,
}

impl FocusSession {
    /// Ended naturally (not stopped early).
    pub fn is_completed(&self) -> bool {
        self.ended_at.is_some() && !self.interrupted
    }

    pub fn is_running(&self) -> bool {
        self.ended_at.is_none()
    }
}

impl Record for FocusSession {
    const KIND: RecordKind = RecordKind::Sessions;

    fn id(&self) -> &str {
        &self.id
    }

    fn sync(&self) -> &SyncState {
        &self.sync
    }

    fn sync_mut(&mut self) -> &mut SyncState {
        &mut self.sync
    }

    fn list(doc: &LocalDocument) -> &Vec<Self> {
        &doc.sessions
    }

    fn list_mut(doc: &mut LocalDocument) -> &mut Vec<Self> {
        &mut doc.sessions
    }
}

/// Shallow update applied over a stored [`FocusSession`].
///
/// `None` leaves the field as it is.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_sec: Option<u64>,
    pub interrupted: Option<bool>,
    pub task_title: Option<String>,
    /// `Some(None)` clears the url
    pub artifact_url: Option<Option<String>>,
}

impl SessionPatch {
    pub fn apply(self, session: &mut FocusSession) {
        if let Some(ended_at) = self.ended_at {
            session.ended_at = Some(ended_at);
        }
        if let Some(duration_sec) = self.duration_sec {
            session.duration_sec = duration_sec;
        }
        if let Some(interrupted) = self.interrupted {
            session.interrupted = interrupted;
        }
        if let Some(task_title) = self.task_title {
            session.task_title = task_title;
        }
        if let Some(artifact_url) = self.artifact_url {
            session.artifact_url = artifact_url;
        }
    }
}

/// What a session produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipNote {
    pub id: String,
    pub session_id: String,
    #[serde(flatten)]
    pub sync: SyncState,
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Record for ShipNote {
    const KIND: RecordKind = RecordKind::ShipNotes;

    fn id(&self) -> &str {
        &self.id
    }

    fn sync(&self) -> &SyncState {
        &self.sync
    }

    fn sync_mut(&mut self) -> &mut SyncState {
        &mut self.sync
    }

    fn list(doc: &LocalDocument) -> &Vec<Self> {
        &doc.ship_notes
    }

    fn list_mut(doc: &mut LocalDocument) -> &mut Vec<Self> {
        &mut doc.ship_notes
    }
}

/// A manually recorded meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingBlock {
    pub id: String,
    #[serde(flatten)]
    pub sync: SyncState,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MeetingBlock {
    /// Length of the block in fractional hours.
    pub fn hours(&self) -> f64 {
        (self.end_at - self.start_at).num_milliseconds() as f64 / 3_600_000.0
    }
}

impl Record for MeetingBlock {
    const KIND: RecordKind = RecordKind::MeetingBlocks;

    fn id(&self) -> &str {
        &self.id
    }

    fn sync(&self) -> &SyncState {
        &self.sync
    }

    fn sync_mut(&mut self) -> &mut SyncState {
        &mut self.sync
    }

    fn list(doc: &LocalDocument) -> &Vec<Self> {
        &doc.meeting_blocks
    }

    fn list_mut(doc: &mut LocalDocument) -> &mut Vec<Self> {
        &mut doc.meeting_blocks
    }
}

// ============================================
// Local document
// ============================================

/// Everything created on this device, persisted as one JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalDocument {
    #[serde(default)]
    pub sessions: Vec<FocusSession>,
    #[serde(default)]
    pub ship_notes: Vec<ShipNote>,
    #[serde(default)]
    pub meeting_blocks: Vec<MeetingBlock>,
    #[serde(rename = "lastUpdated", default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl Default for LocalDocument {
    fn default() -> Self {
        Self {
            sessions: Vec::new(),
            ship_notes: Vec::new(),
            meeting_blocks: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

impl LocalDocument {
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty() && self.ship_notes.is_empty() && self.meeting_blocks.is_empty()
    }

    /// Number of `Local` records across all lists.
    pub fn unsynced_count(&self) -> usize {
        self.sessions.iter().filter(|r| !r.is_synced()).count()
            + self.ship_notes.iter().filter(|r| !r.is_synced()).count()
            + self.meeting_blocks.iter().filter(|r| !r.is_synced()).count()
    }
}

// ============================================
// Accounts
// ============================================

/// The signed-in user as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Status of a payment-provider subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    PastDue,
    Trialing,
    Incomplete,
    /// Any status this version does not distinguish
    Other(String),
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::Other(s) => s,
        }
    }
}

impl From<String> for SubscriptionStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "active" => SubscriptionStatus::Active,
            "canceled" => SubscriptionStatus::Canceled,
            "past_due" => SubscriptionStatus::PastDue,
            "trialing" => SubscriptionStatus::Trialing,
            "incomplete" => SubscriptionStatus::Incomplete,
            _ => SubscriptionStatus::Other(s),
        }
    }
}

impl From<SubscriptionStatus> for String {
    fn from(status: SubscriptionStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Subscription row keyed by user id, written by the payment webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_subscription_id: Option<String>,
    #[serde(default)]
    pub status: Option<SubscriptionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == Some(SubscriptionStatus::Active)
    }
}
