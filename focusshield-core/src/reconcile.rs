//! Local/remote reconciliation
//!
//! Read-merge builds one view over local and remote records: every remote
//! record, then local records whose id the remote does not have. Ids are
//! generated on the client, so an id seen remotely means the record has been
//! pushed and the remote copy is authoritative.
//!
//! Push-sync sends every `Local` record upstream with an upsert keyed by id
//! and only flips the local flags once all three kinds went through. A failed
//! push leaves everything `Local`; the next attempt resends it all.

use std::collections::HashSet;

use chrono::{DateTime, TimeZone};

use crate::config::BillingConfig;
use crate::entitlement::{plan_for, Plan};
use crate::error::{Error, Result};
use crate::remote::{to_remote_row, RemoteStore, Table};
use crate::report::{build_weekly_reports, WeeklyReport};
use crate::store::{decode_records, LocalStore, StorageBackend};
use crate::types::{
    AuthUser, FocusSession, LocalDocument, MeetingBlock, Record, ShipNote, Subscription,
    SyncState,
};

/// Records from both sides after de-duplication by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedRecords {
    /// Sorted by `started_at`, newest first
    pub sessions: Vec<FocusSession>,
    pub ship_notes: Vec<ShipNote>,
    pub meeting_blocks: Vec<MeetingBlock>,
}

impl MergedRecords {
    fn from_local(doc: LocalDocument) -> Self {
        let mut merged = Self {
            sessions: doc.sessions,
            ship_notes: doc.ship_notes,
            meeting_blocks: doc.meeting_blocks,
        };
        sort_newest_first(&mut merged.sessions);
        merged
    }
}

/// A session with the note written for it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionWithNote {
    pub session: FocusSession,
    pub ship_note: Option<ShipNote>,
}

/// Which sessions a history view shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryFilter {
    #[default]
    All,
    Completed,
    Interrupted,
}

impl HistoryFilter {
    pub fn accepts(&self, session: &FocusSession) -> bool {
        match self {
            HistoryFilter::All => true,
            HistoryFilter::Completed => session.is_completed(),
            HistoryFilter::Interrupted => session.interrupted,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryView {
    pub sessions: Vec<SessionWithNote>,
    /// Some local record has not been pushed yet
    pub has_unsynced: bool,
}

/// Result of a push-sync attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// No signed-in user or no remote store; nothing was sent
    Skipped,
    Pushed {
        sessions: usize,
        ship_notes: usize,
        meeting_blocks: usize,
        /// History reloaded after the flags were cleared
        history: HistoryView,
    },
}

impl SyncOutcome {
    pub fn pushed_count(&self) -> usize {
        match self {
            SyncOutcome::Skipped => 0,
            SyncOutcome::Pushed {
                sessions,
                ship_notes,
                meeting_blocks,
                ..
            } => sessions + ship_notes + meeting_blocks,
        }
    }
}

/// Merges and pushes records for the current user.
pub struct Reconciler<'a, B: StorageBackend> {
    store: &'a LocalStore<B>,
    remote: Option<&'a dyn RemoteStore>,
    user: Option<&'a AuthUser>,
}

impl<'a, B: StorageBackend> Reconciler<'a, B> {
    /// Local-only reconciler.
    pub fn new(store: &'a LocalStore<B>) -> Self {
        Self {
            store,
            remote: None,
            user: None,
        }
    }

    pub fn with_remote(mut self, remote: Option<&'a dyn RemoteStore>) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_user(mut self, user: Option<&'a AuthUser>) -> Self {
        self.user = user;
        self
    }

    fn account(&self) -> Option<(&'a dyn RemoteStore, &'a AuthUser)> {
        Some((self.remote?, self.user?))
    }

    /// Unified record set, remote first.
    ///
    /// A failed remote read is logged and yields local records only.
    pub fn merged(&self) -> MergedRecords {
        let local = self.store.load();

        let Some((remote, user)) = self.account() else {
            return MergedRecords::from_local(local);
        };

        match fetch_remote(remote, &user.id) {
            Ok((sessions, ship_notes, meeting_blocks)) => {
                let mut merged = MergedRecords {
                    sessions: merge_by_id(sessions, local.sessions),
                    ship_notes: merge_by_id(ship_notes, local.ship_notes),
                    meeting_blocks: merge_by_id(meeting_blocks, local.meeting_blocks),
                };
                sort_newest_first(&mut merged.sessions);
                tracing::debug!(
                    user_id = %user.id,
                    sessions = merged.sessions.len(),
                    ship_notes = merged.ship_notes.len(),
                    meeting_blocks = merged.meeting_blocks.len(),
                    "Merged remote and local records"
                );
                merged
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load remote records, showing local data");
                MergedRecords::from_local(local)
            }
        }
    }

    /// Session history with at most one note per session.
    pub fn history(&self, filter: HistoryFilter) -> HistoryView {
        let merged = self.merged();

        let sessions = merged
            .sessions
            .into_iter()
            .filter(|s| filter.accepts(s))
            .map(|session| {
                let ship_note = merged
                    .ship_notes
                    .iter()
                    .find(|n| n.session_id == session.id)
                    .cloned();
                SessionWithNote { session, ship_note }
            })
            .collect();

        HistoryView {
            sessions,
            has_unsynced: self.store.has_unsynced(),
        }
    }

    /// Weekly reports over the merged records, newest week first.
    pub fn weekly_reports<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
        week_count: u32,
    ) -> Vec<WeeklyReport> {
        let merged = self.merged();
        build_weekly_reports(&merged.sessions, &merged.meeting_blocks, now, week_count)
    }

    /// Push every unsynced local record to the user's account.
    pub fn push_sync(&self) -> Result<SyncOutcome> {
        let Some((remote, user)) = self.account() else {
            tracing::debug!("Push-sync skipped: no signed-in user or remote store");
            return Ok(SyncOutcome::Skipped);
        };

        let doc = self.store.load();
        let sessions = push_kind(remote, &doc.sessions, &user.id)?;
        let ship_notes = push_kind(remote, &doc.ship_notes, &user.id)?;
        let meeting_blocks = push_kind(remote, &doc.meeting_blocks, &user.id)?;

        self.store.mark_all_synced(&user.id);
        tracing::info!(
            user_id = %user.id,
            sessions,
            ship_notes,
            meeting_blocks,
            "Push-sync complete"
        );

        Ok(SyncOutcome::Pushed {
            sessions,
            ship_notes,
            meeting_blocks,
            history: self.history(HistoryFilter::All),
        })
    }

    /// The user's subscription row, if one can be read.
    pub fn subscription(&self) -> Option<Subscription> {
        let (remote, user) = self.account()?;
        match remote.select_by_user(Table::Subscriptions, &user.id) {
            Ok(rows) => decode_subscription(&rows),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load subscription");
                None
            }
        }
    }

    /// Plan of the current user. Anything unreadable counts as Free.
    pub fn plan(&self, billing: &BillingConfig) -> Plan {
        plan_for(self.subscription().as_ref(), billing)
    }
}

fn decode_subscription(rows: &[serde_json::Value]) -> Option<Subscription> {
    let row = rows.first()?;
    match serde_json::from_value(row.clone()) {
        Ok(subscription) => Some(subscription),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring undecodable subscription row");
            None
        }
    }
}

type RemoteRecords = (Vec<FocusSession>, Vec<ShipNote>, Vec<MeetingBlock>);

fn fetch_remote(remote: &dyn RemoteStore, user_id: &str) -> Result<RemoteRecords> {
    Ok((
        fetch_kind(remote, user_id)?,
        fetch_kind(remote, user_id)?,
        fetch_kind(remote, user_id)?,
    ))
}

/// Remote rows of one kind, all marked as synced to `user_id`.
fn fetch_kind<R: Record>(remote: &dyn RemoteStore, user_id: &str) -> Result<Vec<R>> {
    let rows = remote.select_by_user(Table::for_kind(R::KIND), user_id)?;
    let mut records: Vec<R> = decode_records(&rows);
    for record in &mut records {
        *record.sync_mut() = SyncState::synced(user_id);
    }
    Ok(records)
}

/// Remote records, then local records with ids the remote lacks.
fn merge_by_id<R: Record>(remote: Vec<R>, local: Vec<R>) -> Vec<R> {
    let remote_ids: HashSet<String> = remote.iter().map(|r| r.id().to_string()).collect();
    remote
        .into_iter()
        .chain(local.into_iter().filter(|r| !remote_ids.contains(r.id())))
        .collect()
}

fn sort_newest_first(sessions: &mut [FocusSession]) {
    sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
}

/// Upsert the `Local` records of one kind. Returns how many were sent.
fn push_kind<R: Record>(remote: &dyn RemoteStore, records: &[R], user_id: &str) -> Result<usize> {
    let rows = records
        .iter()
        .filter(|r| !r.is_synced())
        .map(|r| to_remote_row(r, user_id))
        .collect::<Result<Vec<_>>>()?;

    if rows.is_empty() {
        return Ok(0);
    }

    let table = Table::for_kind(R::KIND);
    remote.upsert(table, &rows, "id").map_err(|e| {
        tracing::warn!(table = %table, error = %e, "Push-sync upsert failed");
        Error::Sync(format!("failed to upload {}: {}", R::KIND, e))
    })?;

    tracing::debug!(table = %table, count = rows.len(), "Upserted unsynced records");
    Ok(rows.len())
}
