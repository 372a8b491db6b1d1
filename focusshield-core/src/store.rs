//! Local record store
//!
//! All locally-created records live in one JSON document under a fixed key.
//! Every mutation loads the whole document, changes it and writes it back;
//! there are no partial writes. Storage failures never reach the caller: a
//! failed read yields an empty document and a failed write is logged.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::Config;
use crate::types::{
    FocusSession, LocalDocument, MeetingBlock, Record, SessionPatch, ShipNote, SyncState,
};

/// Storage key of the local document.
pub const LOCAL_STORAGE_KEY: &str = "focusshield:v1";

/// Key/value storage primitive. Each call is atomic: a reader sees either the
/// previous value or the complete new one.
pub trait StorageBackend {
    fn read(&self, key: &str) -> io::Result<Option<String>>;

    fn write(&self, key: &str, value: &str) -> io::Result<()>;

    fn remove(&self, key: &str) -> io::Result<()>;
}

/// One file per key inside a directory.
///
/// Writes go to a sibling temp file which is then renamed over the target.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key` (`focusshield:v1` -> `focusshield-v1.json`).
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl StorageBackend for FileStorage {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, key: &str, value: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let target = self.path_for(key);
        let tmp = target.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &target)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// In-memory storage for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (simulates full or disabled storage).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Store a raw value, bypassing the document layer.
    pub fn insert_raw(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.to_string(), value.to_string());
        }
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "memory storage lock poisoned")
}

impl StorageBackend for MemoryStorage {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "storage quota exceeded"));
        }
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.remove(key);
        Ok(())
    }
}

impl<B: StorageBackend + ?Sized> StorageBackend for &B {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> io::Result<()> {
        (**self).write(key, value)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        (**self).remove(key)
    }
}

/// Decode records one by one, skipping (and logging) any that fail.
pub(crate) fn decode_records<R: Record>(items: &[Value]) -> Vec<R> {
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match R::deserialize(item) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(
                    kind = %R::KIND,
                    index,
                    error = %e,
                    "Skipping undecodable record"
                );
                None
            }
        })
        .collect()
}

fn decode_list<R: Record>(doc: &Map<String, Value>) -> Vec<R> {
    match doc.get(R::KIND.as_str()) {
        Some(Value::Array(items)) => decode_records(items),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            tracing::warn!(kind = %R::KIND, found = %other, "Expected a list, ignoring");
            Vec::new()
        }
    }
}

/// Parse a stored document. Never fails: corrupt input yields an empty document.
pub fn decode_document(raw: &str) -> LocalDocument {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Local document is not valid JSON, starting fresh");
            return LocalDocument::default();
        }
    };

    let Some(doc) = value.as_object() else {
        tracing::warn!("Local document is not a JSON object, starting fresh");
        return LocalDocument::default();
    };

    LocalDocument {
        sessions: decode_list(doc),
        ship_notes: decode_list(doc),
        meeting_blocks: decode_list(doc),
        last_updated: doc
            .get("lastUpdated")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_else(Utc::now),
    }
}

/// Handle to the local document.
///
/// Consumers receive the store explicitly; nothing reaches the document
/// except through these operations.
pub struct LocalStore<B: StorageBackend = FileStorage> {
    backend: B,
    key: String,
}

impl LocalStore<FileStorage> {
    /// Store backed by files in the XDG data directory.
    pub fn open_default() -> Self {
        Self::new(FileStorage::new(Config::data_dir()))
    }
}

impl<B: StorageBackend> LocalStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            key: LOCAL_STORAGE_KEY.to_string(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Current document, or a fresh one when storage is absent or corrupt.
    pub fn load(&self) -> LocalDocument {
        match self.backend.read(&self.key) {
            Ok(Some(raw)) => decode_document(&raw),
            Ok(None) => LocalDocument::default(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to read local data");
                LocalDocument::default()
            }
        }
    }

    /// Stamp `last_updated` and persist. Failures are logged, not returned.
    pub fn save(&self, doc: &mut LocalDocument) {
        doc.last_updated = Utc::now();

        let serialized = match serde_json::to_string(doc) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize local data");
                return;
            }
        };

        if let Err(e) = self.backend.write(&self.key, &serialized) {
            tracing::error!(error = %e, "Failed to save local data");
        }
    }

    /// Append one record to its list.
    pub fn append<R: Record>(&self, record: R) {
        let mut doc = self.load();
        tracing::debug!(kind = %R::KIND, id = %record.id(), "Appending record");
        R::list_mut(&mut doc).push(record);
        self.save(&mut doc);
    }

    /// Shallow-merge `patch` over the session with `id`.
    ///
    /// Returns false (and writes nothing) when no such session exists.
    pub fn update_session(&self, id: &str, patch: SessionPatch) -> bool {
        let mut doc = self.load();
        let Some(session) = doc.sessions.iter_mut().find(|s| s.id == id) else {
            tracing::debug!(id, "update_session: no session with this id");
            return false;
        };
        patch.apply(session);
        self.save(&mut doc);
        true
    }

    /// Remove a meeting block. Returns whether one was removed.
    pub fn remove_meeting_block(&self, id: &str) -> bool {
        let mut doc = self.load();
        let before = doc.meeting_blocks.len();
        doc.meeting_blocks.retain(|b| b.id != id);
        let removed = doc.meeting_blocks.len() != before;
        self.save(&mut doc);
        removed
    }

    /// Mark every local-only record as synced to `user_id`.
    pub fn mark_all_synced(&self, user_id: &str) {
        let mut doc = self.load();
        mark_synced(&mut doc.sessions, user_id);
        mark_synced(&mut doc.ship_notes, user_id);
        mark_synced(&mut doc.meeting_blocks, user_id);
        self.save(&mut doc);
    }

    /// True if any record in any list has not been pushed.
    pub fn has_unsynced(&self) -> bool {
        self.load().unsynced_count() > 0
    }

    /// Delete the whole document.
    pub fn clear(&self) {
        if let Err(e) = self.backend.remove(&self.key) {
            tracing::error!(error = %e, "Failed to clear local data");
        }
    }

    pub fn find_session(&self, id: &str) -> Option<FocusSession> {
        self.load().sessions.into_iter().find(|s| s.id == id)
    }

    pub fn find_meeting_block(&self, id: &str) -> Option<MeetingBlock> {
        self.load().meeting_blocks.into_iter().find(|b| b.id == id)
    }

    pub fn note_for_session(&self, session_id: &str) -> Option<ShipNote> {
        self.load()
            .ship_notes
            .into_iter()
            .find(|n| n.session_id == session_id)
    }

    /// Sessions that ended without being interrupted.
    pub fn completed_sessions_count(&self) -> usize {
        self.load()
            .sessions
            .iter()
            .filter(|s| s.is_completed())
            .count()
    }

    pub fn ship_notes_count(&self) -> usize {
        self.load().ship_notes.len()
    }

    /// Random UUID v4.
    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }
}

fn mark_synced<R: Record>(records: &mut [R], user_id: &str) {
    for record in records.iter_mut().filter(|r| !r.is_synced()) {
        *record.sync_mut() = SyncState::synced(user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};
    use tempfile::TempDir;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn session(id: &str) -> FocusSession {
        FocusSession {
            id: id.to_string(),
            sync: SyncState::Local,
            started_at: ts("2024-05-15T14:00:00Z"),
            ended_at: None,
            duration_sec: 1500,
            task_title: "Write parser".to_string(),
            artifact_url: None,
            interrupted: false,
            created_at: ts("2024-05-15T14:00:00Z"),
        }
    }

    fn meeting(id: &str) -> MeetingBlock {
        MeetingBlock {
            id: id.to_string(),
            sync: SyncState::Local,
            start_at: ts("2024-05-15T09:00:00Z"),
            end_at: ts("2024-05-15T10:00:00Z"),
            title: Some("Standup".to_string()),
            created_at: ts("2024-05-15T08:00:00Z"),
        }
    }

    #[test]
    fn test_load_missing_document_is_empty() {
        let store = LocalStore::new(MemoryStorage::new());
        let doc = store.load();
        assert!(doc.is_empty());
        assert!(!store.has_unsynced());
    }

    #[test]
    fn test_load_corrupt_document_is_empty() {
        let storage = MemoryStorage::new();
        storage.insert_raw(LOCAL_STORAGE_KEY, "{not json");
        let store = LocalStore::new(storage);
        assert!(store.load().is_empty());

        store.backend().insert_raw(LOCAL_STORAGE_KEY, "[1, 2, 3]");
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_skips_bad_records_and_keeps_the_rest() {
        let storage = MemoryStorage::new();
        storage.insert_raw(
            LOCAL_STORAGE_KEY,
            r#"{
                "sessions": [
                    {"id": "ok", "started_at": "2024-05-15T14:00:00.000Z", "duration_sec": 60,
                     "task_title": "t", "interrupted": false, "created_at": "2024-05-15T14:00:00.000Z",
                     "some_future_field": 42},
                    {"id": "broken", "started_at": "not a date"}
                ],
                "lastUpdated": "2024-05-15T14:01:00.000Z"
            }"#,
        );
        let store = LocalStore::new(storage);
        let doc = store.load();
        assert_eq!(doc.sessions.len(), 1);
        assert_eq!(doc.sessions[0].id, "ok");
        assert!(doc.ship_notes.is_empty());
        assert!(doc.meeting_blocks.is_empty());
        assert_eq!(doc.last_updated, ts("2024-05-15T14:01:00Z"));
    }

    #[test]
    fn test_user_id_without_flag_counts_as_unsynced() {
        let storage = MemoryStorage::new();
        storage.insert_raw(
            LOCAL_STORAGE_KEY,
            r#"{
                "sessions": [
                    {"id": "s1", "user_id": "user-1", "started_at": "2024-05-15T14:00:00.000Z",
                     "duration_sec": 60, "task_title": "t", "interrupted": false,
                     "created_at": "2024-05-15T14:00:00.000Z"}
                ],
                "lastUpdated": "2024-05-15T14:01:00.000Z"
            }"#,
        );
        let store = LocalStore::new(storage);
        assert_eq!(store.load().sessions[0].sync, SyncState::Local);
        assert!(store.has_unsynced());
    }

    #[test]
    fn test_append_and_unsynced_lifecycle() {
        let store = LocalStore::new(MemoryStorage::new());
        store.append(session("s1"));
        store.append(meeting("m1"));

        assert!(store.has_unsynced());
        assert_eq!(store.load().unsynced_count(), 2);

        store.mark_all_synced("user-1");
        assert!(!store.has_unsynced());

        let doc = store.load();
        assert_eq!(doc.sessions[0].sync, SyncState::synced("user-1"));
        assert_eq!(doc.meeting_blocks[0].sync.user_id(), Some("user-1"));

        store.append(session("s2"));
        assert!(store.has_unsynced());
    }

    #[test]
    fn test_save_stamps_last_updated() {
        let store = LocalStore::new(MemoryStorage::new());
        let mut doc = LocalDocument {
            last_updated: Utc::now() - Duration::days(3),
            ..Default::default()
        };
        let before = Utc::now();
        store.save(&mut doc);
        assert!(doc.last_updated >= before);
        assert!(store.backend().raw(LOCAL_STORAGE_KEY).is_some());
    }

    #[test]
    fn test_save_failure_is_not_fatal() {
        let store = LocalStore::new(MemoryStorage::new());
        store.append(session("s1"));

        store.backend().set_fail_writes(true);
        store.append(session("s2"));

        // The failed write left the previous document intact
        let doc = store.load();
        assert_eq!(doc.sessions.len(), 1);
        assert_eq!(doc.sessions[0].id, "s1");
    }

    #[test]
    fn test_update_session_merges_patch() {
        let store = LocalStore::new(MemoryStorage::new());
        store.append(session("s1"));

        let updated = store.update_session(
            "s1",
            SessionPatch {
                ended_at: Some(ts("2024-05-15T14:25:00Z")),
                duration_sec: Some(1500),
                interrupted: Some(false),
                ..Default::default()
            },
        );
        assert!(updated);

        let stored = store.find_session("s1").unwrap();
        assert!(stored.is_completed());
        assert_eq!(stored.task_title, "Write parser");
        assert_eq!(store.completed_sessions_count(), 1);
    }

    #[test]
    fn test_update_missing_session_is_noop() {
        let store = LocalStore::new(MemoryStorage::new());
        store.append(session("s1"));
        let before = store.backend().raw(LOCAL_STORAGE_KEY);

        assert!(!store.update_session("nope", SessionPatch::default()));
        assert_eq!(store.backend().raw(LOCAL_STORAGE_KEY), before);
    }

    #[test]
    fn test_remove_meeting_block() {
        let store = LocalStore::new(MemoryStorage::new());
        store.append(meeting("m1"));
        store.append(meeting("m2"));

        assert!(store.remove_meeting_block("m1"));
        assert!(!store.remove_meeting_block("m1"));

        let ids: Vec<_> = store.load().meeting_blocks.into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["m2".to_string()]);
    }

    #[test]
    fn test_clear_removes_document() {
        let store = LocalStore::new(MemoryStorage::new());
        store.append(session("s1"));
        store.clear();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_generate_id_is_uuid_v4() {
        let a = LocalStore::<MemoryStorage>::generate_id();
        let b = LocalStore::<MemoryStorage>::generate_id();
        assert_ne!(a, b);
        let parsed = Uuid::parse_str(&a).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[test]
    fn test_file_storage_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("nested"));
        let store = LocalStore::new(storage.clone());

        store.append(session("s1"));
        let path = storage.path_for(LOCAL_STORAGE_KEY);
        assert!(path.ends_with("focusshield-v1.json"));
        assert!(path.exists());

        let reopened = LocalStore::new(FileStorage::new(dir.path().join("nested")));
        assert_eq!(reopened.load().sessions.len(), 1);

        reopened.clear();
        assert!(!path.exists());
        // Clearing twice is fine
        reopened.clear();
    }
}
