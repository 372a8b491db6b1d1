//! In-memory remote store
//!
//! Upserts replace matching rows field by field, like the HTTP store's
//! merge-duplicates resolution. Individual tables can be made to fail.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use serde_json::Value;

use crate::error::{Error, Result};

use super::{Filters, RemoteStore, Table};

#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    tables: RwLock<HashMap<Table, Vec<Value>>>,
    failing_writes: RwLock<HashSet<Table>>,
    fail_reads: AtomicBool,
    writes: AtomicUsize,
}

fn poisoned() -> Error {
    Error::Remote("memory store lock poisoned".to_string())
}

fn column_equals(row: &Value, key: &str, value: &str) -> bool {
    match row.get(key) {
        Some(Value::String(s)) => s == value,
        Some(other @ (Value::Number(_) | Value::Bool(_))) => other.to_string() == value,
        _ => false,
    }
}

fn matches_all(row: &Value, filters: &Filters<'_>) -> bool {
    filters
        .iter()
        .all(|(key, value)| column_equals(row, key, value))
}

/// All columns of `conflict_key` agree between the two rows.
fn same_key(existing: &Value, incoming: &Value, conflict_key: &str) -> bool {
    conflict_key
        .split(',')
        .map(str::trim)
        .all(|column| match (existing.get(column), incoming.get(column)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        })
}

fn merge_into(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (field, value) in patch {
            target.insert(field.clone(), value.clone());
        }
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every later write to `table` fails until [`Self::clear_failures`].
    pub fn fail_writes_to(&self, table: Table) {
        if let Ok(mut failing) = self.failing_writes.write() {
            failing.insert(table);
        }
    }

    /// Every later read fails.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing_writes.write() {
            failing.clear();
        }
        self.fail_reads.store(false, Ordering::SeqCst);
    }

    /// Snapshot of a table.
    pub fn rows(&self, table: Table) -> Vec<Value> {
        self.tables
            .read()
            .map(|tables| tables.get(&table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Put rows in place without counting a write.
    pub fn seed(&self, table: Table, rows: Vec<Value>) {
        if let Ok(mut tables) = self.tables.write() {
            tables.entry(table).or_default().extend(rows);
        }
    }

    /// Number of successful write calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_write(&self, table: Table) -> Result<()> {
        let failing = self.failing_writes.read().map_err(|_| poisoned())?;
        if failing.contains(&table) {
            return Err(Error::Remote(format!("write to {} rejected", table)));
        }
        Ok(())
    }
}

impl RemoteStore for MemoryRemoteStore {
    fn select_where(&self, table: Table, filters: &Filters<'_>) -> Result<Vec<Value>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Remote(format!("read from {} failed", table)));
        }
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(row, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn upsert(&self, table: Table, rows: &[Value], conflict_key: &str) -> Result<()> {
        self.check_write(table)?;
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let stored = tables.entry(table).or_default();

        for row in rows {
            match stored.iter_mut().find(|existing| same_key(existing, row, conflict_key)) {
                Some(existing) => merge_into(existing, row),
                None => stored.push(row.clone()),
            }
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn update_where(&self, table: Table, filters: &Filters<'_>, patch: &Value) -> Result<()> {
        self.check_write(table)?;
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        if let Some(rows) = tables.get_mut(&table) {
            rows.iter_mut()
                .filter(|row| matches_all(row, filters))
                .for_each(|row| merge_into(row, patch));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn insert(&self, table: Table, row: &Value) -> Result<()> {
        self.check_write(table)?;
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        tables.entry(table).or_default().push(row.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upsert_by_id_is_idempotent() {
        let store = MemoryRemoteStore::new();
        let rows = vec![json!({"id": "a", "user_id": "u1", "note": "first"})];

        store.upsert(Table::ShipNotes, &rows, "id").unwrap();
        store.upsert(Table::ShipNotes, &rows, "id").unwrap();
        assert_eq!(store.rows(Table::ShipNotes).len(), 1);

        store
            .upsert(
                Table::ShipNotes,
                &[json!({"id": "a", "note": "edited"})],
                "id",
            )
            .unwrap();
        let stored = store.rows(Table::ShipNotes);
        assert_eq!(stored[0]["note"], json!("edited"));
        assert_eq!(stored[0]["user_id"], json!("u1"));
    }

    #[test]
    fn test_composite_conflict_key() {
        let store = MemoryRemoteStore::new();
        let row = |app: &str| json!({"user_id": "u1", "app": app, "login_cnt": 1});

        store.upsert(Table::UserTracking, &[row("focus")], "user_id,app").unwrap();
        store.upsert(Table::UserTracking, &[row("focus")], "user_id,app").unwrap();
        store.upsert(Table::UserTracking, &[row("other")], "user_id,app").unwrap();
        assert_eq!(store.rows(Table::UserTracking).len(), 2);
    }

    #[test]
    fn test_select_and_update_by_key() {
        let store = MemoryRemoteStore::new();
        store.seed(
            Table::Subscriptions,
            vec![
                json!({"user_id": "u1", "status": "active"}),
                json!({"user_id": "u2", "status": "active"}),
            ],
        );

        store
            .update_by_key(Table::Subscriptions, "user_id", "u1", &json!({"status": "canceled"}))
            .unwrap();

        let u1 = store.select_by_user(Table::Subscriptions, "u1").unwrap();
        assert_eq!(u1.len(), 1);
        assert_eq!(u1[0]["status"], json!("canceled"));
        let u2 = store.select_by_key(Table::Subscriptions, "user_id", "u2").unwrap();
        assert_eq!(u2[0]["status"], json!("active"));
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn test_failure_injection() {
        let store = MemoryRemoteStore::new();
        store.fail_writes_to(Table::MeetingBlocks);

        assert!(store.upsert(Table::MeetingBlocks, &[json!({"id": "m"})], "id").is_err());
        assert!(store.upsert(Table::ShipNotes, &[json!({"id": "n"})], "id").is_ok());

        store.set_fail_reads(true);
        assert!(store.select_by_user(Table::ShipNotes, "u1").is_err());

        store.clear_failures();
        assert!(store.upsert(Table::MeetingBlocks, &[json!({"id": "m"})], "id").is_ok());
        assert!(store.select_by_user(Table::ShipNotes, "u1").is_ok());
    }
}
