//! Remote record store
//!
//! The remote store is the account-side copy of a user's records. The core
//! only needs a handful of row operations from it, expressed by
//! [`RemoteStore`] over JSON rows:
//!
//! - `select_where` (and `select_by_user` / `select_by_key`): filtered reads
//! - `upsert`: insert-or-update keyed by a conflict column
//! - `update_where` / `update_by_key`: patch matching rows
//! - `insert`: plain insert
//!
//! Two implementations ship with the crate: [`RestRemoteStore`] talks to a
//! PostgREST-style HTTP endpoint, [`MemoryRemoteStore`] keeps rows in memory.
//!
//! Enable the HTTP store in `~/.config/focusshield/config.toml`:
//!
//! ```toml
//! [remote]
//! url = "https://project.example.com"
//! anon_key = "public-anon-key"
//! ```

mod memory;
mod rest;

pub use memory::MemoryRemoteStore;
pub use rest::{RestClient, RestRemoteStore};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::{Record, RecordKind};

/// Remote tables known to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    FocusSessions,
    ShipNotes,
    MeetingBlocks,
    Subscriptions,
    UserTracking,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::FocusSessions => "focus_sessions",
            Table::ShipNotes => "ship_notes",
            Table::MeetingBlocks => "meeting_blocks",
            Table::Subscriptions => "subscriptions",
            Table::UserTracking => "user_tracking",
        }
    }

    /// Table holding records of `kind`.
    pub fn for_kind(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Sessions => Table::FocusSessions,
            RecordKind::ShipNotes => Table::ShipNotes,
            RecordKind::MeetingBlocks => Table::MeetingBlocks,
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column filters of a read or update; every pair must match (`column = value`).
pub type Filters<'a> = [(&'a str, &'a str)];

/// Row-level access to the remote store.
///
/// Calls block until the store answers. `conflict_key` may name several
/// columns separated by commas (e.g. `user_id,app`).
pub trait RemoteStore {
    fn select_where(&self, table: Table, filters: &Filters<'_>) -> Result<Vec<Value>>;

    fn upsert(&self, table: Table, rows: &[Value], conflict_key: &str) -> Result<()>;

    fn update_where(&self, table: Table, filters: &Filters<'_>, patch: &Value) -> Result<()>;

    fn insert(&self, table: Table, row: &Value) -> Result<()>;

    fn select_by_key(&self, table: Table, key: &str, value: &str) -> Result<Vec<Value>> {
        self.select_where(table, &[(key, value)])
    }

    /// Rows owned by `user_id`.
    fn select_by_user(&self, table: Table, user_id: &str) -> Result<Vec<Value>> {
        self.select_by_key(table, "user_id", user_id)
    }

    fn update_by_key(&self, table: Table, key: &str, value: &str, patch: &Value) -> Result<()> {
        self.update_where(table, &[(key, value)], patch)
    }
}

macro_rules! forward_remote_store {
    ($($ty:ty),*) => {$(
        impl<S: RemoteStore + ?Sized> RemoteStore for $ty {
            fn select_where(&self, table: Table, filters: &Filters<'_>) -> Result<Vec<Value>> {
                (**self).select_where(table, filters)
            }

            fn upsert(&self, table: Table, rows: &[Value], conflict_key: &str) -> Result<()> {
                (**self).upsert(table, rows, conflict_key)
            }

            fn update_where(&self, table: Table, filters: &Filters<'_>, patch: &Value) -> Result<()> {
                (**self).update_where(table, filters, patch)
            }

            fn insert(&self, table: Table, row: &Value) -> Result<()> {
                (**self).insert(table, row)
            }
        }
    )*};
}

forward_remote_store!(&S, Box<S>);

/// Wire row for a local record: `user_id` stamped, `synced` dropped.
pub fn to_remote_row<R: Record>(record: &R, user_id: &str) -> Result<Value> {
    let mut row = serde_json::to_value(record)?;
    let Some(fields) = row.as_object_mut() else {
        return Err(Error::Remote(format!(
            "{} record {} did not serialize to an object",
            R::KIND,
            record.id()
        )));
    };
    fields.remove("synced");
    fields.insert("user_id".to_string(), Value::String(user_id.to_string()));
    Ok(row)
}
