//! Signed-in user
//!
//! Identity comes from an external provider; the core only needs the current
//! user's id and email. [`AuthSession`] keeps the user who signed in on this
//! machine in a small JSON file next to the local document.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::Config;
use crate::error::Result;
use crate::remote::{RemoteStore, Table};
use crate::types::AuthUser;

/// Application name recorded with each login.
pub const APP_SLUG: &str = "focusshield";

/// Source of the current user.
pub trait AuthProvider {
    fn current_user(&self) -> Option<AuthUser>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    user: AuthUser,
    signed_in_at: DateTime<Utc>,
}

/// File-backed session.
#[derive(Debug, Clone)]
pub struct AuthSession {
    path: PathBuf,
}

impl AuthSession {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Session file in the XDG data directory.
    pub fn open_default() -> Self {
        Self::new(Config::session_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Option<StoredSession> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read session");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring corrupt session file");
                None
            }
        }
    }

    /// When the current user signed in.
    pub fn signed_in_at(&self) -> Option<DateTime<Utc>> {
        self.read().map(|s| s.signed_in_at)
    }

    /// Store `user` as the current user.
    ///
    /// Returns true when this starts a new session, i.e. nobody or a
    /// different user was signed in before.
    pub fn sign_in(&self, user: &AuthUser, now: DateTime<Utc>) -> Result<bool> {
        let previous = self.read().map(|s| s.user.id);
        let is_new = previous.as_deref() != Some(user.id.as_str());

        let stored = StoredSession {
            user: user.clone(),
            signed_in_at: now,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&stored)?)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::info!(user_id = %user.id, is_new, "Signed in");
        Ok(is_new)
    }

    /// Forget the current user. Returns whether someone was signed in.
    pub fn sign_out(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!("Signed out");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl AuthProvider for AuthSession {
    fn current_user(&self) -> Option<AuthUser> {
        self.read().map(|s| s.user)
    }
}

/// Record a login in the shared tracking table.
///
/// Upserts one row per user and app. If the upsert is rejected, falls back
/// to incrementing an existing row or inserting a fresh one. Failures are
/// logged; returns whether the login was recorded.
pub fn track_login(remote: &dyn RemoteStore, user: &AuthUser, app: &str, now: DateTime<Utc>) -> bool {
    let row = json!({
        "user_id": user.id,
        "email": user.email,
        "app": app,
        "last_login_ts": now,
        "login_cnt": 1,
    });

    match remote.upsert(Table::UserTracking, &[row.clone()], "user_id,app") {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "Login upsert rejected, trying increment");
            match increment_login(remote, user, app, now, &row) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(user_id = %user.id, error = %e, "Failed to track user login");
                    false
                }
            }
        }
    }
}

fn increment_login(
    remote: &dyn RemoteStore,
    user: &AuthUser,
    app: &str,
    now: DateTime<Utc>,
    fresh_row: &serde_json::Value,
) -> Result<()> {
    let filters = [("user_id", user.id.as_str()), ("app", app)];
    let existing = remote.select_where(Table::UserTracking, &filters)?;

    match existing.first() {
        Some(row) => {
            let count = row.get("login_cnt").and_then(|c| c.as_i64()).unwrap_or(0);
            remote.update_where(
                Table::UserTracking,
                &filters,
                &json!({ "login_cnt": count + 1, "last_login_ts": now }),
            )
        }
        None => remote.insert(Table::UserTracking, fresh_row),
    }
}
