//! # focusshield-core
//!
//! Core library for FocusShield - focus sessions for developers and a weekly
//! view of how fragmented their time was.
//!
//! This library provides:
//! - Domain types for focus sessions, ship notes and meeting blocks
//! - The local document store and remote reconciliation
//! - Weekly fragmentation reports and plan gating
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Every record is written to the local document first. When a user is
//! signed in, unsynced records are pushed to the remote store and reads merge
//! both sides, with remote rows taking precedence on id collisions.
//!
//! ## Example
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use focusshield_core::{LocalStore, Tracker};
//!
//! let store = LocalStore::open_default();
//! let tracker = Tracker::new(&store);
//! let session = tracker
//!     .start_session("Write the parser", 25 * 60, None, Utc::now())
//!     .expect("valid title");
//! tracker
//!     .finish_session(&session.id, false, Utc::now())
//!     .expect("session exists");
//! ```

// Re-export commonly used items at the crate root
pub use auth::{AuthProvider, AuthSession};
pub use config::Config;
pub use entitlement::Plan;
pub use error::{Error, Result, ValidationError};
pub use reconcile::{HistoryFilter, Reconciler, SyncOutcome};
pub use report::WeeklyReport;
pub use store::{FileStorage, LocalStore, MemoryStorage, StorageBackend};
pub use timer::{FocusTimer, TimerEvent, TimerState, TimerStatus};
pub use tracker::Tracker;
pub use types::*;

// Public modules
pub mod auth;
pub mod billing;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod format;
pub mod logging;
pub mod reconcile;
pub mod remote;
pub mod report;
pub mod store;
pub mod time;
pub mod timer;
pub mod tracker;
pub mod types;
