//! Error types for focusshield-core

use thiserror::Error;

/// Main error type for the focusshield-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// User input rejected before any mutation
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// Remote record store error
    #[error("remote store error: {0}")]
    Remote(String),

    /// Push-sync failed; local records are still unsynced and safe to retry
    #[error("sync failed: {0}")]
    Sync(String),

    /// Focus timer state error
    #[error("timer error: {0}")]
    Timer(String),

    /// Record not found
    #[error("not found: {0}")]
    NotFound(String),
}

/// Reasons a user action is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("please enter a task title")]
    EmptyTaskTitle,

    #[error("ship note must be at least {min} characters (got {len})")]
    ShipNoteTooShort { min: usize, len: usize },

    #[error("session {0} already has a ship note")]
    DuplicateShipNote(String),

    #[error("end time must be after start time")]
    MeetingEndBeforeStart,

    #[error("session not found: {0}")]
    SessionNotFound(String),
}

/// Result type alias for focusshield-core
pub type Result<T> = std::result::Result<T, Error>;
