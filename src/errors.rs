//! Typed error hierarchy for the studio service.
//!
//! `StudioError` is what the run orchestrator and the request handlers speak.
//! The persistence layer stays on `anyhow::Result` and is folded in through
//! `StudioError::Database` / `StudioError::Other`.

use thiserror::Error;

/// Errors from the studio API and run pipeline.
#[derive(Debug, Error)]
pub enum StudioError {
    /// Valid credential, but the resource belongs to someone else.
    #[error("{0}")]
    Forbidden(String),

    /// Referenced entity is absent or not owned by the caller.
    #[error("{0}")]
    NotFound(String),

    /// Invalid input or cross-entity linkage.
    #[error("{0}")]
    BadRequest(String),

    /// Duplicate unique key.
    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StudioError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Recover a `StudioError` raised inside a `DbHandle::call` closure;
    /// anything else is a database failure.
    pub fn from_db(err: anyhow::Error) -> Self {
        match err.downcast::<StudioError>() {
            Ok(studio) => studio,
            Err(other) => Self::Database(other),
        }
    }
}
