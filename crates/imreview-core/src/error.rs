//! Error types for imreview-core

use thiserror::Error;

/// Result type alias for imreview operations
pub type Result<T> = std::result::Result<T, ReviewError>;

/// Main error type for imreview operations
#[derive(Error, Debug)]
pub enum ReviewError {
    /// No principal could be resolved for the request
    #[error("Unauthenticated")]
    Unauthenticated,

    /// The authorization gate denied the action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Manuscript, review, or user does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed or out-of-range input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Duplicate review, deleted published manuscript, lock timeout, ...
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Manuscript lifecycle errors
    #[error("Manuscript error: {0}")]
    Manuscript(#[from] ManuscriptError),

    /// Reviewer assignment errors
    #[error("Assignment error: {0}")]
    Assignment(#[from] AssignmentError),

    /// Persistence-related errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Coarse classification used at the request boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    Validation,
    Conflict,
    InvalidTransition,
    InvalidRole,
    SelfAssignment,
    Storage,
}

impl ReviewError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReviewError::Unauthenticated => ErrorKind::Unauthenticated,
            ReviewError::Forbidden(_) => ErrorKind::Forbidden,
            ReviewError::NotFound(_) => ErrorKind::NotFound,
            ReviewError::Validation(_) => ErrorKind::Validation,
            ReviewError::Conflict(_) => ErrorKind::Conflict,
            ReviewError::Manuscript(ManuscriptError::InvalidTransition { .. }) => {
                ErrorKind::InvalidTransition
            }
            ReviewError::Manuscript(_) => ErrorKind::Conflict,
            ReviewError::Assignment(AssignmentError::InvalidRole { .. }) => ErrorKind::InvalidRole,
            ReviewError::Assignment(AssignmentError::SelfAssignment(_)) => {
                ErrorKind::SelfAssignment
            }
            ReviewError::Assignment(AssignmentError::AlreadyAssigned { .. }) => ErrorKind::Conflict,
            ReviewError::Persistence(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn forbidden(action: impl std::fmt::Display) -> Self {
        ReviewError::Forbidden(format!("not permitted to {}", action))
    }
}

/// Manuscript lifecycle errors
#[derive(Error, Debug)]
pub enum ManuscriptError {
    /// Target status is not reachable from the current one
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Published manuscripts cannot be deleted
    #[error("Manuscript {0} is published and cannot be deleted")]
    Published(String),

    /// Reviews cannot be created or changed in the current status
    #[error("Manuscript {id} is not open for review in status {status}")]
    NotOpenForReview { id: String, status: String },
}

/// Reviewer assignment errors
#[derive(Error, Debug)]
pub enum AssignmentError {
    /// Target user does not hold the reviewer role
    #[error("User {user} has role {role}, expected reviewer")]
    InvalidRole { user: String, role: String },

    /// A reviewer cannot review their own manuscript
    #[error("User {0} is the author of the manuscript and cannot review it")]
    SelfAssignment(String),

    /// An assignment or review already exists for this pair
    #[error("Reviewer {reviewer} is already assigned to manuscript {manuscript}")]
    AlreadyAssigned { manuscript: String, reviewer: String },
}

/// Persistence-specific errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Storage support compiled out
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        PersistenceError::Database(err.to_string())
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for ReviewError {
    fn from(err: rusqlite::Error) -> Self {
        ReviewError::Persistence(PersistenceError::Database(err.to_string()))
    }
}

impl From<serde_json::Error> for ReviewError {
    fn from(err: serde_json::Error) -> Self {
        ReviewError::Persistence(PersistenceError::Serialization(err.to_string()))
    }
}
