//! Error taxonomy and persistence errors

use thiserror::Error;

/// Coarse classification shared by every FleetStack error type.
///
/// Callers (an HTTP layer, the CLI) map these to response codes without
/// having to know every concrete error enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input or a missing precondition. Never retried.
    Validation,
    /// Duplicate app, already-bound app, already-provisioned app.
    Conflict,
    /// Transport failure or non-success status from a remote endpoint.
    Remote,
    /// A command exceeded its execution deadline.
    Timeout,
    /// The referenced record, unit or binding does not exist.
    NotFound,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::Remote => write!(f, "remote"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::NotFound => write!(f, "not-found"),
        }
    }
}

/// Persistence layer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("there is already a {collection} with this name: {name}")]
    Conflict { collection: &'static str, name: String },

    #[error("{collection} not found: {name}")]
    NotFound { collection: &'static str, name: String },

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Conflict { .. } => ErrorKind::Conflict,
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::Backend(_) => ErrorKind::Remote,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
