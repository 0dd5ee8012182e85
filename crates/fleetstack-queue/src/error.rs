//! Queue error types

use fleetstack_core::ErrorKind;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Timed out waiting for a message after {0:?}")]
    Timeout(Duration),

    #[error("Message not found: {0}")]
    NotFound(u64),
}

impl QueueError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueueError::Timeout(_) => ErrorKind::Timeout,
            QueueError::NotFound(_) => ErrorKind::NotFound,
        }
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
