//! Provisioner error types

use fleetstack_core::ErrorKind;
use thiserror::Error;

/// Provisioner errors
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("App already provisioned: {0}")]
    AlreadyProvisioned(String),

    #[error("App is not provisioned: {0}")]
    NotProvisioned(String),

    #[error("Cannot add 0 units.")]
    ZeroUnits,

    #[error("Unit not found: {0}")]
    UnitNotFound(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Command execution failed: {0}")]
    Command(String),

    #[error("{0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProvisionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProvisionError::AlreadyProvisioned(_) => ErrorKind::Conflict,
            ProvisionError::NotProvisioned(_) | ProvisionError::UnitNotFound(_) => {
                ErrorKind::NotFound
            }
            ProvisionError::ZeroUnits => ErrorKind::Validation,
            ProvisionError::Timeout(_) => ErrorKind::Timeout,
            ProvisionError::Command(_)
            | ProvisionError::Backend(_)
            | ProvisionError::Io(_)
            | ProvisionError::Json(_) => ErrorKind::Remote,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
