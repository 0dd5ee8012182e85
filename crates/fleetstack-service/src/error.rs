//! Binding error types

use fleetstack_core::{ErrorKind, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BindError {
    #[error("This app does not have an IP yet.")]
    NoAddress,

    #[error("This app is already binded to this service instance.")]
    AlreadyBound,

    #[error("This app is not binded to this service instance.")]
    NotBound,

    #[error("Service {service} has no endpoint for environment {environment}")]
    EndpointNotFound { service: String, environment: String },

    #[error("Service endpoint returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("Service endpoint returned an unreadable bind response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BindError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BindError::NoAddress => ErrorKind::Validation,
            BindError::AlreadyBound => ErrorKind::Conflict,
            BindError::NotBound | BindError::EndpointNotFound { .. } => ErrorKind::NotFound,
            BindError::Remote { .. } | BindError::InvalidResponse(_) | BindError::Http(_) => {
                ErrorKind::Remote
            }
            BindError::Store(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BindError>;
