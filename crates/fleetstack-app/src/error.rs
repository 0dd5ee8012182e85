//! Application error types

use crate::cloud::CloudError;
use fleetstack_action::PipelineError;
use fleetstack_core::{ErrorKind, StoreError};
use fleetstack_provision::ProvisionError;
use fleetstack_queue::QueueError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// A pipeline step got the wrong parameter or previous result
    #[error("{0}")]
    InvalidParam(&'static str),

    #[error("Unit not found: {0}")]
    UnitNotFound(String),

    #[error("Repository server returned {status}: {body}")]
    Repository { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    /// The creation pipeline failed and was rolled back
    #[error(transparent)]
    Create(Box<PipelineError<AppError>>),
}

impl From<PipelineError<AppError>> for AppError {
    fn from(err: PipelineError<AppError>) -> Self {
        AppError::Create(Box::new(err))
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidParam(_) => ErrorKind::Validation,
            AppError::UnitNotFound(_) => ErrorKind::NotFound,
            AppError::Repository { .. } | AppError::Http(_) => ErrorKind::Remote,
            AppError::Store(e) => e.kind(),
            AppError::Provision(e) => e.kind(),
            AppError::Queue(e) => e.kind(),
            AppError::Cloud(e) => e.kind(),
            AppError::Create(e) => match e.as_ref() {
                PipelineError::Forward { source, .. } => source.kind(),
                PipelineError::Empty | PipelineError::TooFewParams { .. } => ErrorKind::Validation,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
