//! Pipeline error types

use thiserror::Error;

/// A compensating step that failed while unwinding a pipeline
#[derive(Debug)]
pub struct RollbackFailure<E> {
    pub action: String,
    pub error: E,
}

/// Pipeline errors
///
/// Compensation failures never replace the error that triggered the
/// rollback; they ride along in `rollback_failures`.
#[derive(Error, Debug)]
pub enum PipelineError<E: std::error::Error + 'static> {
    #[error("no actions to execute")]
    Empty,

    #[error("{action}: not enough parameters ({got} given, {required} required)")]
    TooFewParams {
        action: String,
        required: usize,
        got: usize,
        rollback_failures: Vec<RollbackFailure<E>>,
    },

    #[error("{action}: {source}")]
    Forward {
        action: String,
        #[source]
        source: E,
        rollback_failures: Vec<RollbackFailure<E>>,
    },
}

impl<E: std::error::Error + 'static> PipelineError<E> {
    /// Name of the action that stopped the pipeline
    pub fn action(&self) -> Option<&str> {
        match self {
            PipelineError::Empty => None,
            PipelineError::TooFewParams { action, .. } | PipelineError::Forward { action, .. } => {
                Some(action)
            }
        }
    }

    /// The step error, when a forward step failed
    pub fn forward_error(&self) -> Option<&E> {
        match self {
            PipelineError::Forward { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn rollback_failures(&self) -> &[RollbackFailure<E>] {
        match self {
            PipelineError::Empty => &[],
            PipelineError::TooFewParams {
                rollback_failures, ..
            }
            | PipelineError::Forward {
                rollback_failures, ..
            } => rollback_failures,
        }
    }
}
