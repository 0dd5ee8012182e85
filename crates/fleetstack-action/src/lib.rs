//! Action pipeline executor
//!
//! A pipeline is an ordered list of [`Action`]s. Each action has a forward
//! step and an optional compensating backward step. The result of action
//! *i* is handed to action *i+1* as `previous`; when any forward step fails,
//! the already-completed actions are compensated in reverse order.
//!
//! The executor is generic over the parameter type `P` (usually a tagged
//! enum per pipeline), the result type `R` and the step error type `E`.

mod error;
mod pipeline;

pub use error::{PipelineError, RollbackFailure};
pub use pipeline::{Action, BackwardContext, ForwardContext, Observer, Pipeline};
