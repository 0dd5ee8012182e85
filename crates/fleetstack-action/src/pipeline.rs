//! Pipeline executor

use crate::error::{PipelineError, RollbackFailure};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Input of a forward step
pub struct ForwardContext<'a, P, R> {
    /// The full argument list the pipeline was started with
    pub params: &'a [P],
    /// Result of the preceding action (`None` for the first one)
    pub previous: Option<&'a R>,
}

/// Input of a compensating step
pub struct BackwardContext<'a, P, R> {
    pub params: &'a [P],
    /// The result this action's own forward step produced
    pub result: &'a R,
}

/// One step of a pipeline
#[async_trait]
pub trait Action<P, R, E>: Send + Sync
where
    P: Send + Sync,
    R: Send + Sync,
    E: Send,
{
    /// Step name used in logs and errors
    fn name(&self) -> &str;

    /// Minimum number of parameters the step needs
    fn min_params(&self) -> usize {
        0
    }

    async fn forward(&self, ctx: ForwardContext<'_, P, R>) -> Result<R, E>;

    /// Undo the effects of a successful `forward`. Steps with nothing to
    /// undo keep the default.
    async fn backward(&self, ctx: BackwardContext<'_, P, R>) -> Result<(), E> {
        let _ = ctx;
        Ok(())
    }
}

/// Callback invoked with the action name and error of every failed
/// compensation
pub type Observer<E> = Box<dyn Fn(&str, &E) + Send + Sync>;

/// Ordered list of actions executed as one unit
pub struct Pipeline<P, R, E> {
    actions: Vec<Box<dyn Action<P, R, E>>>,
    observer: Option<Observer<E>>,
}

impl<P, R, E> Pipeline<P, R, E>
where
    P: Send + Sync,
    R: Send + Sync,
    E: std::error::Error + Send + 'static,
{
    pub fn new(actions: Vec<Box<dyn Action<P, R, E>>>) -> Self {
        Self {
            actions,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: impl Fn(&str, &E) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action in order and return the last action's result.
    pub async fn execute(&self, params: &[P]) -> Result<R, PipelineError<E>> {
        if self.actions.is_empty() {
            return Err(PipelineError::Empty);
        }

        let mut completed: Vec<(usize, R)> = Vec::with_capacity(self.actions.len());

        for (idx, action) in self.actions.iter().enumerate() {
            let required = action.min_params();
            if params.len() < required {
                warn!(
                    action = action.name(),
                    required,
                    got = params.len(),
                    "not enough parameters, rolling back"
                );
                let rollback_failures = self.rollback(params, &completed).await;
                return Err(PipelineError::TooFewParams {
                    action: action.name().to_string(),
                    required,
                    got: params.len(),
                    rollback_failures,
                });
            }

            debug!(action = action.name(), step = idx + 1, "forward");
            let ctx = ForwardContext {
                params,
                previous: completed.last().map(|(_, r)| r),
            };
            match action.forward(ctx).await {
                Ok(result) => completed.push((idx, result)),
                Err(source) => {
                    warn!(action = action.name(), error = %source, "forward failed, rolling back");
                    let rollback_failures = self.rollback(params, &completed).await;
                    return Err(PipelineError::Forward {
                        action: action.name().to_string(),
                        source,
                        rollback_failures,
                    });
                }
            }
        }

        info!(steps = completed.len(), "pipeline completed");
        completed
            .pop()
            .map(|(_, result)| result)
            .ok_or(PipelineError::Empty)
    }

    async fn rollback(&self, params: &[P], completed: &[(usize, R)]) -> Vec<RollbackFailure<E>> {
        let mut failures = Vec::new();
        for (idx, result) in completed.iter().rev() {
            let action = &self.actions[*idx];
            debug!(action = action.name(), "backward");
            let ctx = BackwardContext { params, result };
            if let Err(error) = action.backward(ctx).await {
                warn!(action = action.name(), error = %error, "compensation failed");
                if let Some(observer) = &self.observer {
                    observer(action.name(), &error);
                }
                failures.push(RollbackFailure {
                    action: action.name().to_string(),
                    error,
                });
            }
        }
        failures
    }
}
