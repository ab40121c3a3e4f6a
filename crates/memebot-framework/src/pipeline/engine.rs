use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::retry::RetryPolicy;
use super::stage::Stage;
use crate::error::{PipelineError, StageError};

/// How a stage ended when it did not produce an output.
enum StageFailure {
    Exhausted { attempts: u32, error: StageError },
    Cancelled,
}

/// Ordered list of stages sharing one carrier type.
pub struct Pipeline<T> {
    name: String,
    stages: Vec<Box<dyn Stage<T>>>,
    default_policy: RetryPolicy,
}

impl<T> Pipeline<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            default_policy: RetryPolicy::default(),
        }
    }

    /// Policy for stages that do not declare their own.
    pub fn with_default_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Appends a stage.
    pub fn stage<S>(mut self, stage: S) -> Self
    where
        S: Stage<T> + 'static,
    {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs every stage in order, starting from `input`.
    ///
    /// `cancel` is checked before each stage and while waiting between
    /// attempts. An in-flight stage call is never interrupted.
    pub async fn run(&self, input: T, cancel: &CancellationToken) -> Result<T, PipelineError> {
        // Outputs of succeeded stages, kept for compensation.
        let mut completed: Vec<(usize, T)> = Vec::with_capacity(self.stages.len());
        let mut current = input;

        for (index, stage) in self.stages.iter().enumerate() {
            if cancel.is_cancelled() {
                self.compensate(&completed).await;
                return Err(PipelineError::Cancelled {
                    stage: stage.name().to_string(),
                    completed: index,
                });
            }

            let policy = stage.retry_policy().unwrap_or(self.default_policy);
            match self.run_stage(stage.as_ref(), &current, policy, cancel).await {
                Ok(output) => {
                    completed.push((index, output.clone()));
                    current = output;
                }
                Err(StageFailure::Exhausted { attempts, error }) if stage.best_effort() => {
                    warn!(
                        pipeline = %self.name,
                        stage = stage.name(),
                        attempts,
                        error = %error,
                        "Best-effort stage failed, continuing"
                    );
                }
                Err(StageFailure::Exhausted { attempts, error }) => {
                    warn!(
                        pipeline = %self.name,
                        stage = stage.name(),
                        attempts,
                        error = %error,
                        "Stage failed, compensating completed stages"
                    );
                    self.compensate(&completed).await;
                    return Err(PipelineError::StageFailed {
                        stage: stage.name().to_string(),
                        attempts,
                        source: error,
                    });
                }
                Err(StageFailure::Cancelled) => {
                    self.compensate(&completed).await;
                    return Err(PipelineError::Cancelled {
                        stage: stage.name().to_string(),
                        completed: index,
                    });
                }
            }
        }

        debug!(pipeline = %self.name, stages = self.stages.len(), "Pipeline completed");
        Ok(current)
    }

    async fn run_stage(
        &self,
        stage: &dyn Stage<T>,
        input: &T,
        policy: RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<T, StageFailure> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match stage.execute(input).await {
                Ok(output) => {
                    debug!(pipeline = %self.name, stage = stage.name(), attempt, "Stage succeeded");
                    return Ok(output);
                }
                Err(error) => error,
            };

            if !error.is_transient() || attempt >= max_attempts {
                return Err(StageFailure::Exhausted {
                    attempts: attempt,
                    error,
                });
            }

            let delay = policy.delay_after(attempt);
            info!(
                pipeline = %self.name,
                stage = stage.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient stage failure, retrying"
            );
            if !wait(delay, cancel).await {
                return Err(StageFailure::Cancelled);
            }
        }
    }

    /// Compensates succeeded stages in reverse order.
    ///
    /// A failing compensation is logged and does not stop the others.
    async fn compensate(&self, completed: &[(usize, T)]) {
        for (index, output) in completed.iter().rev() {
            let stage = &self.stages[*index];
            match stage.compensate(output).await {
                Ok(()) => debug!(pipeline = %self.name, stage = stage.name(), "Compensated"),
                Err(e) => warn!(
                    pipeline = %self.name,
                    stage = stage.name(),
                    error = %e,
                    "Compensation failed"
                ),
            }
        }
    }
}

/// Sleeps for `delay`, returning `false` if cancelled first.
async fn wait(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("default_policy", &self.default_policy)
            .finish()
    }
}
