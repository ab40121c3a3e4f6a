use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::retry::RetryPolicy;
use crate::error::StageError;

/// One step of a [`Pipeline`](super::Pipeline).
///
/// `T` is the carrier value threaded through the whole pipeline; each stage
/// reads the previous output and returns the next one.
#[async_trait]
pub trait Stage<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    fn name(&self) -> &str;

    /// Attempt budget for this stage. `None` uses the pipeline default.
    fn retry_policy(&self) -> Option<RetryPolicy> {
        None
    }

    /// A best-effort stage that fails is logged and skipped; the run goes on
    /// with the stage's input.
    fn best_effort(&self) -> bool {
        false
    }

    async fn execute(&self, input: &T) -> Result<T, StageError>;

    /// Undoes the externally visible effect of a successful `execute`.
    ///
    /// Called at most once, with the output this stage produced, when a later
    /// stage fails or the run is cancelled.
    async fn compensate(&self, _output: &T) -> Result<(), StageError> {
        Ok(())
    }
}

type RunFn<T> = Box<dyn Fn(T) -> BoxFuture<'static, Result<T, StageError>> + Send + Sync>;
type CompensateFn<T> = Box<dyn Fn(T) -> BoxFuture<'static, Result<(), StageError>> + Send + Sync>;

/// A stage built from closures.
pub struct FnStage<T> {
    name: String,
    policy: Option<RetryPolicy>,
    best_effort: bool,
    run: RunFn<T>,
    compensate: Option<CompensateFn<T>>,
}

impl<T> FnStage<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, StageError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            policy: None,
            best_effort: false,
            run: Box::new(move |input| Box::pin(run(input))),
            compensate: None,
        }
    }

    pub fn with_compensation<F, Fut>(mut self, compensate: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), StageError>> + Send + 'static,
    {
        self.compensate = Some(Box::new(move |output| Box::pin(compensate(output))));
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Marks the stage best-effort.
    pub fn optional(mut self) -> Self {
        self.best_effort = true;
        self
    }
}

#[async_trait]
impl<T> Stage<T> for FnStage<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        self.policy
    }

    fn best_effort(&self) -> bool {
        self.best_effort
    }

    async fn execute(&self, input: &T) -> Result<T, StageError> {
        (self.run)(input.clone()).await
    }

    async fn compensate(&self, output: &T) -> Result<(), StageError> {
        match &self.compensate {
            Some(compensate) => compensate(output.clone()).await,
            None => Ok(()),
        }
    }
}
