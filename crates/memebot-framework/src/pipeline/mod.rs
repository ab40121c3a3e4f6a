//! Ordered multi-stage execution with retry and compensation.
//!
//! A [`Pipeline`] runs its stages strictly in order, each consuming the
//! previous stage's output. A failing stage is retried with capped exponential
//! backoff while its error is transient. When a stage fails for good, every
//! stage that already succeeded is compensated in reverse order before the run
//! reports which stage failed.
//!
//! ```rust,ignore
//! let pipeline = Pipeline::new("dongzhuo")
//!     .with_default_policy(RetryPolicy::new(3, base, cap))
//!     .stage(UploadStage::new(store.clone()))
//!     .stage(GenerateStage::new(generator))
//!     .stage(ComposeStage::new(template))
//!     .stage(CleanupStage::new(store));
//!
//! let job = pipeline.run(job, ctx.cancellation()).await?;
//! ```

mod engine;
mod retry;
mod stage;

pub use engine::Pipeline;
pub use retry::RetryPolicy;
pub use stage::{FnStage, Stage};
