//! Evaluation pipeline: retries, bounded fan-out, per-case units and the
//! run driver.

pub mod pool;
pub(crate) mod prompt;
pub mod retry;
pub mod runner;
pub mod unit;

pub use pool::{BoundedTaskRunner, Completed, TaskError};
pub use retry::{retry_call, RetryPolicy, Retryable};
pub use runner::{EvaluationRunner, ExperimentOutcome, RunOutcome};
pub use unit::{EvaluationUnit, PipelineSettings};
