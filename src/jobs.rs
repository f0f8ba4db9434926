//! Background job execution: handler contract, registry, entity locks and the processor.

pub mod chunk_effects;
pub mod handlers;
pub mod job_context;
pub mod job_log_sink;
pub mod job_registry;
pub mod job_result;
pub mod job_target;
pub mod lock_manager;
pub mod processor;

use std::{future::Future, time::Duration};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::{
    generation::GenerationError, jobs::job_registry::RegistryError,
    model_catalog::ModelSelectionError,
};

pub use job_context::JobContext;
pub use job_registry::JobRegistry;
pub use job_target::JobTarget;
pub use lock_manager::LockManager;
pub use processor::JobProcessor;

/// What a handler reports back after running to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The work is done. The value is stored as the job's `result`.
    Success(serde_json::Value),
    /// The job can't succeed for a domain reason, e.g. bad input. Not a bug.
    Failure(String),
}

impl Outcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }
}

/// An unexpected error during execution. Jobs ending in a fault are recorded as `error`.
#[derive(Debug, Error)]
pub enum JobFault {
    #[error("{0}")]
    Internal(String),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    ModelSelection(#[from] ModelSelectionError),
    #[error("Failed to serialize job result: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Handler panicked: {0}")]
    Panicked(String),
    #[error("Job timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
    #[error("Job was interrupted by a processor restart")]
    Interrupted,
    #[error("Failed to commit job output: {0}")]
    Commit(String),
}

/// Executable logic for one job type.
///
/// Handlers never touch persistence. They read the target snapshot from the context, log
/// through it, stage chunk writes on it, and return an [`Outcome`]. The processor commits
/// everything at once when the job finishes.
pub trait JobHandler: Send + Sync + 'static {
    type Parameters: DeserializeOwned + Send;

    fn execute(
        &self,
        context: &JobContext,
        parameters: Self::Parameters,
    ) -> impl Future<Output = Result<Outcome, JobFault>> + Send;
}
