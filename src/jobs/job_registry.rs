use std::future::Future;
use std::pin::Pin;
use std::{collections::HashMap, sync::Arc};

use thiserror::Error;

use super::{JobContext, JobFault, JobHandler, Outcome};

/// Type alias for job executor function to reduce type complexity
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
type JobExecutor = Arc<
    dyn Fn(Arc<JobContext>, serde_json::Value) -> BoxFuture<'static, Result<Outcome, JobFault>>
        + Send
        + Sync,
>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("A handler is already registered for job type '{0}'")]
    DuplicateRegistration(String),
    #[error("No handler registered for job type '{0}'")]
    UnknownJobType(String),
}

/// A handler looked up by job type, ready to run.
#[derive(Clone)]
pub struct ResolvedHandler {
    job_type: String,
    executor: JobExecutor,
}

impl ResolvedHandler {
    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    /// Decodes the job's parameters and runs the handler.
    ///
    /// Parameters that don't match the handler's type are reported as a failure, not a fault:
    /// the job was created with bad input.
    pub fn execute(
        &self,
        context: Arc<JobContext>,
        parameters: serde_json::Value,
    ) -> BoxFuture<'static, Result<Outcome, JobFault>> {
        (self.executor)(context, parameters)
    }
}

/// Maps job type identifiers to handlers. Filled once at startup.
#[derive(Clone, Default)]
pub struct JobRegistry {
    handlers: HashMap<String, JobExecutor>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: JobHandler>(
        &mut self,
        job_type: impl Into<String>,
        handler: H,
    ) -> Result<(), RegistryError> {
        let job_type = job_type.into();
        if self.handlers.contains_key(&job_type) {
            return Err(RegistryError::DuplicateRegistration(job_type));
        }

        let handler = Arc::new(handler);
        let executor: JobExecutor = Arc::new(
            move |context: Arc<JobContext>,
                  parameters: serde_json::Value|
                  -> BoxFuture<'static, Result<Outcome, JobFault>> {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let parameters: H::Parameters = match serde_json::from_value(parameters) {
                        Ok(parameters) => parameters,
                        Err(e) => {
                            return Ok(Outcome::Failure(format!(
                                "Failed to parse job parameters: {e}"
                            )))
                        }
                    };
                    handler.execute(&context, parameters).await
                })
            },
        );
        self.handlers.insert(job_type, executor);

        Ok(())
    }

    pub fn resolve(&self, job_type: &str) -> Result<ResolvedHandler, RegistryError> {
        self.handlers
            .get(job_type)
            .map(|executor| ResolvedHandler {
                job_type: job_type.to_string(),
                executor: Arc::clone(executor),
            })
            .ok_or_else(|| RegistryError::UnknownJobType(job_type.to_string()))
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    pub fn job_types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}
