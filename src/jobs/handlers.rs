//! Job types that ship with folio.

pub mod edit_chunk;
pub mod review_chunk;
pub mod write_chunk;

use crate::{
    generation::GenerationError,
    jobs::{job_registry::RegistryError, JobContext, JobFault, JobRegistry, Outcome},
};

pub use edit_chunk::EditChunk;
pub use review_chunk::ReviewChunk;
pub use write_chunk::WriteChunk;

pub fn register_builtin_handlers(registry: &mut JobRegistry) -> Result<(), RegistryError> {
    registry.register(write_chunk::JOB_TYPE, WriteChunk)?;
    registry.register(edit_chunk::JOB_TYPE, EditChunk)?;
    registry.register(review_chunk::JOB_TYPE, ReviewChunk)?;
    Ok(())
}

/// A registry holding only the built-in handlers.
pub fn builtin_registry() -> Result<JobRegistry, RegistryError> {
    let mut registry = JobRegistry::new();
    register_builtin_handlers(&mut registry)?;
    Ok(registry)
}

/// Backend trouble is an expected failure. A misconfigured backend is a fault.
fn generation_failed(context: &JobContext, error: GenerationError) -> Result<Outcome, JobFault> {
    if error.is_programming_error() {
        return Err(error.into());
    }

    let message = format!("Generation failed: {error}");
    context.warn(message.clone());
    Ok(Outcome::Failure(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_every_builtin_job_type() {
        let registry = builtin_registry().unwrap();

        let mut job_types: Vec<_> = registry.job_types().collect();
        job_types.sort_unstable();
        assert_eq!(job_types, ["edit_chunk", "review_chunk", "write_chunk"]);
    }

    #[test]
    fn builtins_register_only_once() {
        let mut registry = builtin_registry().unwrap();

        assert_eq!(
            register_builtin_handlers(&mut registry),
            Err(RegistryError::DuplicateRegistration(
                write_chunk::JOB_TYPE.to_string()
            ))
        );
    }
}
