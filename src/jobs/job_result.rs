use std::fmt::{self, Display, Formatter};

use crate::database::models::job_state::JobState;
use crate::jobs::{JobFault, Outcome};

/// How one execution attempt ended, as seen by the processor.
#[derive(Debug)]
pub enum JobResult {
    Completed(serde_json::Value),
    Failed(String),
    Errored(JobFault),
}

impl JobResult {
    /// Terminal state the job moves to.
    pub const fn state(&self) -> JobState {
        match self {
            Self::Completed(_) => JobState::Completed,
            Self::Failed(_) => JobState::Failed,
            Self::Errored(_) => JobState::Error,
        }
    }

    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Completed(_) => None,
            Self::Failed(message) => Some(message.clone()),
            Self::Errored(fault) => Some(fault.to_string()),
        }
    }

    pub const fn result(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Failed(_) | Self::Errored(_) => None,
        }
    }
}

impl From<Result<Outcome, JobFault>> for JobResult {
    fn from(execution: Result<Outcome, JobFault>) -> Self {
        match execution {
            Ok(Outcome::Success(result)) => Self::Completed(result),
            Ok(Outcome::Failure(message)) => Self::Failed(message),
            Err(fault) => Self::Errored(fault),
        }
    }
}

impl Display for JobResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(_) => write!(f, "completed"),
            Self::Failed(message) => write!(f, "failed: {message}"),
            Self::Errored(fault) => write!(f, "error: {fault}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_map_to_terminal_states() {
        let completed = JobResult::from(Ok(Outcome::Success(serde_json::json!({ "ok": true }))));
        assert_eq!(completed.state(), JobState::Completed);
        assert!(completed.result().is_some());
        assert_eq!(completed.error_message(), None);

        let failed = JobResult::from(Ok(Outcome::failure("bad input")));
        assert_eq!(failed.state(), JobState::Failed);
        assert_eq!(failed.error_message().as_deref(), Some("bad input"));

        let errored = JobResult::from(Err(JobFault::Internal("boom".to_string())));
        assert_eq!(errored.state(), JobState::Error);
        assert_eq!(errored.error_message().as_deref(), Some("boom"));
        assert!(errored.result().is_none());
    }
}
