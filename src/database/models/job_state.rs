use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle state of a background job.
///
/// # State Transitions
///
/// - `Waiting` → `Running` (lock acquired, picked up by the processor)
/// - `Waiting` → `Cancelled` (external cancel request)
/// - `Running` → `Completed` | `Failed` | `Error`
///
/// Nothing ever re-enters `Waiting` or leaves a terminal state. Retrying a job means creating a
/// new job record.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    DeriveActiveEnum,
    EnumIter,
    Serialize,
    Deserialize,
    EnumString,
    Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    /// Created and eligible for pickup on the next poll cycle.
    #[sea_orm(string_value = "waiting")]
    #[default]
    Waiting,

    /// Claimed by the processor; its target entity is locked.
    ///
    /// The transition is committed before the handler runs, so a crash mid-execution leaves
    /// a queryable `running` record that startup recovery closes out.
    #[sea_orm(string_value = "running")]
    Running,

    /// The handler returned a successful outcome. `result` is populated.
    #[sea_orm(string_value = "completed")]
    Completed,

    /// The handler reported an expected, domain-level failure.
    #[sea_orm(string_value = "failed")]
    Failed,

    /// The handler faulted, panicked or timed out. Needs an operator's attention.
    #[sea_orm(string_value = "error")]
    Error,

    /// Cancelled while still waiting. Never held a lock.
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl JobState {
    pub const TERMINAL: [Self; 4] = [Self::Completed, Self::Failed, Self::Error, Self::Cancelled];

    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Error | Self::Cancelled
        )
    }

    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub const fn is_waiting(&self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Whether a caller may ask for this job to be re-run as a fresh record.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed | Self::Error)
    }
}
