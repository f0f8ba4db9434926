//! `SeaORM` Entity for background jobs

use sea_orm::entity::prelude::*;
use serde::Serialize;

use crate::database::models::job_state::JobState;
use crate::jobs::job_target::JobTarget;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "job")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub book_id: Uuid,
    pub chunk_id: Option<Uuid>,
    pub job_type: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub parameters: Json,
    pub state: JobState,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub result: Option<Json>,
    pub error_message: Option<String>,
    pub created_at: DateTime,
    pub started_at: Option<DateTime>,
    pub completed_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::job_log::Entity")]
    JobLog,
}

impl Related<super::job_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::JobLog.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// The book, and optionally the chunk, this job operates on.
    pub const fn target(&self) -> JobTarget {
        JobTarget {
            book_id: self.book_id,
            chunk_id: self.chunk_id,
        }
    }

    /// Checks the timestamp invariants tied to the job's state.
    ///
    /// `started_at` is set exactly when the job has been running at some point (every state
    /// except `waiting` and `cancelled`), and `completed_at` exactly when the state is terminal.
    #[must_use]
    pub fn has_consistent_timestamps(&self) -> bool {
        let has_run = !matches!(self.state, JobState::Waiting | JobState::Cancelled);
        self.started_at.is_some() == has_run
            && self.completed_at.is_some() == self.state.is_terminal()
    }
}
