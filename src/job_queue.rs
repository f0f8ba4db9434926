use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::{
    database::models::{book, chunk, job, job_log, job_state::JobState},
    jobs::JobTarget,
};

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("Job {0} not found")]
    NotFound(Uuid),
    #[error("Job {id} is {state} and can no longer be cancelled")]
    NotCancellable { id: Uuid, state: JobState },
    #[error("Job {id} is {state}; only failed or errored jobs can be retried")]
    NotRetryable { id: Uuid, state: JobState },
    #[error("Target {0} does not exist")]
    TargetNotFound(JobTarget),
    #[error("Job parameters must be a JSON object")]
    InvalidParameters,
    #[error(transparent)]
    Database(#[from] DbErr),
}

/// A job to be added to the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub job_type: String,
    pub target: JobTarget,
    pub parameters: serde_json::Value,
}

impl NewJob {
    pub fn new(
        job_type: impl Into<String>,
        target: JobTarget,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            job_type: job_type.into(),
            target,
            parameters,
        }
    }
}

/// Narrows down [`JobQueue::list_jobs`]. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub state: Option<JobState>,
    pub job_type: Option<String>,
    pub book_id: Option<Uuid>,
    pub chunk_id: Option<Uuid>,
    pub limit: Option<u64>,
}

/// Creates, inspects and cancels jobs. Running them is the processor's business.
#[derive(Clone, Debug)]
pub struct JobQueue {
    db: DatabaseConnection,
}

impl JobQueue {
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Adds a job in the `waiting` state. The target must exist when the job is created.
    pub async fn create_job(&self, new_job: NewJob) -> Result<job::Model, JobQueueError> {
        if !new_job.parameters.is_object() {
            return Err(JobQueueError::InvalidParameters);
        }
        ensure_target_exists(&self.db, new_job.target).await?;

        let job = job::ActiveModel {
            id: Set(Uuid::now_v7()),
            book_id: Set(new_job.target.book_id),
            chunk_id: Set(new_job.target.chunk_id),
            job_type: Set(new_job.job_type),
            parameters: Set(new_job.parameters),
            state: Set(JobState::Waiting),
            result: Set(None),
            error_message: Set(None),
            created_at: Set(chrono::Utc::now().naive_utc()),
            started_at: Set(None),
            completed_at: Set(None),
        }
        .insert(&self.db)
        .await?;

        info!("📥 Queued {}({}) on {}", job.job_type, job.id, job.target());
        Ok(job)
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<job::Model, JobQueueError> {
        job::Entity::find_by_id(job_id)
            .one(&self.db)
            .await?
            .ok_or(JobQueueError::NotFound(job_id))
    }

    /// Jobs matching `filter`, newest first.
    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<job::Model>, JobQueueError> {
        let mut query = job::Entity::find();

        if let Some(state) = filter.state {
            query = query.filter(job::Column::State.eq(state));
        }
        if let Some(job_type) = &filter.job_type {
            query = query.filter(job::Column::JobType.eq(job_type.as_str()));
        }
        if let Some(book_id) = filter.book_id {
            query = query.filter(job::Column::BookId.eq(book_id));
        }
        if let Some(chunk_id) = filter.chunk_id {
            query = query.filter(job::Column::ChunkId.eq(chunk_id));
        }

        let jobs = query
            .order_by_desc(job::Column::CreatedAt)
            .order_by_desc(job::Column::Id)
            .limit(filter.limit)
            .all(&self.db)
            .await?;

        Ok(jobs)
    }

    /// Cancels a job that hasn't started yet.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<job::Model, JobQueueError> {
        let cancelled = job::Entity::update_many()
            .col_expr(job::Column::State, Expr::value(JobState::Cancelled))
            .col_expr(
                job::Column::CompletedAt,
                Expr::value(chrono::Utc::now().naive_utc()),
            )
            .filter(job::Column::Id.eq(job_id))
            .filter(job::Column::State.eq(JobState::Waiting))
            .exec(&self.db)
            .await?
            .rows_affected
            == 1;

        let job = self.get_job(job_id).await?;
        if !cancelled {
            return Err(JobQueueError::NotCancellable {
                id: job_id,
                state: job.state,
            });
        }

        info!("🚫 Cancelled {}({})", job.job_type, job.id);
        Ok(job)
    }

    /// Queues a fresh copy of a failed or errored job. The original record is left as it is.
    pub async fn retry_job(&self, job_id: Uuid) -> Result<job::Model, JobQueueError> {
        let original = self.get_job(job_id).await?;
        if !original.state.is_retryable() {
            return Err(JobQueueError::NotRetryable {
                id: job_id,
                state: original.state,
            });
        }

        let retry = self
            .create_job(NewJob::new(
                original.job_type.clone(),
                original.target(),
                original.parameters.clone(),
            ))
            .await?;

        info!("🔁 Job {} retried as {}", original.id, retry.id);
        Ok(retry)
    }

    /// Log entries of a job in the order they were written. Entries appear once the job has
    /// reached a terminal state.
    pub async fn job_logs(&self, job_id: Uuid) -> Result<Vec<job_log::Model>, JobQueueError> {
        let logs = job_log::Entity::find()
            .filter(job_log::Column::JobId.eq(job_id))
            .order_by_asc(job_log::Column::CreatedAt)
            .order_by_asc(job_log::Column::Id)
            .all(&self.db)
            .await?;

        if logs.is_empty() {
            // Tell "no logs yet" apart from "no such job"
            self.get_job(job_id).await?;
        }

        Ok(logs)
    }
}

async fn ensure_target_exists<C: ConnectionTrait>(
    conn: &C,
    target: JobTarget,
) -> Result<(), JobQueueError> {
    let exists = match target.chunk_id {
        Some(chunk_id) => {
            chunk::Entity::find_by_id(chunk_id)
                .filter(chunk::Column::BookId.eq(target.book_id))
                .count(conn)
                .await?
                > 0
        }
        None => book::Entity::find_by_id(target.book_id).count(conn).await? > 0,
    };

    if exists {
        Ok(())
    } else {
        Err(JobQueueError::TargetNotFound(target))
    }
}
