//! Polls for waiting jobs, runs them under their target's lock and records the outcome.
//!
//! A job is claimed in one transaction (lock acquired, `waiting` -> `running`) and finalized in
//! another (chunk writes, terminal state, buffered log entries, lock released). Between the two,
//! the handler runs on its own task so slow jobs never hold up polling.

use std::{
    any::Any,
    collections::HashSet,
    future::Future,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use futures_util::FutureExt as _;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use thiserror::Error;
use tokio::{
    sync::Mutex,
    task::JoinSet,
    time::{sleep, timeout},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    app::App,
    config::JobsConfig,
    database::models::{book, chunk, job, job_log, job_state::JobState, log_level::LogLevel},
    generation::Generator,
    jobs::{
        chunk_effects::{apply_effects, ChunkEffect, EffectError},
        job_log_sink::PendingLogEntry,
        job_result::JobResult,
        lock_manager::{LockAcquisition, LockHandle},
        JobContext, JobFault, JobRegistry, LockManager,
    },
    model_catalog::ModelCatalog,
};

/// What a single poll cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Jobs claimed and handed to a task.
    pub started: Vec<Uuid>,
    /// Jobs left waiting because their target (or a related entity) is locked.
    pub contended: Vec<Uuid>,
    /// Jobs whose book or chunk no longer exists. They end as `failed`.
    pub missing_target: Vec<Uuid>,
}

impl PollReport {
    pub fn is_idle(&self) -> bool {
        self.started.is_empty() && self.missing_target.is_empty()
    }
}

#[derive(Debug, Error)]
enum FinalizeError {
    #[error(transparent)]
    Effects(EffectError),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl From<EffectError> for FinalizeError {
    fn from(error: EffectError) -> Self {
        match error {
            EffectError::Database(e) => Self::Database(e),
            rejected @ (EffectError::ChunkMissing(_) | EffectError::NotLocked { .. }) => {
                Self::Effects(rejected)
            }
        }
    }
}

struct ClaimedJob {
    job: job::Model,
    lock: LockHandle,
    book: book::Model,
    chunk: Option<chunk::Model>,
}

enum Claim {
    Started(ClaimedJob),
    Contended,
    TargetMissing(job::Model),
    /// Someone else moved the job out of `waiting` since it was listed.
    Gone,
}

struct ProcessorInner {
    db: DatabaseConnection,
    registry: JobRegistry,
    lock_manager: LockManager,
    generator: Generator,
    model_catalog: Arc<ModelCatalog>,
    config: JobsConfig,
}

pub struct JobProcessor {
    inner: Arc<ProcessorInner>,
    in_flight: Mutex<JoinSet<()>>,
}

impl JobProcessor {
    pub fn new(app: &App, registry: JobRegistry, lock_manager: LockManager) -> Self {
        Self {
            inner: Arc::new(ProcessorInner {
                db: app.db.clone(),
                registry,
                lock_manager,
                generator: app.generator.clone(),
                model_catalog: Arc::clone(&app.model_catalog),
                config: app.config.jobs.clone(),
            }),
            in_flight: Mutex::new(JoinSet::new()),
        }
    }

    /// Polls until `shutdown` resolves, then waits for running jobs to finish.
    pub async fn run<F: Future<Output = ()>>(&self, shutdown: F) {
        match self.recover_orphaned_jobs().await {
            Ok(0) => {}
            Ok(count) => warn!("♻️ Recovered {count} job(s) left running by a previous processor"),
            Err(e) => error!("❌ Failed to recover orphaned jobs: {e}"),
        }

        let mut job_types: Vec<&str> = self.inner.registry.job_types().collect();
        job_types.sort_unstable();
        info!(
            "⚙️ Job processor started: polling every {:?}, up to {} concurrent job(s), handling {:?}",
            self.inner.config.poll_interval(),
            self.inner.config.max_concurrent_jobs,
            job_types
        );

        tokio::pin!(shutdown);
        loop {
            match self.poll_once().await {
                Ok(report) if !report.is_idle() => debug!(
                    "Poll cycle started {} job(s), {} contended, {} with missing targets",
                    report.started.len(),
                    report.contended.len(),
                    report.missing_target.len()
                ),
                Ok(_) => {}
                Err(e) => error!("❌ Poll cycle failed: {e}"),
            }

            tokio::select! {
                () = &mut shutdown => break,
                () = sleep(self.inner.config.poll_interval()) => {}
            }
        }

        info!(
            "🛑 Job processor stopping, waiting for {} running job(s)",
            self.in_flight_count().await
        );
        self.wait_for_in_flight().await;
        info!("🛑 Job processor stopped");
    }

    /// Runs one poll cycle: claims as many waiting jobs as capacity allows, oldest first.
    ///
    /// Jobs whose target is locked stay `waiting` and are retried on the next cycle. Once a
    /// book-level job is held back, later chunk jobs of the same book are held back too, so
    /// they can't keep the book busy forever.
    pub async fn poll_once(&self) -> Result<PollReport, DbErr> {
        let mut in_flight = self.in_flight.lock().await;
        reap_finished(&mut in_flight);

        let mut report = PollReport::default();
        let capacity = self
            .inner
            .config
            .max_concurrent_jobs
            .saturating_sub(in_flight.len());
        if capacity == 0 {
            debug!("All {} job slots busy", in_flight.len());
            return Ok(report);
        }

        let waiting = job::Entity::find()
            .filter(job::Column::State.eq(JobState::Waiting))
            .order_by_asc(job::Column::CreatedAt)
            .order_by_asc(job::Column::Id)
            .all(&self.inner.db)
            .await?;

        let mut held_back_books = HashSet::new();
        for job in waiting {
            if report.started.len() >= capacity {
                break;
            }
            if job.chunk_id.is_some() && held_back_books.contains(&job.book_id) {
                report.contended.push(job.id);
                continue;
            }

            match self.inner.claim(&job).await? {
                Claim::Started(claimed) => {
                    debug!(
                        "🔧 Claimed {}({}) on {}",
                        claimed.job.job_type,
                        claimed.job.id,
                        claimed.job.target()
                    );
                    report.started.push(job.id);
                    in_flight.spawn(run_job(Arc::clone(&self.inner), claimed));
                }
                Claim::Contended => {
                    debug!("⏳ {}({}) waits for {}", job.job_type, job.id, job.target());
                    if job.chunk_id.is_none() {
                        held_back_books.insert(job.book_id);
                    }
                    report.contended.push(job.id);
                }
                Claim::TargetMissing(job) => {
                    report.missing_target.push(job.id);
                    let message = format!("Target {} no longer exists", job.target());
                    let logs = vec![PendingLogEntry::new(LogLevel::Warn, message.clone())];
                    self.inner
                        .finalize(&job, None, JobResult::Failed(message), logs, Vec::new())
                        .await;
                }
                Claim::Gone => {}
            }
        }

        Ok(report)
    }

    /// Ends every job left `running` by a previous process as `error` and frees its lock.
    ///
    /// Only call this while this processor has nothing in flight, i.e. before polling starts.
    pub async fn recover_orphaned_jobs(&self) -> Result<usize, DbErr> {
        let orphans = job::Entity::find()
            .filter(job::Column::State.eq(JobState::Running))
            .order_by_asc(job::Column::StartedAt)
            .all(&self.inner.db)
            .await?;

        for orphan in &orphans {
            warn!(
                "♻️ {}({}) on {} was running when the processor stopped",
                orphan.job_type,
                orphan.id,
                orphan.target()
            );
            let logs = vec![PendingLogEntry::new(
                LogLevel::Warn,
                "Processor restarted while the job was running; its outcome is unknown",
            )];
            self.inner
                .finalize(
                    orphan,
                    Some(LockHandle::assumed(orphan.target(), orphan.id)),
                    JobResult::Errored(JobFault::Interrupted),
                    logs,
                    Vec::new(),
                )
                .await;
        }

        Ok(orphans.len())
    }

    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Waits until every claimed job has been finalized.
    pub async fn wait_for_in_flight(&self) {
        let mut in_flight = self.in_flight.lock().await;
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("💥 Job task ended abnormally: {e}");
            }
        }
    }
}

fn reap_finished(in_flight: &mut JoinSet<()>) {
    while let Some(joined) = in_flight.try_join_next() {
        if let Err(e) = joined {
            error!("💥 Job task ended abnormally: {e}");
        }
    }
}

async fn run_job(inner: Arc<ProcessorInner>, claimed: ClaimedJob) {
    let ClaimedJob {
        job,
        lock,
        book,
        chunk,
    } = claimed;

    let context = Arc::new(JobContext::new(
        job.id,
        job.job_type.clone(),
        book,
        chunk,
        inner.generator.clone(),
        Arc::clone(&inner.model_catalog),
    ));
    context.info(format!("Started {} on {}", job.job_type, job.target()));

    let start_time = Instant::now();
    let result = inner.execute(&job, Arc::clone(&context)).await;
    debug!(
        "{}({}) finished in {:?}: {result}",
        job.job_type,
        job.id,
        start_time.elapsed()
    );

    let logs = context.log_sink().drain();
    let effects = context.take_effects();
    inner.finalize(&job, Some(lock), result, logs, effects).await;
}

impl ProcessorInner {
    async fn claim(&self, job: &job::Model) -> Result<Claim, DbErr> {
        let txn = self.db.begin().await?;

        let lock = match self
            .lock_manager
            .acquire(&txn, job.target(), job.id)
            .await?
        {
            LockAcquisition::Acquired(handle) => Some(handle),
            LockAcquisition::AlreadyLocked => {
                txn.rollback().await?;
                return Ok(Claim::Contended);
            }
            LockAcquisition::TargetMissing => None,
        };

        let started_at = Utc::now().naive_utc();
        let updated = job::Entity::update_many()
            .col_expr(job::Column::State, Expr::value(JobState::Running))
            .col_expr(job::Column::StartedAt, Expr::value(started_at))
            .filter(job::Column::Id.eq(job.id))
            .filter(job::Column::State.eq(JobState::Waiting))
            .exec(&txn)
            .await?;
        if updated.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(Claim::Gone);
        }

        let mut job = job.clone();
        job.state = JobState::Running;
        job.started_at = Some(started_at);

        let Some(lock) = lock else {
            txn.commit().await?;
            return Ok(Claim::TargetMissing(job));
        };

        let book = book::Entity::find_by_id(job.book_id)
            .one(&txn)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("book {}", job.book_id)))?;
        let chunk = match job.chunk_id {
            Some(chunk_id) => chunk::Entity::find_by_id(chunk_id).one(&txn).await?,
            None => None,
        };

        txn.commit().await?;

        Ok(Claim::Started(ClaimedJob {
            job,
            lock,
            book,
            chunk,
        }))
    }

    async fn execute(&self, job: &job::Model, context: Arc<JobContext>) -> JobResult {
        let handler = match self.registry.resolve(&job.job_type) {
            Ok(handler) => handler,
            Err(e) => return JobResult::Errored(e.into()),
        };

        let execution = AssertUnwindSafe(handler.execute(context, job.parameters.clone()))
            .catch_unwind();

        let outcome = match self.config.timeout_for(&job.job_type) {
            Some(limit) => match timeout(limit, execution).await {
                Ok(outcome) => outcome,
                Err(_) => return JobResult::Errored(JobFault::TimedOut(limit)),
            },
            None => execution.await,
        };

        match outcome {
            Ok(execution) => JobResult::from(execution),
            Err(payload) => JobResult::Errored(JobFault::Panicked(panic_message(payload.as_ref()))),
        }
    }

    /// Records the job's terminal state. Retries on database errors; if every attempt fails
    /// the job stays `running` and is picked up by orphan recovery on the next start.
    async fn finalize(
        &self,
        job: &job::Model,
        lock: Option<LockHandle>,
        mut result: JobResult,
        mut logs: Vec<PendingLogEntry>,
        mut effects: Vec<ChunkEffect>,
    ) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .commit_finalization(job, lock.as_ref(), &result, &logs, &effects)
                .await
            {
                Ok(()) => {
                    log_result(job, &result);
                    return;
                }
                Err(FinalizeError::Effects(e)) => {
                    warn!(
                        "❌ Discarding output of {}({}): {e}",
                        job.job_type, job.id
                    );
                    logs.push(PendingLogEntry::new(
                        LogLevel::Error,
                        format!("Output discarded: {e}"),
                    ));
                    result = JobResult::Errored(JobFault::Commit(e.to_string()));
                    effects.clear();
                }
                Err(FinalizeError::Database(e)) if attempt < self.config.finalize_attempts => {
                    let delay = finalize_backoff(attempt);
                    warn!(
                        "⚠️ Finalizing {}({}) failed (attempt {attempt}), retrying in {delay:?}: {e}",
                        job.job_type, job.id
                    );
                    sleep(delay).await;
                }
                Err(FinalizeError::Database(e)) => {
                    error!(
                        "💥 Giving up finalizing {}({}) after {attempt} attempt(s): {e}",
                        job.job_type, job.id
                    );
                    return;
                }
            }
        }
    }

    async fn commit_finalization(
        &self,
        job: &job::Model,
        lock: Option<&LockHandle>,
        result: &JobResult,
        logs: &[PendingLogEntry],
        effects: &[ChunkEffect],
    ) -> Result<(), FinalizeError> {
        let now = Utc::now().naive_utc();
        let txn = self.db.begin().await?;

        if matches!(result, JobResult::Completed(_)) {
            apply_effects(&txn, lock.map(LockHandle::entity), effects, now).await?;
        }

        let updated = job::Entity::update_many()
            .col_expr(job::Column::State, Expr::value(result.state()))
            .col_expr(job::Column::Result, Expr::value(result.result().cloned()))
            .col_expr(job::Column::ErrorMessage, Expr::value(result.error_message()))
            .col_expr(job::Column::CompletedAt, Expr::value(now))
            .filter(job::Column::Id.eq(job.id))
            .filter(job::Column::State.eq(JobState::Running))
            .exec(&txn)
            .await?;
        if updated.rows_affected == 0 {
            warn!(
                "{}({}) was no longer running when finalized",
                job.job_type, job.id
            );
        }

        let entries = logs
            .iter()
            .cloned()
            .chain(std::iter::once(closing_entry(result)))
            .map(|entry| entry.into_active_model(job.id));
        job_log::Entity::insert_many(entries).exec(&txn).await?;

        if let Some(lock) = lock {
            self.lock_manager.release(&txn, lock).await?;
        }

        txn.commit().await?;
        Ok(())
    }
}

fn closing_entry(result: &JobResult) -> PendingLogEntry {
    match result {
        JobResult::Completed(_) => PendingLogEntry::new(LogLevel::Info, "Job completed"),
        JobResult::Failed(message) => {
            PendingLogEntry::new(LogLevel::Warn, format!("Job failed: {message}"))
        }
        JobResult::Errored(fault) => {
            PendingLogEntry::new(LogLevel::Error, format!("Job errored: {fault}"))
        }
    }
}

fn log_result(job: &job::Model, result: &JobResult) {
    match result {
        JobResult::Completed(_) => info!("✅ {}({}) completed", job.job_type, job.id),
        JobResult::Failed(message) => warn!("❌ {}({}) failed: {message}", job.job_type, job.id),
        JobResult::Errored(fault) => error!("💥 {}({}) errored: {fault}", job.job_type, job.id),
    }
}

fn finalize_backoff(attempt: u32) -> Duration {
    let base = 50u64.saturating_mul(1 << attempt.min(6));
    Duration::from_millis(base + fastrand::u64(0..=base / 2))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
