use std::sync::Mutex;

use chrono::NaiveDateTime;
use sea_orm::Set;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::database::models::{job_log, log_level::LogLevel};

/// A log entry written by a running job, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogEntry {
    pub id: Uuid,
    pub level: LogLevel,
    pub message: String,
    pub created_at: NaiveDateTime,
}

impl PendingLogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            level,
            message: message.into(),
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    pub(crate) fn into_active_model(self, job_id: Uuid) -> job_log::ActiveModel {
        job_log::ActiveModel {
            id: Set(self.id),
            job_id: Set(job_id),
            level: Set(self.level),
            message: Set(self.message),
            created_at: Set(self.created_at),
        }
    }
}

/// Buffers a job's log entries until the processor finalizes the job.
///
/// Entries are mirrored to `tracing` as they are written and persisted in the same
/// transaction as the job's terminal state.
#[derive(Debug)]
pub struct JobLogSink {
    job_id: Uuid,
    entries: Mutex<Vec<PendingLogEntry>>,
}

impl JobLogSink {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        let job_id = self.job_id;

        match level {
            LogLevel::Debug => debug!(%job_id, "{message}"),
            LogLevel::Info => info!(%job_id, "{message}"),
            LogLevel::Warn => warn!(%job_id, "{message}"),
            LogLevel::Error => error!(%job_id, "{message}"),
        }

        self.entries
            .lock()
            .unwrap()
            .push(PendingLogEntry::new(level, message));
    }

    /// Removes and returns everything logged so far.
    pub fn drain(&self) -> Vec<PendingLogEntry> {
        std::mem::take(&mut *self.entries.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_write_order() {
        let sink = JobLogSink::new(Uuid::now_v7());
        sink.log(LogLevel::Info, "first");
        sink.log(LogLevel::Warn, "second");

        let entries = sink.drain();
        assert_eq!(
            entries.iter().map(|e| e.message.as_str()).collect::<Vec<_>>(),
            ["first", "second"]
        );
        assert_eq!(entries[1].level, LogLevel::Warn);
        assert!(entries[0].created_at <= entries[1].created_at);
        assert!(sink.is_empty());
    }
}
