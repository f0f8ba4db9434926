use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::{
    database::models::{book, chunk, log_level::LogLevel},
    generation::Generator,
    jobs::{
        chunk_effects::ChunkEffect, job_log_sink::JobLogSink, job_target::JobTarget,
    },
    model_catalog::{ModelCatalog, ModelRequirements, ModelSelection, ModelSelectionError},
};

/// Everything a handler gets to see and do while its job runs.
///
/// The book and chunk are snapshots taken when the job was claimed. Since the job holds the
/// target's lock, nothing else writes to them in the meantime.
#[derive(Debug)]
pub struct JobContext {
    job_id: Uuid,
    job_type: String,
    target: JobTarget,
    book: book::Model,
    chunk: Option<chunk::Model>,
    generator: Generator,
    model_catalog: Arc<ModelCatalog>,
    log_sink: JobLogSink,
    effects: Mutex<Vec<ChunkEffect>>,
}

impl JobContext {
    pub fn new(
        job_id: Uuid,
        job_type: impl Into<String>,
        book: book::Model,
        chunk: Option<chunk::Model>,
        generator: Generator,
        model_catalog: Arc<ModelCatalog>,
    ) -> Self {
        let target = JobTarget {
            book_id: book.id,
            chunk_id: chunk.as_ref().map(|chunk| chunk.id),
        };

        Self {
            job_id,
            job_type: job_type.into(),
            target,
            book,
            chunk,
            generator,
            model_catalog,
            log_sink: JobLogSink::new(job_id),
            effects: Mutex::new(Vec::new()),
        }
    }

    pub const fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub const fn target(&self) -> JobTarget {
        self.target
    }

    pub const fn book(&self) -> &book::Model {
        &self.book
    }

    pub const fn chunk(&self) -> Option<&chunk::Model> {
        self.chunk.as_ref()
    }

    pub const fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn model_catalog(&self) -> &ModelCatalog {
        &self.model_catalog
    }

    /// Selects a model using the book's preferences and the job's own choice, if any.
    pub fn select_model(
        &self,
        requirements: ModelRequirements,
        job_override: Option<&str>,
    ) -> Result<ModelSelection, ModelSelectionError> {
        self.model_catalog.select_model(
            requirements,
            &self.book.model_preferences(),
            job_override,
        )
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.log_sink.log(level, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    /// Stages a new chunk at the end of the target book and returns the id it will get.
    pub fn create_chunk(&self, title: Option<String>, content: impl Into<String>) -> Uuid {
        let chunk_id = Uuid::now_v7();
        self.stage(ChunkEffect::Create {
            chunk_id,
            book_id: self.target.book_id,
            title,
            content: content.into(),
        });
        chunk_id
    }

    /// Stages new content for a chunk of the target book.
    pub fn replace_chunk_content(&self, chunk_id: Uuid, content: impl Into<String>) {
        self.stage(ChunkEffect::ReplaceContent {
            chunk_id,
            book_id: self.target.book_id,
            content: content.into(),
        });
    }

    fn stage(&self, effect: ChunkEffect) {
        self.effects.lock().unwrap().push(effect);
    }

    pub(crate) const fn log_sink(&self) -> &JobLogSink {
        &self.log_sink
    }

    pub(crate) fn take_effects(&self) -> Vec<ChunkEffect> {
        std::mem::take(&mut *self.effects.lock().unwrap())
    }
}
