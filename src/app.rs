use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    config::Config, environment::Environment, generation::GenerationError,
    generation::Generator, job_queue::JobQueue, library::Library, model_catalog::ModelCatalog,
};

#[derive(Clone, Debug)]
pub struct App {
    pub config: Config,
    pub environment: Environment,
    pub db: DatabaseConnection,
    pub job_queue: JobQueue,
    pub library: Library,
    pub generator: Generator,
    pub model_catalog: Arc<ModelCatalog>,
}

impl App {
    /// Wires up services for a connected database. The model catalog comes from `models` in
    /// the configuration, falling back to the built-in one.
    pub fn new(
        config: Config,
        environment: Environment,
        db: DatabaseConnection,
    ) -> Result<Self, GenerationError> {
        let generator = Generator::from_config(&config.generation)?;
        let model_catalog = config
            .models
            .clone()
            .map_or_else(ModelCatalog::builtin, ModelCatalog::new);

        Ok(Self {
            job_queue: JobQueue::new(db.clone()),
            library: Library::new(db.clone()),
            model_catalog: Arc::new(model_catalog),
            generator,
            config,
            environment,
            db,
        })
    }
}
