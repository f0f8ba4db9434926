use tokio::signal;
use tracing::{error, info};

use crate::{
    app::App,
    config::Config,
    database::{migrations::Migrator, setup_database},
    environment::Environment,
    jobs::{JobProcessor, JobRegistry, LockManager},
};

pub async fn handle_serve_command(
    environment: Environment,
    config: Config,
    job_registry: JobRegistry,
) {
    let db = match setup_database::<Migrator>(&config.database).await {
        Ok(db) => db,
        Err(e) => {
            error!("❌ Database setup failed: {}", e);
            return;
        }
    };

    let app = match App::new(config, environment, db) {
        Ok(app) => app,
        Err(e) => {
            error!("❌ Failed to set up the generation backend: {}", e);
            return;
        }
    };

    info!(
        "🚀 Starting folio in {} with {:?}",
        app.environment, app.generator
    );

    let processor = JobProcessor::new(&app, job_registry, LockManager::new());
    processor.run(shutdown_signal()).await;
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("❌ Failed to listen for Ctrl-C, stopping: {}", e);
        return;
    }
    info!("🛑 Received Ctrl-C");
}
