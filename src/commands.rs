use std::process;

use crate::{
    app::App,
    config::Config,
    database::{migrations::Migrator, setup_database},
    environment::Environment,
};

pub mod books;
pub mod jobs;
pub mod migrate;
pub mod serve;
pub mod version;

/// Connects and migrates the database for a one-shot command. Exits the process on failure.
async fn connect_app(environment: Environment, config: Config) -> App {
    let db = match setup_database::<Migrator>(&config.database).await {
        Ok(db) => db,
        Err(e) => {
            eprintln!("❌ Database setup failed: {e}");
            process::exit(1);
        }
    };

    match App::new(config, environment, db) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("❌ Failed to set up the generation backend: {e}");
            process::exit(1);
        }
    }
}

fn exit_with(error: impl std::fmt::Display) -> ! {
    eprintln!("❌ {error}");
    process::exit(1);
}
