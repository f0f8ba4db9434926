use std::process;

use clap::Parser as _;
use config_rs::Config as ConfigRs;
use tracing::{debug, trace};

use crate::{
    cli::{Cli, Commands},
    commands::{books, jobs, migrate, serve, version},
    config::{Config, ConfigError},
    environment::Environment,
    jobs::JobRegistry,
    setup_tracing::setup_tracing_for_command,
};

/// What the binary contributes to startup: the job handlers it wants to run.
pub struct BootConfig {
    pub job_registry: JobRegistry,
}

impl BootConfig {
    #[must_use]
    pub const fn new(job_registry: JobRegistry) -> Self {
        Self { job_registry }
    }
}

pub async fn boot(config: BootConfig) {
    let cli = Cli::parse();

    if matches!(cli.command, Some(Commands::Version)) {
        version::print_version_info();
        return;
    }

    let environment = Environment::from_env();

    let app_config = match read_config(&environment) {
        Ok(app_config) => app_config,
        Err(e) => {
            eprintln!("❌ {e}");
            process::exit(1);
        }
    };

    setup_tracing_for_command(&cli.command, &app_config.tracing.log_level);

    debug!("Environment set to: {:?}", environment);
    trace!("Configuration loaded: {:?}", app_config);

    handle_command(environment, app_config, cli, config.job_registry).await;
}

/// Reads `config/{environment}` and overlays `APP_`-prefixed environment variables, with `__`
/// between nested keys (e.g. `APP_DATABASE__URL`).
pub fn read_config(environment: &Environment) -> Result<Config, ConfigError> {
    let config_file_name = environment.config_file();

    trace!("Reading configuration from: {}", config_file_name);

    let config: Config = ConfigRs::builder()
        .add_source(config_rs::File::with_name(&config_file_name))
        .add_source(
            config_rs::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?
        .try_deserialize()?;

    config.jobs.validate()?;
    Ok(config)
}

pub async fn handle_command(
    environment: Environment,
    config: Config,
    cli: Cli,
    job_registry: JobRegistry,
) {
    match cli.command {
        Some(Commands::Migrate { action }) => {
            migrate::handle_migrate_command(&config, action).await;
        }
        Some(Commands::Books { action }) => {
            books::handle_books_command(environment, config, action).await;
        }
        Some(Commands::Jobs { action }) => {
            jobs::handle_jobs_command(environment, config, action).await;
        }
        Some(Commands::Version) => {
            version::print_version_info();
        }
        Some(Commands::Serve) | None => {
            serve::handle_serve_command(environment, config, job_registry).await;
        }
    }
}
