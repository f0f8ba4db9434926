use sea_orm::{ConnectOptions, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use tracing::{debug, info};

use crate::config::DatabaseConfig;

pub mod migrations;
pub mod models;

/// Connects to the database and brings the schema up to date.
pub async fn setup_database<AppMigrator: MigratorTrait>(
    db_config: &DatabaseConfig,
) -> Result<DatabaseConnection, DbErr> {
    let connection = setup_database_connection(db_config).await?;

    AppMigrator::up(&connection, None).await?;
    info!("✅ Database is ready!");

    Ok(connection)
}

pub async fn setup_database_connection(
    db_config: &DatabaseConfig,
) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(db_config.url.clone());

    options.sqlx_logging(false); // Disable SQL query logging to reduce noise

    // Every pooled connection to an in-memory SQLite database would get its own empty database
    if db_config.url.contains(":memory:") {
        options.max_connections(1).min_connections(1);
    } else {
        options.max_connections(db_config.pool_size);
    }

    debug!("Connecting to database at: {}", &db_config.url);

    sea_orm::Database::connect(options).await
}
