use std::{cmp, process};

use sea_orm::{DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;

use crate::{
    cli::MigrateAction,
    config::Config,
    database::{migrations::Migrator, setup_database_connection},
};

pub async fn handle_migrate_command(config: &Config, action: MigrateAction) {
    let result = match setup_database_connection(&config.database).await {
        Ok(db) => handle_migration_command(&db, action).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("❌ Migration failed: {e}");
        process::exit(1);
    }
}

fn print_names<'a>(header: &str, names: impl Iterator<Item = &'a str>) {
    println!("{header}");
    for name in names {
        println!("  📄 {name}");
    }
    println!();
}

pub async fn handle_migration_command(
    db: &DatabaseConnection,
    action: MigrateAction,
) -> Result<(), DbErr> {
    match action {
        MigrateAction::Up { steps } => {
            let pending = Migrator::get_pending_migrations(db).await?;
            if pending.is_empty() {
                println!("✅ All migrations are already up to date");
                return Ok(());
            }

            let count = steps.map_or(pending.len(), |steps| {
                cmp::min(steps as usize, pending.len())
            });
            print_names(
                &format!("Running {count} of {} pending migration(s) up:", pending.len()),
                pending[..count].iter().map(|migration| migration.name()),
            );

            Migrator::up(db, steps).await?;
            println!("✅ Migrations completed successfully");
        }
        MigrateAction::Down { steps } => {
            let applied = Migrator::get_applied_migrations(db).await?;
            if applied.is_empty() {
                println!("❌ No migrations to roll back");
                return Ok(());
            }

            let count = cmp::min(steps as usize, applied.len());
            print_names(
                &format!("Rolling back {count} migration(s):"),
                applied[applied.len() - count..]
                    .iter()
                    .rev()
                    .map(|migration| migration.name()),
            );

            Migrator::down(db, Some(steps)).await?;
            println!("✅ Rollback completed successfully");
        }
        MigrateAction::Status => {
            let pending = Migrator::get_pending_migrations(db).await?;
            let applied = Migrator::get_applied_migrations(db).await?;

            if pending.is_empty() {
                println!("✅ All migrations are up to date");
            } else {
                println!("📋 Pending migrations:");
                for migration in &pending {
                    println!("  - {}", migration.name());
                }
            }

            println!("📋 Applied migrations:");
            for migration in &applied {
                println!("  ✓ {}", migration.name());
            }
        }
        MigrateAction::Reset => {
            println!("🔄 Resetting database (this will drop all data!)...");

            let applied = Migrator::get_applied_migrations(db).await?;
            if applied.is_empty() {
                println!("No migrations to roll back");
            } else {
                print_names(
                    &format!("Rolling back {} applied migration(s):", applied.len()),
                    applied.iter().rev().map(|migration| migration.name()),
                );
                Migrator::reset(db).await?;
                println!("✅ All migrations rolled back");
            }

            Migrator::up(db, None).await?;
            println!("✅ Database reset completed successfully");
        }
        MigrateAction::Reapply { steps } => {
            let applied = Migrator::get_applied_migrations(db).await?;
            if applied.is_empty() {
                println!("❌ No migrations to reapply");
                return Ok(());
            }

            let count = cmp::min(steps as usize, applied.len());
            print_names(
                &format!("🔄 Reapplying {count} migration(s):"),
                applied[applied.len() - count..]
                    .iter()
                    .rev()
                    .map(|migration| migration.name()),
            );

            Migrator::down(db, Some(steps)).await?;
            println!("✅ Rollback completed");
            Migrator::up(db, Some(steps)).await?;
            println!("✅ Reapply completed successfully");
        }
    }

    Ok(())
}
