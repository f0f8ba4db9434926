use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::{database::models::job_state::JobState, model_catalog::ModelCategory};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the job processor until interrupted (default)
    Serve,
    /// Database migration commands
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Manage books and their chunks
    Books {
        #[command(subcommand)]
        action: BookAction,
    },
    /// Queue and inspect jobs
    Jobs {
        #[command(subcommand)]
        action: JobAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum MigrateAction {
    /// Run migrations up
    Up {
        /// Number of migrations to run (default: all)
        #[arg(short, long)]
        steps: Option<u32>,
    },
    /// Run migrations down
    Down {
        /// Number of migrations to rollback (default: 1)
        #[arg(short, long, default_value = "1")]
        steps: u32,
    },
    /// Show migration status
    Status,
    /// Reset database (down all, then up all)
    Reset,
    /// Reapply recent migrations (down then up)
    Reapply {
        /// Number of migrations to reapply (default: 1)
        #[arg(short, long, default_value = "1")]
        steps: u32,
    },
}

#[derive(Subcommand)]
pub enum BookAction {
    /// Create a book
    Create {
        title: String,
        /// Model every job on this book must use
        #[arg(long)]
        forced_model: Option<String>,
        /// Default model for a category, e.g. `writing=gpt-4o` (repeatable)
        #[arg(long = "default", value_parser = parse_model_default)]
        defaults: Vec<(ModelCategory, String)>,
    },
    /// List books
    List,
    /// Show a book and its chunks
    Show { book_id: Uuid },
    /// Append a chunk to a book
    AddChunk {
        book_id: Uuid,
        content: String,
        #[arg(long)]
        title: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum JobAction {
    /// Queue a job on a book, or on one of its chunks
    Enqueue {
        job_type: String,
        #[arg(long)]
        book: Uuid,
        #[arg(long)]
        chunk: Option<Uuid>,
        /// Job parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// List jobs, newest first
    List {
        #[arg(long)]
        state: Option<JobState>,
        #[arg(long = "type")]
        job_type: Option<String>,
        #[arg(long)]
        book: Option<Uuid>,
        #[arg(long, default_value = "20")]
        limit: u64,
    },
    /// Show a job with its log
    Show { job_id: Uuid },
    /// Cancel a waiting job
    Cancel { job_id: Uuid },
    /// Queue a failed or errored job again
    Retry { job_id: Uuid },
}

fn parse_model_default(value: &str) -> Result<(ModelCategory, String), String> {
    let (category, model) = value
        .split_once('=')
        .ok_or_else(|| format!("expected CATEGORY=MODEL, got '{value}'"))?;
    let category = category
        .parse::<ModelCategory>()
        .map_err(|_| format!("unknown model category '{category}'"))?;

    Ok((category, model.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_model_defaults() {
        assert_eq!(
            parse_model_default("writing=gpt-4o"),
            Ok((ModelCategory::Writing, "gpt-4o".to_string()))
        );
        assert!(parse_model_default("gpt-4o").is_err());
        assert!(parse_model_default("poetry=gpt-4o").is_err());
    }

    #[test]
    fn parses_job_commands() {
        let book = Uuid::now_v7();
        let cli = Cli::try_parse_from([
            "folio",
            "jobs",
            "enqueue",
            "write_chunk",
            "--book",
            &book.to_string(),
            "--params",
            r#"{"brief":"Open on Arrakis"}"#,
        ])
        .unwrap();

        assert!(matches!(
            cli.command,
            Some(Commands::Jobs {
                action: JobAction::Enqueue { book: parsed, chunk: None, .. }
            }) if parsed == book
        ));

        let cli = Cli::try_parse_from(["folio", "jobs", "list", "--state", "waiting"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Jobs {
                action: JobAction::List {
                    state: Some(JobState::Waiting),
                    limit: 20,
                    ..
                }
            })
        ));
    }
}
