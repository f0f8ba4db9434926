use crate::{
    cli::JobAction,
    commands::{connect_app, exit_with},
    config::Config,
    database::models::job,
    environment::Environment,
    job_queue::{JobFilter, NewJob},
    jobs::JobTarget,
};

pub async fn handle_jobs_command(environment: Environment, config: Config, action: JobAction) {
    let app = connect_app(environment, config).await;
    let queue = &app.job_queue;

    match action {
        JobAction::Enqueue {
            job_type,
            book,
            chunk,
            params,
        } => {
            let parameters: serde_json::Value =
                serde_json::from_str(&params).unwrap_or_else(|e| exit_with(e));
            let target = JobTarget {
                book_id: book,
                chunk_id: chunk,
            };

            let job = queue
                .create_job(NewJob::new(job_type, target, parameters))
                .await
                .unwrap_or_else(|e| exit_with(e));
            println!("📥 Queued {} {} on {}", job.job_type, job.id, job.target());
        }
        JobAction::List {
            state,
            job_type,
            book,
            limit,
        } => {
            let jobs = queue
                .list_jobs(&JobFilter {
                    state,
                    job_type,
                    book_id: book,
                    chunk_id: None,
                    limit: Some(limit),
                })
                .await
                .unwrap_or_else(|e| exit_with(e));

            if jobs.is_empty() {
                println!("No matching jobs");
            }
            for job in &jobs {
                print_summary(job);
            }
        }
        JobAction::Show { job_id } => {
            let job = queue.get_job(job_id).await.unwrap_or_else(|e| exit_with(e));
            let logs = queue.job_logs(job_id).await.unwrap_or_else(|e| exit_with(e));

            print_summary(&job);
            println!("  Target:     {}", job.target());
            println!("  Parameters: {}", job.parameters);
            println!("  Created:    {}", job.created_at);
            if let Some(started_at) = job.started_at {
                println!("  Started:    {started_at}");
            }
            if let Some(completed_at) = job.completed_at {
                println!("  Finished:   {completed_at}");
            }
            if let Some(result) = &job.result {
                println!("  Result:     {result}");
            }
            if let Some(error_message) = &job.error_message {
                println!("  Error:      {error_message}");
            }

            if !logs.is_empty() {
                println!();
                for log in logs {
                    println!("  {} {:<5} {}", log.created_at, log.level, log.message);
                }
            }
        }
        JobAction::Cancel { job_id } => {
            let job = queue.cancel_job(job_id).await.unwrap_or_else(|e| exit_with(e));
            println!("🚫 Cancelled {} {}", job.job_type, job.id);
        }
        JobAction::Retry { job_id } => {
            let job = queue.retry_job(job_id).await.unwrap_or_else(|e| exit_with(e));
            println!("🔁 Queued {} again as {}", job.job_type, job.id);
        }
    }
}

fn print_summary(job: &job::Model) {
    println!(
        "{}  {:<12} {:<10} {}",
        job.id, job.job_type, job.state, job.created_at
    );
}
