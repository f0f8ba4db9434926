use serde::Deserialize;
use serde_json::json;

use crate::{
    jobs::{handlers::generation_failed, JobContext, JobFault, JobHandler, Outcome},
    model_catalog::{ModelCategory, ModelRequirements},
};

pub const JOB_TYPE: &str = "review_chunk";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewChunkParameters {
    /// What the reviewer should pay attention to. Defaults to a general critique.
    #[serde(default)]
    pub focus: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Reviews a chunk. The notes go into the job result; the chunk itself is left alone.
pub struct ReviewChunk;

impl JobHandler for ReviewChunk {
    type Parameters = ReviewChunkParameters;

    async fn execute(
        &self,
        context: &JobContext,
        parameters: Self::Parameters,
    ) -> Result<Outcome, JobFault> {
        let Some(chunk) = context.chunk() else {
            return Ok(Outcome::failure("review_chunk needs a chunk target"));
        };

        let selection = context.select_model(
            ModelRequirements {
                category: ModelCategory::Review,
            },
            parameters.model.as_deref(),
        )?;
        context.debug(format!("Reviewing with {}", selection.model_id));

        let focus = parameters
            .focus
            .as_deref()
            .map(str::trim)
            .filter(|focus| !focus.is_empty())
            .unwrap_or("overall quality, pacing and consistency");
        let prompt = format!(
            "Review this passage from \"{}\", focusing on {focus}. Give concrete, numbered notes.\n\n{}",
            context.book().title,
            chunk.content
        );

        let review = match context
            .generator()
            .generate(&selection.model_id, &prompt)
            .await
        {
            Ok(text) => text.trim().to_string(),
            Err(e) => return generation_failed(context, e),
        };

        Ok(Outcome::Success(json!({
            "chunk_id": chunk.id,
            "chunk_version": chunk.version,
            "model": selection.model_id,
            "review": review,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        database::models::job_state::JobState, generation::GenerationError,
        jobs::handlers::builtin_registry, tests::setup_test::setup_test,
    };

    #[tokio::test]
    async fn review_lands_in_result_and_chunk_is_untouched() {
        let test = setup_test().await;
        let book = test.create_book("Dune").await;
        let chunk = test.create_chunk(book.id, "Paul walked on the sand.").await;
        test.mock_generator()
            .push_response("1. Show the danger of the worms.");
        let processor = test.processor(builtin_registry().unwrap());

        let job = test
            .enqueue(
                JOB_TYPE,
                book.id,
                Some(chunk.id),
                json!({ "focus": "tension" }),
            )
            .await;
        test.run_until_idle(&processor).await;

        let job = test.job(job.id).await;
        assert_eq!(job.state, JobState::Completed);
        let result = job.result.unwrap();
        assert_eq!(result["review"], json!("1. Show the danger of the worms."));
        assert_eq!(result["model"], json!("gpt-4o"));

        assert_eq!(test.chunk(chunk.id).await, chunk);
        assert!(test.mock_generator().requests()[0]
            .prompt
            .contains("focusing on tension"));
    }

    #[tokio::test]
    async fn transient_generation_error_fails() {
        let test = setup_test().await;
        let book = test.create_book("Dune").await;
        let chunk = test.create_chunk(book.id, "Arrakis.").await;
        test.mock_generator().push_failure(GenerationError::Api {
            status: 503,
            body: "overloaded".to_string(),
        });
        let processor = test.processor(builtin_registry().unwrap());

        let job = test
            .enqueue(JOB_TYPE, book.id, Some(chunk.id), json!({}))
            .await;
        test.run_until_idle(&processor).await;

        let job = test.job(job.id).await;
        assert_eq!(job.state, JobState::Failed);

        let logs = test.job_queue.job_logs(job.id).await.unwrap();
        assert!(logs
            .iter()
            .any(|log| log.message.contains("HTTP 503")));
    }
}
