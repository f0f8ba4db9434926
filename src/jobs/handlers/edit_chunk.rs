use serde::Deserialize;
use serde_json::json;

use crate::{
    jobs::{handlers::generation_failed, JobContext, JobFault, JobHandler, Outcome},
    model_catalog::{ModelCategory, ModelRequirements},
};

pub const JOB_TYPE: &str = "edit_chunk";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditChunkParameters {
    /// How the chunk should change, e.g. "tighten the dialogue".
    pub instructions: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Rewrites a chunk according to the job's instructions.
pub struct EditChunk;

impl JobHandler for EditChunk {
    type Parameters = EditChunkParameters;

    async fn execute(
        &self,
        context: &JobContext,
        parameters: Self::Parameters,
    ) -> Result<Outcome, JobFault> {
        let Some(chunk) = context.chunk() else {
            return Ok(Outcome::failure("edit_chunk needs a chunk target"));
        };
        if parameters.instructions.trim().is_empty() {
            return Ok(Outcome::failure("The instructions must not be empty"));
        }

        let selection = context.select_model(
            ModelRequirements {
                category: ModelCategory::Editing,
            },
            parameters.model.as_deref(),
        )?;
        context.info(format!(
            "Editing chunk {} (v{}) with {} ({})",
            chunk.id, chunk.version, selection.model_id, selection.source
        ));

        let prompt = format!(
            "Revise the passage below from \"{}\".\nInstructions: {}\nReply with the revised passage only.\n\n{}",
            context.book().title,
            parameters.instructions.trim(),
            chunk.content
        );
        let revised = match context
            .generator()
            .generate(&selection.model_id, &prompt)
            .await
        {
            Ok(text) => text.trim().to_string(),
            Err(e) => return generation_failed(context, e),
        };

        if revised == chunk.content {
            context.info("The model returned the passage unchanged");
        }
        let word_count = revised.split_whitespace().count();
        context.replace_chunk_content(chunk.id, revised);

        Ok(Outcome::Success(json!({
            "chunk_id": chunk.id,
            "model": selection.model_id,
            "version": chunk.version + 1,
            "word_count": word_count,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        database::models::job_state::JobState, jobs::handlers::builtin_registry,
        tests::setup_test::setup_test,
    };

    #[tokio::test]
    async fn replaces_chunk_content_and_bumps_version() {
        let test = setup_test().await;
        let book = test.create_book("Dune").await;
        let chunk = test.create_chunk(book.id, "Paul walked on the sand.").await;
        test.mock_generator()
            .push_response("Paul walked without rhythm across the sand.");
        let processor = test.processor(builtin_registry().unwrap());

        let job = test
            .enqueue(
                JOB_TYPE,
                book.id,
                Some(chunk.id),
                json!({ "instructions": "Mention the worm-avoiding gait" }),
            )
            .await;
        test.run_until_idle(&processor).await;

        let job = test.job(job.id).await;
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.result.unwrap()["version"], json!(chunk.version + 1));

        let edited = test.chunk(chunk.id).await;
        assert_eq!(edited.content, "Paul walked without rhythm across the sand.");
        assert_eq!(edited.version, chunk.version + 1);
        assert!(edited.updated_at >= chunk.updated_at);
        assert!(!edited.is_locked);

        let prompt = &test.mock_generator().requests()[0].prompt;
        assert!(prompt.contains("Paul walked on the sand."));
        assert!(prompt.contains("Mention the worm-avoiding gait"));
    }

    #[tokio::test]
    async fn uses_editing_model() {
        let test = setup_test().await;
        let book = test.create_book("Dune").await;
        let chunk = test.create_chunk(book.id, "Arrakis.").await;
        let processor = test.processor(builtin_registry().unwrap());

        // llama-3.1-8b only does reviews
        test.enqueue(
            JOB_TYPE,
            book.id,
            Some(chunk.id),
            json!({ "instructions": "Expand", "model": "llama-3.1-8b" }),
        )
        .await;
        test.run_until_idle(&processor).await;

        assert_eq!(
            test.mock_generator().requests()[0].model_id,
            "claude-sonnet"
        );
    }

    #[tokio::test]
    async fn book_target_is_a_failure() {
        let test = setup_test().await;
        let book = test.create_book("Dune").await;
        let processor = test.processor(builtin_registry().unwrap());

        let job = test
            .enqueue(JOB_TYPE, book.id, None, json!({ "instructions": "Expand" }))
            .await;
        test.run_until_idle(&processor).await;

        let job = test.job(job.id).await;
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(
            job.error_message.as_deref(),
            Some("edit_chunk needs a chunk target")
        );
    }
}
