use serde::Deserialize;
use serde_json::json;

use crate::{
    database::models::book,
    jobs::{handlers::generation_failed, JobContext, JobFault, JobHandler, Outcome},
    model_catalog::{ModelCategory, ModelRequirements},
};

pub const JOB_TYPE: &str = "write_chunk";

const DEFAULT_TARGET_WORD_COUNT: u32 = 800;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteChunkParameters {
    /// What the new chunk should cover.
    pub brief: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_target_word_count")]
    pub target_word_count: u32,
    /// Model to use unless the book forces one.
    #[serde(default)]
    pub model: Option<String>,
}

const fn default_target_word_count() -> u32 {
    DEFAULT_TARGET_WORD_COUNT
}

/// Generates a new chunk from a brief and appends it to the book.
pub struct WriteChunk;

impl JobHandler for WriteChunk {
    type Parameters = WriteChunkParameters;

    async fn execute(
        &self,
        context: &JobContext,
        parameters: Self::Parameters,
    ) -> Result<Outcome, JobFault> {
        if parameters.brief.trim().is_empty() {
            return Ok(Outcome::failure("The brief must not be empty"));
        }
        if parameters.target_word_count == 0 {
            return Ok(Outcome::failure("target_word_count must be greater than zero"));
        }

        let selection = context.select_model(
            ModelRequirements {
                category: ModelCategory::Writing,
            },
            parameters.model.as_deref(),
        )?;
        context.info(format!(
            "Writing about {} words with {} ({})",
            parameters.target_word_count, selection.model_id, selection.source
        ));

        let prompt = prompt(context.book(), &parameters);
        let text = match context
            .generator()
            .generate(&selection.model_id, &prompt)
            .await
        {
            Ok(text) => text,
            Err(e) => return generation_failed(context, e),
        };

        let content = text.trim();
        let word_count = content.split_whitespace().count();
        let chunk_id = context.create_chunk(parameters.title, content);
        context.info(format!("Drafted chunk {chunk_id} ({word_count} words)"));

        Ok(Outcome::Success(json!({
            "chunk_id": chunk_id,
            "model": selection.model_id,
            "word_count": word_count,
        })))
    }
}

fn prompt(book: &book::Model, parameters: &WriteChunkParameters) -> String {
    let mut prompt = format!(
        "Write the next section of the book \"{}\" in about {} words.\n",
        book.title, parameters.target_word_count
    );
    if let Some(title) = &parameters.title {
        prompt.push_str(&format!("Section title: {title}\n"));
    }
    prompt.push_str(&format!("Brief:\n{}\n", parameters.brief.trim()));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        database::models::job_state::JobState,
        generation::GenerationError,
        jobs::handlers::builtin_registry,
        library::NewBook,
        tests::setup_test::setup_test,
    };

    #[tokio::test]
    async fn appends_generated_chunk() {
        let test = setup_test().await;
        let book = test.create_book("Dune").await;
        let existing = test.create_chunk(book.id, "Arrakis.").await;
        test.mock_generator().push_response("  The spice must flow.\n");
        let processor = test.processor(builtin_registry().unwrap());

        let job = test
            .enqueue(
                JOB_TYPE,
                book.id,
                None,
                json!({ "brief": "Paul meets the Fremen", "title": "Sietch Tabr" }),
            )
            .await;
        test.run_until_idle(&processor).await;

        let job = test.job(job.id).await;
        assert_eq!(job.state, JobState::Completed);

        let chunks = test.chunks(book.id).await;
        assert_eq!(chunks.len(), 2);
        let written = &chunks[1];
        assert_eq!(written.content, "The spice must flow.");
        assert_eq!(written.title.as_deref(), Some("Sietch Tabr"));
        assert_eq!(written.position, existing.position + 1);
        assert!(!test.book(book.id).await.is_locked);

        let result = job.result.unwrap();
        assert_eq!(result["chunk_id"], json!(written.id));
        assert_eq!(result["word_count"], json!(4));

        let requests = test.mock_generator().requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].prompt.contains("\"Dune\""));
        assert!(requests[0].prompt.contains("Paul meets the Fremen"));
    }

    #[tokio::test]
    async fn forced_book_model_wins_over_job_choice() {
        let test = setup_test().await;
        let book = test
            .library
            .create_book(NewBook {
                title: "Emma".to_string(),
                forced_model: Some("gpt-4o-mini".to_string()),
                model_defaults: Vec::new(),
            })
            .await
            .unwrap();
        let processor = test.processor(builtin_registry().unwrap());

        let job = test
            .enqueue(
                JOB_TYPE,
                book.id,
                None,
                json!({ "brief": "A picnic at Box Hill", "model": "claude-sonnet" }),
            )
            .await;
        test.run_until_idle(&processor).await;

        assert_eq!(test.job(job.id).await.state, JobState::Completed);
        assert_eq!(test.mock_generator().requests()[0].model_id, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn generation_failure_fails_without_writing() {
        let test = setup_test().await;
        let book = test.create_book("Dune").await;
        test.mock_generator()
            .push_failure(GenerationError::Connection("connection reset".to_string()));
        let processor = test.processor(builtin_registry().unwrap());

        let job = test
            .enqueue(JOB_TYPE, book.id, None, json!({ "brief": "Arrival" }))
            .await;
        test.run_until_idle(&processor).await;

        let job = test.job(job.id).await;
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(
            job.error_message.as_deref(),
            Some("Generation failed: Connection error: connection reset")
        );
        assert!(test.chunks(book.id).await.is_empty());
    }

    #[tokio::test]
    async fn misconfigured_backend_is_an_error() {
        let test = setup_test().await;
        let book = test.create_book("Dune").await;
        test.mock_generator()
            .push_failure(GenerationError::Misconfigured("HTTP 401".to_string()));
        let processor = test.processor(builtin_registry().unwrap());

        let job = test
            .enqueue(JOB_TYPE, book.id, None, json!({ "brief": "Arrival" }))
            .await;
        test.run_until_idle(&processor).await;

        assert_eq!(test.job(job.id).await.state, JobState::Error);
        assert!(test.chunks(book.id).await.is_empty());
    }

    #[tokio::test]
    async fn malformed_parameters_fail() {
        let test = setup_test().await;
        let book = test.create_book("Dune").await;
        let processor = test.processor(builtin_registry().unwrap());

        let missing_brief = test
            .enqueue(JOB_TYPE, book.id, None, json!({ "title": "Untitled" }))
            .await;
        let empty_brief = test
            .enqueue(JOB_TYPE, book.id, None, json!({ "brief": "   " }))
            .await;
        test.run_until_idle(&processor).await;

        for job_id in [missing_brief.id, empty_brief.id] {
            assert_eq!(test.job(job_id).await.state, JobState::Failed);
        }
        assert!(test.mock_generator().requests().is_empty());
    }
}
