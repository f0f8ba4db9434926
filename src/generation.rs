use std::{
    collections::VecDeque,
    fmt::{self, Debug},
    sync::{Arc, Mutex},
    time::Duration,
};

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::GenerationConfig;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },
    #[error("Generation backend rejected our credentials or request setup: {0}")]
    Misconfigured(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Model returned an empty response")]
    Empty,
}

impl GenerationError {
    /// True when retrying can't help because our own setup is wrong.
    ///
    /// Handlers report everything else as an expected failure.
    pub const fn is_programming_error(&self) -> bool {
        matches!(self, Self::Misconfigured(_))
    }
}

/// A prompt sent to the mock generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub model_id: String,
    pub prompt: String,
}

/// How many prompts the mock remembers. Older ones are dropped first.
const RECORDED_REQUESTS: usize = 100;

#[derive(Default)]
struct MockState {
    scripted: VecDeque<Result<String, GenerationError>>,
    requests: VecDeque<GenerationRequest>,
}

/// In-process generator for tests and offline development.
///
/// Scripted responses are consumed in order. Once they run out, it echoes the model id and the
/// first line of the prompt.
#[derive(Clone, Default)]
pub struct MockGenerator {
    state: Arc<Mutex<MockState>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, text: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .scripted
            .push_back(Ok(text.into()));
    }

    pub fn push_failure(&self, error: GenerationError) {
        self.state.lock().unwrap().scripted.push_back(Err(error));
    }

    /// The most recent prompts received, oldest first
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.state.lock().unwrap().requests.iter().cloned().collect()
    }

    fn generate(&self, model_id: &str, prompt: &str) -> Result<String, GenerationError> {
        let mut state = self.state.lock().unwrap();
        if state.requests.len() == RECORDED_REQUESTS {
            state.requests.pop_front();
        }
        state.requests.push_back(GenerationRequest {
            model_id: model_id.to_string(),
            prompt: prompt.to_string(),
        });

        state.scripted.pop_front().unwrap_or_else(|| {
            let first_line = prompt.lines().next().unwrap_or_default();
            Ok(format!("[{model_id}] {first_line}"))
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Client for servers speaking the OpenAI chat completions protocol.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        request_timeout: Duration,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| GenerationError::Misconfigured(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_tokens,
            temperature,
        })
    }

    async fn generate(&self, model_id: &str, prompt: &str) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: model_id,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!("Requesting completion from {} with model {}", url, model_id);

        let mut builder = self.client.post(&url).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| GenerationError::Connection(e.to_string()))?;

        let status = resp.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(GenerationError::Misconfigured(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::Parse(e.to_string()))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(GenerationError::Empty)
    }
}

/// Text generator handed to job handlers.
#[derive(Clone)]
pub enum Generator {
    OpenAi(OpenAiClient),
    Mock(MockGenerator),
}

impl Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi(client) => f
                .debug_tuple("Generator::OpenAi")
                .field(&client.base_url)
                .finish(),
            Self::Mock(_) => f.debug_tuple("Generator::Mock").finish(),
        }
    }
}

impl Generator {
    pub fn mock() -> Self {
        Self::Mock(MockGenerator::new())
    }

    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        match config {
            GenerationConfig::Mock => Ok(Self::mock()),
            GenerationConfig::OpenAi {
                base_url,
                api_key,
                request_timeout_seconds,
                max_tokens,
                temperature,
            } => OpenAiClient::new(
                base_url,
                api_key.clone(),
                Duration::from_secs(*request_timeout_seconds),
                *max_tokens,
                *temperature,
            )
            .map(Self::OpenAi),
        }
    }

    pub async fn generate(&self, model_id: &str, prompt: &str) -> Result<String, GenerationError> {
        match self {
            Self::OpenAi(client) => client.generate(model_id, prompt).await,
            Self::Mock(mock) => mock.generate(model_id, prompt),
        }
    }

    /// The mock generator, if that is what this is.
    pub const fn as_mock(&self) -> Option<&MockGenerator> {
        match self {
            Self::Mock(mock) => Some(mock),
            Self::OpenAi(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_replays_script_then_echoes() {
        let generator = Generator::mock();
        let mock = generator.as_mock().unwrap();
        mock.push_response("Once upon a time");
        mock.push_failure(GenerationError::Empty);

        assert_eq!(
            generator.generate("gpt-4o", "Write").await.unwrap(),
            "Once upon a time"
        );
        assert_eq!(
            generator.generate("gpt-4o", "Write").await,
            Err(GenerationError::Empty)
        );
        assert_eq!(
            generator
                .generate("gpt-4o-mini", "Summarise\nthe chapter")
                .await
                .unwrap(),
            "[gpt-4o-mini] Summarise"
        );
        assert_eq!(mock.requests().len(), 3);
    }

    #[tokio::test]
    async fn mock_keeps_only_recent_requests() {
        let generator = Generator::mock();
        for chapter in 0..RECORDED_REQUESTS + 5 {
            generator
                .generate("gpt-4o", &format!("Chapter {chapter}"))
                .await
                .unwrap();
        }

        let requests = generator.as_mock().unwrap().requests();
        assert_eq!(requests.len(), RECORDED_REQUESTS);
        assert_eq!(requests[0].prompt, "Chapter 5");
        assert_eq!(
            requests.last().unwrap().prompt,
            format!("Chapter {}", RECORDED_REQUESTS + 4)
        );
    }

    #[test]
    fn only_misconfiguration_is_a_programming_error() {
        assert!(GenerationError::Misconfigured("HTTP 401".into()).is_programming_error());
        assert!(!GenerationError::Connection("refused".into()).is_programming_error());
        assert!(!GenerationError::Api {
            status: 503,
            body: String::new()
        }
        .is_programming_error());
    }
}
