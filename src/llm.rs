use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StageError;

/// One request/response exchange with a language model.
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Ask the service to constrain its output to a JSON object.
    pub json_output: bool,
}

/// Black-box text completion. Implementations may be slow, return
/// arbitrary text, or fail; callers degrade on any error.
pub trait LanguageModel: Send + Sync {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, StageError>;
}

/// Model used when no service is configured. Every call fails, so each
/// stage takes its non-model path.
pub struct DisabledModel;

impl LanguageModel for DisabledModel {
    fn complete(&self, _request: &CompletionRequest<'_>) -> Result<String, StageError> {
        Err(StageError::ExternalServiceFailure(
            "language model disabled".to_string(),
        ))
    }
}

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

/// Connection settings for an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Upper bound on one call, including reading the response.
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Blocking client for `POST {base_url}/chat/completions`.
pub struct ChatCompletionsClient {
    agent: ureq::Agent,
    config: LlmConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl ChatCompletionsClient {
    pub fn new(config: LlmConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .http_status_as_error(false)
            .build();
        ChatCompletionsClient {
            agent: ureq::Agent::new_with_config(agent_config),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

impl LanguageModel for ChatCompletionsClient {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, StageError> {
        let body = serde_json::to_string(&ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: request
                .json_output
                .then_some(ResponseFormat { kind: "json_object" }),
        })
        .map_err(|e| StageError::ExternalServiceFailure(format!("request encoding: {e}")))?;

        let mut call = self
            .agent
            .post(&self.endpoint())
            .header("Content-Type", "application/json");
        if let Some(key) = &self.config.api_key {
            call = call.header("Authorization", &format!("Bearer {key}"));
        }

        let resp = call
            .send(body)
            .map_err(|e| StageError::ExternalServiceFailure(e.to_string()))?;
        let status = resp.status();
        let text = resp
            .into_body()
            .read_to_string()
            .map_err(|e| StageError::ExternalServiceFailure(format!("reading response: {e}")))?;
        if status != 200 {
            let snippet: String = text.chars().take(200).collect();
            return Err(StageError::ExternalServiceFailure(format!(
                "HTTP {status}: {snippet}"
            )));
        }
        debug!(chars = text.len(), "language model responded");
        deserialize_chat(&text)
    }
}

fn deserialize_chat(body: &str) -> Result<String, StageError> {
    let data: ChatResponse = serde_json::from_str(body)
        .map_err(|e| StageError::MalformedResponse(format!("chat response: {e}")))?;
    data.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| StageError::MalformedResponse("response has no message content".into()))
}
