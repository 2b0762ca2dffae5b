pub mod claude;
pub mod gemini;
pub mod openai;

use async_trait::async_trait;
use qaflow_core::{MediaAttachment, QaResult};
use serde::{Deserialize, Serialize};

/// One request to the text-generation capability.
///
/// The prompt is already rendered; the backend only has to transport it,
/// attach the optional media, and ask the provider for JSON conforming to
/// `response_schema`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Name of the prompt call issuing the request (used for logging and mocks).
    pub agent: String,
    /// Fully rendered prompt text.
    pub prompt: String,
    /// Optional binary attachment (e.g. a screen recording).
    #[serde(default)]
    pub media: Option<MediaAttachment>,
    /// JSON Schema the reply must conform to.
    #[serde(default)]
    pub response_schema: Option<serde_json::Value>,
    /// Overrides the model's default temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(agent: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            prompt: prompt.into(),
            media: None,
            response_schema: None,
            temperature: None,
        }
    }
}

/// Trait for LLM provider backends.
///
/// Each provider (Gemini, Claude, OpenAI-compatible, etc.) implements this trait
/// to handle API communication. The backend performs exactly one remote call;
/// retries live in the prompt call that owns the retry policy.
///
/// To add a new provider:
/// 1. Create a new module in `backends/`
/// 2. Implement `LlmBackend` for your struct
/// 3. Add the variant to `LlmProvider` enum in `config.rs`
/// 4. Wire it up in `LlmClient::new()` in `llm.rs`
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Send one generation request and return the model's raw text reply.
    async fn generate(&self, request: &GenerationRequest) -> QaResult<String>;

    /// Short identifier used in logs.
    fn name(&self) -> &str {
        "llm"
    }

    /// Whether a video attachment can be sent through this backend.
    fn supports_video(&self) -> bool {
        true
    }
}

/// Map a `reqwest` response with a non-success status into an API error.
pub(crate) async fn api_error(provider: &str, resp: reqwest::Response) -> qaflow_core::QaError {
    let status = resp.status().as_u16();
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    qaflow_core::QaError::Api {
        status,
        message: format!("{provider}: {body}"),
    }
}
