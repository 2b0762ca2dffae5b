use super::{api_error, GenerationRequest, LlmBackend};
use crate::config::{LlmProvider, ModelConfig};
use crate::schema::{provider_schema, SchemaDialect};
use async_trait::async_trait;
use qaflow_core::{QaError, QaResult};

/// OpenAI-compatible API backend.
///
/// Works with OpenAI, OpenRouter, Groq, Ollama, and any other provider
/// that implements the OpenAI chat completions API. Structured output is
/// requested through `response_format: json_schema`. Media attachments are
/// rejected locally: the chat completions API does not take video.
pub struct OpenAiBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn build_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": request.temperature.unwrap_or(self.config.temperature),
            "messages": [{ "role": "user", "content": request.prompt }],
        });

        if let Some(schema) = &request.response_schema {
            body["response_format"] = serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema_name(&request.agent),
                    "schema": provider_schema(schema, SchemaDialect::JsonSchema),
                    "strict": false,
                }
            });
        }

        body
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json");

        // OpenRouter requires extra headers
        if matches!(self.config.provider, LlmProvider::OpenRouter) {
            request.header("X-Title", "qaflow")
        } else {
            request
        }
    }
}

/// `json_schema.name` only allows `[a-zA-Z0-9_-]`.
fn schema_name(agent: &str) -> String {
    let name: String = agent
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if name.is_empty() {
        "response".to_string()
    } else {
        name
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn generate(&self, request: &GenerationRequest) -> QaResult<String> {
        if request.media.is_some() {
            return Err(QaError::Validation(format!(
                "{:?} backend does not accept media attachments",
                self.config.provider
            )));
        }

        let url = format!("{}/v1/chat/completions", self.config.base_url());
        let body = self.build_body(request);

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| QaError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(api_error("OpenAI", resp).await);
        }

        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| QaError::Http(e.to_string()))?;

        parse_openai_response(&resp_body)
    }

    fn name(&self) -> &str {
        match self.config.provider {
            LlmProvider::OpenRouter => "openrouter",
            LlmProvider::Groq => "groq",
            _ => "openai",
        }
    }

    fn supports_video(&self) -> bool {
        self.config.provider.supports_video()
    }
}

pub fn parse_openai_response(body: &serde_json::Value) -> QaResult<String> {
    let choice = &body["choices"][0];
    if let Some(refusal) = choice["message"]["refusal"].as_str() {
        return Err(QaError::SchemaMismatch(format!("model refused: {refusal}")));
    }
    match choice["message"]["content"].as_str() {
        Some(content) if !content.trim().is_empty() => Ok(content.to_string()),
        _ => Err(QaError::SchemaMismatch(format!(
            "OpenAI returned an empty reply (finish_reason: {})",
            choice["finish_reason"].as_str().unwrap_or("unknown")
        ))),
    }
}
