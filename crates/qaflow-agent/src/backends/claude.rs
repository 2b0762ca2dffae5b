use super::{api_error, GenerationRequest, LlmBackend};
use crate::config::ModelConfig;
use crate::schema::{provider_schema, SchemaDialect};
use async_trait::async_trait;
use qaflow_core::{QaError, QaResult};

/// Claude (Anthropic) API backend.
///
/// The messages API has no response-schema parameter, so the schema is
/// appended to the prompt as an instruction. Image attachments are sent as
/// `image` content blocks; other media types are rejected locally.
pub struct ClaudeBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl ClaudeBackend {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn build_body(&self, request: &GenerationRequest) -> QaResult<serde_json::Value> {
        let mut content = Vec::new();

        if let Some(media) = &request.media {
            if !media.mime_type.starts_with("image/") {
                return Err(QaError::Validation(format!(
                    "Claude backend does not accept {} attachments",
                    media.mime_type
                )));
            }
            content.push(serde_json::json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": media.mime_type,
                    "data": media.data,
                }
            }));
        }

        let mut text = request.prompt.clone();
        if let Some(schema) = &request.response_schema {
            let schema = provider_schema(schema, SchemaDialect::JsonSchema);
            text.push_str(
                "\n\nRespond with a single JSON object (no prose, no code fences) \
                 that conforms to this JSON Schema:\n",
            );
            text.push_str(&schema.to_string());
        }
        content.push(serde_json::json!({ "type": "text", "text": text }));

        Ok(serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": request.temperature.unwrap_or(self.config.temperature),
            "messages": [{ "role": "user", "content": content }],
        }))
    }
}

#[async_trait]
impl LlmBackend for ClaudeBackend {
    async fn generate(&self, request: &GenerationRequest) -> QaResult<String> {
        let url = format!("{}/v1/messages", self.config.base_url());
        let body = self.build_body(request)?;

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| QaError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(api_error("Claude", resp).await);
        }

        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| QaError::Http(e.to_string()))?;

        parse_claude_response(&resp_body)
    }

    fn name(&self) -> &str {
        "claude"
    }

    fn supports_video(&self) -> bool {
        self.config.provider.supports_video()
    }
}

pub fn parse_claude_response(body: &serde_json::Value) -> QaResult<String> {
    let text: String = body["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b["type"] == "text")
                .filter_map(|b| b["text"].as_str())
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(QaError::SchemaMismatch(format!(
            "Claude returned an empty reply (stop_reason: {})",
            body["stop_reason"].as_str().unwrap_or("unknown")
        )));
    }
    Ok(text)
}
