use super::{api_error, GenerationRequest, LlmBackend};
use crate::config::ModelConfig;
use crate::schema::{provider_schema, SchemaDialect};
use async_trait::async_trait;
use qaflow_core::{QaError, QaResult};

/// Google Gemini `generateContent` backend.
///
/// Sends the rendered prompt as a text part, the optional media attachment
/// as an `inline_data` part, and asks for `application/json` output
/// constrained by `responseSchema`.
pub struct GeminiBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn build_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let mut parts = vec![serde_json::json!({ "text": request.prompt })];
        if let Some(media) = &request.media {
            parts.push(serde_json::json!({
                "inline_data": {
                    "mime_type": media.mime_type,
                    "data": media.data,
                }
            }));
        }

        let mut generation_config = serde_json::json!({
            "temperature": request.temperature.unwrap_or(self.config.temperature),
            "maxOutputTokens": self.config.max_tokens,
        });
        if let Some(schema) = &request.response_schema {
            generation_config["responseMimeType"] = serde_json::json!("application/json");
            generation_config["responseSchema"] = provider_schema(schema, SchemaDialect::OpenApi);
        }

        serde_json::json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": generation_config,
        })
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn generate(&self, request: &GenerationRequest) -> QaResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url(),
            self.config.model_id
        );
        let body = self.build_body(request);

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| QaError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(api_error("Gemini", resp).await);
        }

        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| QaError::Http(e.to_string()))?;

        parse_gemini_response(&resp_body)
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn supports_video(&self) -> bool {
        self.config.provider.supports_video()
    }
}

/// Concatenate the text parts of the first candidate.
pub fn parse_gemini_response(body: &serde_json::Value) -> QaResult<String> {
    let Some(candidate) = body["candidates"].as_array().and_then(|c| c.first()) else {
        let reason = body["promptFeedback"]["blockReason"]
            .as_str()
            .unwrap_or("no candidates returned");
        return Err(QaError::SchemaMismatch(format!(
            "Gemini returned no output: {reason}"
        )));
    };

    let text: String = candidate["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate["finishReason"].as_str().unwrap_or("UNKNOWN");
        return Err(QaError::SchemaMismatch(format!(
            "Gemini returned an empty reply (finishReason: {reason})"
        )));
    }
    Ok(text)
}
