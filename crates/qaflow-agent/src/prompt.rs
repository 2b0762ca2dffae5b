//! Schema-validated prompt calls.
//!
//! A [`PromptCallSpec`] ties a typed input, a fixed prompt template and a
//! typed output together. Calling it validates the input, renders the
//! template, sends one generation request (retried per the spec's
//! [`RetryPolicy`]) and validates the reply before deserializing it.

use crate::backends::{GenerationRequest, LlmBackend};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::schema::{schema_for, validate};
use crate::template::PromptTemplate;
use qaflow_core::{QaError, QaResult};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use tracing::debug;

/// One immutable remote prompt definition, created once per agent.
#[derive(Debug, Clone)]
pub struct PromptCallSpec<I, O> {
    name: String,
    template: PromptTemplate,
    retry: RetryPolicy,
    temperature: f32,
    input_schema: Value,
    output_schema: Value,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O> PromptCallSpec<I, O>
where
    I: Serialize + JsonSchema,
    O: DeserializeOwned + JsonSchema,
{
    /// Build a spec with the default retry policy and temperature 0.7.
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: PromptTemplate::new(template),
            retry: RetryPolicy::default(),
            temperature: 0.7,
            input_schema: schema_for::<I>(),
            output_schema: schema_for::<O>(),
            _types: PhantomData,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    pub fn output_schema(&self) -> &Value {
        &self.output_schema
    }

    /// Validate `input` and render it into a generation request.
    ///
    /// Fails with [`QaError::Validation`] before anything is sent.
    pub fn prepare(&self, input: &I) -> QaResult<GenerationRequest> {
        let value = serde_json::to_value(input)?;
        validate(&value, &self.input_schema).map_err(|errors| {
            QaError::Validation(format!("{} input: {}", self.name, errors.join("; ")))
        })?;

        let rendered = self.template.render(&value)?;
        Ok(GenerationRequest {
            agent: self.name.clone(),
            prompt: rendered.text,
            media: rendered.media,
            response_schema: Some(self.output_schema.clone()),
            temperature: Some(self.temperature),
        })
    }

    /// Parse a raw model reply into the output type.
    ///
    /// Markdown code fences are stripped; nothing else is coerced.
    pub fn parse_output(&self, raw: &str) -> QaResult<O> {
        let body = strip_code_fences(raw);
        let value: Value = serde_json::from_str(body).map_err(|e| {
            QaError::SchemaMismatch(format!("{} reply is not valid JSON: {e}", self.name))
        })?;

        validate(&value, &self.output_schema).map_err(|errors| {
            QaError::SchemaMismatch(format!("{} reply: {}", self.name, errors.join("; ")))
        })?;

        serde_json::from_value(value)
            .map_err(|e| QaError::SchemaMismatch(format!("{} reply: {e}", self.name)))
    }

    /// Run the full call against `backend`.
    ///
    /// Only the remote step is retried; validation and parsing run once.
    pub async fn call(&self, backend: &dyn LlmBackend, input: &I) -> QaResult<O>
    where
        I: Sync,
    {
        let request = self.prepare(input)?;
        let raw = retry_with_backoff(&self.retry, &self.name, |attempt| {
            debug!(agent = %self.name, attempt, backend = backend.name(), "Sending prompt");
            backend.generate(&request)
        })
        .await?;
        self.parse_output(&raw)
    }
}

/// Remove a surrounding ```` ``` ```` / ```` ```json ```` fence, if present.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
