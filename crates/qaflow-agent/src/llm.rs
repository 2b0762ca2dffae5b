use crate::backends::claude::ClaudeBackend;
use crate::backends::gemini::GeminiBackend;
use crate::backends::openai::OpenAiBackend;
use crate::backends::{GenerationRequest, LlmBackend};
use crate::config::{LlmProvider, ModelConfig};
use crate::failover::FailoverBackend;
use async_trait::async_trait;
use qaflow_core::QaResult;

/// LLM client that dispatches to the correct provider backend.
///
/// Uses the `LlmBackend` trait to abstract away provider-specific API differences.
/// When `fallback_models` are configured the client wraps every model in a
/// [`FailoverBackend`], primary first.
pub struct LlmClient {
    backend: Box<dyn LlmBackend>,
}

impl LlmClient {
    pub fn new(config: ModelConfig) -> Self {
        if config.fallback_models.is_empty() {
            return Self {
                backend: provider_backend(config),
            };
        }

        let mut primary = config;
        let fallbacks = std::mem::take(&mut primary.fallback_models)
            .into_iter()
            .map(provider_backend)
            .collect();

        Self {
            backend: Box::new(FailoverBackend::new(provider_backend(primary), fallbacks)),
        }
    }

    /// Create from a pre-built backend (for custom/external providers).
    pub fn from_backend(backend: Box<dyn LlmBackend>) -> Self {
        Self { backend }
    }
}

fn provider_backend(config: ModelConfig) -> Box<dyn LlmBackend> {
    match config.provider {
        LlmProvider::Gemini => Box::new(GeminiBackend::new(config)),
        LlmProvider::Claude => Box::new(ClaudeBackend::new(config)),
        LlmProvider::OpenAi | LlmProvider::OpenRouter | LlmProvider::Groq => {
            Box::new(OpenAiBackend::new(config))
        }
    }
}

#[async_trait]
impl LlmBackend for LlmClient {
    async fn generate(&self, request: &GenerationRequest) -> QaResult<String> {
        self.backend.generate(request).await
    }

    fn name(&self) -> &str {
        self.backend.name()
    }

    fn supports_video(&self) -> bool {
        self.backend.supports_video()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: LlmProvider) -> ModelConfig {
        ModelConfig {
            provider,
            model_id: "m".to_string(),
            api_key: "k".to_string(),
            api_base_url: None,
            temperature: 0.7,
            max_tokens: 1024,
            fallback_models: Vec::new(),
        }
    }

    #[test]
    fn test_single_provider_dispatch() {
        assert_eq!(LlmClient::new(config(LlmProvider::Gemini)).name(), "gemini");
        assert_eq!(LlmClient::new(config(LlmProvider::Claude)).name(), "claude");
        assert_eq!(LlmClient::new(config(LlmProvider::OpenRouter)).name(), "openrouter");
    }

    #[test]
    fn test_fallbacks_build_failover_chain() {
        let mut cfg = config(LlmProvider::Gemini);
        cfg.fallback_models.push(config(LlmProvider::OpenAi));
        assert_eq!(LlmClient::new(cfg).name(), "failover");
    }

    #[test]
    fn test_video_support_follows_the_chain() {
        assert!(LlmClient::new(config(LlmProvider::Gemini)).supports_video());
        assert!(!LlmClient::new(config(LlmProvider::OpenAi)).supports_video());

        let mut text_only = config(LlmProvider::Claude);
        text_only.fallback_models.push(config(LlmProvider::Groq));
        assert!(!LlmClient::new(text_only).supports_video());

        let mut with_gemini = config(LlmProvider::OpenRouter);
        with_gemini.fallback_models.push(config(LlmProvider::Gemini));
        assert!(LlmClient::new(with_gemini).supports_video());
    }
}
