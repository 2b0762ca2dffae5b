use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Google Gemini `generateContent` API. Accepts inline video.
    Gemini,
    Claude,
    OpenAi,
    OpenRouter,
    /// Groq cloud inference (OpenAI-compatible API).
    Groq,
}

impl LlmProvider {
    /// Environment variables consulted, in order, when the configured
    /// `api_key` is empty.
    pub fn api_key_env_vars(&self) -> &'static [&'static str] {
        match self {
            LlmProvider::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            LlmProvider::Claude => &["ANTHROPIC_API_KEY"],
            LlmProvider::OpenAi => &["OPENAI_API_KEY"],
            LlmProvider::OpenRouter => &["OPENROUTER_API_KEY"],
            LlmProvider::Groq => &["GROQ_API_KEY"],
        }
    }

    /// Whether the provider accepts video attachments.
    pub fn supports_video(&self) -> bool {
        matches!(self, LlmProvider::Gemini)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: LlmProvider,
    pub model_id: String,
    #[serde(default)]
    pub api_key: String,
    pub api_base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Tried in order when the primary model fails.
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    8192
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Gemini,
            model_id: "gemini-2.0-flash".to_string(),
            api_key: String::new(),
            api_base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            fallback_models: Vec::new(),
        }
    }
}

impl ModelConfig {
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url.trim_end_matches('/')
        } else {
            match self.provider {
                LlmProvider::Gemini => "https://generativelanguage.googleapis.com",
                LlmProvider::Claude => "https://api.anthropic.com",
                LlmProvider::OpenAi => "https://api.openai.com",
                LlmProvider::OpenRouter => "https://openrouter.ai/api",
                LlmProvider::Groq => "https://api.groq.com/openai",
            }
        }
    }

    /// Fill empty API keys (including fallbacks) from the provider's
    /// environment variables, using `lookup` to read them.
    pub fn resolve_api_keys<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.is_empty() {
            if let Some(key) = self
                .provider
                .api_key_env_vars()
                .iter()
                .find_map(|var| lookup(var).filter(|v| !v.is_empty()))
            {
                self.api_key = key;
            }
        }
        for fallback in &mut self.fallback_models {
            fallback.resolve_api_keys(lookup);
        }
    }
}
