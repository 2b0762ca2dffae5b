//! `qaflow.toml` loading.

use anyhow::Context;
use qaflow_agent::{ModelConfig, RetryPolicy};
use qaflow_orchestrator::{SimulatedExecutor, DEFAULT_MAX_VIDEO_BYTES};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Default, Deserialize)]
pub struct QaflowConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize)]
pub struct ExecutorConfig {
    /// Simulated time spent on each subgoal.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
}

impl ExecutorConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_step_delay_ms() -> u64 {
    u64::try_from(SimulatedExecutor::DEFAULT_STEP_DELAY.as_millis()).unwrap_or(u64::MAX)
}
fn default_max_bytes() -> usize {
    DEFAULT_MAX_VIDEO_BYTES
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}

impl QaflowConfig {
    /// Read and parse `path`. A missing file yields the defaults.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read config file '{}'", path.display()))
            }
        };
        let config = Self::parse(&text)
            .with_context(|| format!("Invalid config file '{}'", path.display()))?;
        info!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Fill empty API keys from the process environment.
    pub fn resolve_api_keys(&mut self) {
        self.resolve_api_keys_with(&|var| std::env::var(var).ok());
    }

    fn resolve_api_keys_with<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.model.resolve_api_keys(lookup);
        if self.model.api_key.is_empty() {
            warn!(
                provider = ?self.model.provider,
                vars = ?self.model.provider.api_key_env_vars(),
                "No API key configured; remote calls will be rejected"
            );
        }
    }
}
