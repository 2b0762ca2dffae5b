//! LLM access layer for qaflow.
//!
//! Provider backends behind the [`LlmBackend`] trait, the retry and failover
//! policies wrapped around them, and [`PromptCallSpec`], the typed
//! schema-validated prompt call every agent is built from.

pub mod backends;
pub mod config;
pub mod failover;
pub mod llm;
pub mod prompt;
pub mod retry;
pub mod schema;
pub mod template;

pub use backends::{GenerationRequest, LlmBackend};
pub use config::{LlmProvider, ModelConfig};
pub use failover::FailoverBackend;
pub use llm::LlmClient;
pub use prompt::PromptCallSpec;
pub use retry::{retry_with_backoff, Jitter, RetryPolicy};
pub use template::{Placeholder, PromptTemplate, RenderedPrompt};
