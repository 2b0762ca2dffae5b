use crate::backends::{GenerationRequest, LlmBackend};
use async_trait::async_trait;
use qaflow_core::{QaError, QaResult};
use tracing::warn;

/// An `LlmBackend` implementation that wraps multiple backends and tries them
/// in order.
///
/// Each backend gets one attempt per request; retries with backoff are the
/// job of the prompt call wrapping this backend. Transient failures and local
/// validation errors (e.g. a backend that cannot accept video) move on to the
/// next backend. Any other error, such as a malformed reply, is returned at
/// once. If every backend fails, the last error is returned, so the caller's
/// retry policy sees the most recent failure class.
pub struct FailoverBackend {
    backends: Vec<Box<dyn LlmBackend>>,
}

impl FailoverBackend {
    /// Create a failover chain: `primary` first, then `fallbacks` in order.
    pub fn new(primary: Box<dyn LlmBackend>, fallbacks: Vec<Box<dyn LlmBackend>>) -> Self {
        let mut backends = Vec::with_capacity(fallbacks.len() + 1);
        backends.push(primary);
        backends.extend(fallbacks);
        Self { backends }
    }
}

#[async_trait]
impl LlmBackend for FailoverBackend {
    async fn generate(&self, request: &GenerationRequest) -> QaResult<String> {
        let mut last_err: Option<QaError> = None;

        for (backend_idx, backend) in self.backends.iter().enumerate() {
            match backend.generate(request).await {
                Ok(text) => return Ok(text),
                Err(e) if !e.is_transient() && !matches!(e, QaError::Validation(_)) => {
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        backend = backend_idx,
                        name = backend.name(),
                        agent = %request.agent,
                        error = %e,
                        "Backend failed, moving to next backend"
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| QaError::Orchestrator("All failover backends exhausted".into())))
    }

    fn name(&self) -> &str {
        "failover"
    }

    /// Video can be sent when any backend in the chain accepts it.
    fn supports_video(&self) -> bool {
        self.backends.iter().any(|b| b.supports_video())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
