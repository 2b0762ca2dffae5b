use qaflow_core::QaResult;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// How the backoff delay is randomized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Jitter {
    /// Uniform delay in `[0, ceiling]`.
    #[default]
    Full,
    /// Always wait the full ceiling.
    None,
}

/// Configures retry behaviour for one remote prompt call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff ceiling of the first retry, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Multiplier applied to the ceiling for each further retry.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: u32,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub jitter: Jitter,
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    2_000
}

fn default_backoff_factor() -> u32 {
    2
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
            jitter: Jitter::Full,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Upper bound of the delay before retry number `attempt + 1`.
    pub fn backoff_ceiling(&self, attempt: u32) -> u64 {
        let factor = u64::from(self.backoff_factor.max(1));
        let delay = self
            .initial_delay_ms
            .saturating_mul(factor.saturating_pow(attempt));
        delay.min(self.max_delay_ms)
    }

    /// Actual delay before retry number `attempt + 1`, jitter applied.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        let ms = match self.jitter {
            Jitter::None => ceiling,
            Jitter::Full => rand::thread_rng().gen_range(0..=ceiling),
        };
        Duration::from_millis(ms)
    }
}

/// Run `call` until it succeeds, fails with a non-transient error, or the
/// policy's retries are exhausted.
///
/// `call` receives the zero-based attempt number. Only errors for which
/// [`QaError::is_transient`](qaflow_core::QaError::is_transient) holds are
/// retried.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> QaResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = QaResult<T>>,
{
    let mut attempt = 0;
    loop {
        match call(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.backoff_delay(attempt);
                info!(
                    operation,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Retryable error, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    warn!(operation, attempts = attempt + 1, error = %e, "Retries exhausted");
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use qaflow_core::QaError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fixed_policy() -> RetryPolicy {
        RetryPolicy {
            jitter: Jitter::None,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn backoff_ceilings_double_from_two_seconds() {
        let policy = RetryPolicy::default();
        let ceilings: Vec<u64> = (0..5).map(|a| policy.backoff_ceiling(a)).collect();
        assert_eq!(ceilings, vec![2_000, 4_000, 8_000, 16_000, 32_000]);
        assert!(ceilings.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(policy.backoff_ceiling(10), 60_000); // capped at max
    }

    #[test]
    fn full_jitter_stays_within_ceiling() {
        let policy = RetryPolicy::default();
        for attempt in 0..5 {
            for _ in 0..50 {
                let delay = policy.backoff_delay(attempt).as_millis() as u64;
                assert!(delay <= policy.backoff_ceiling(attempt));
            }
        }
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_retries": 2}"#).unwrap();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.initial_delay_ms, 2_000);
        assert_eq!(policy.jitter, Jitter::Full);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_succeeds_on_second_try() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&fixed_policy(), "test", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(QaError::Api {
                        status: 429,
                        message: "Too Many Requests".into(),
                    })
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_error_retried_five_times_then_surfaced() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let result: QaResult<()> = retry_with_backoff(&fixed_policy(), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(QaError::Http("connection reset".into())) }
        })
        .await;

        assert!(matches!(result, Err(QaError::Http(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 6); // first attempt + 5 retries
        // 2 + 4 + 8 + 16 + 32 seconds of virtual time
        assert_eq!(start.elapsed(), Duration::from_secs(62));
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: QaResult<()> = retry_with_backoff(&fixed_policy(), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(QaError::SchemaMismatch("not json".into())) }
        })
        .await;
        assert!(matches!(result, Err(QaError::SchemaMismatch(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn none_policy_makes_a_single_attempt() {
        let calls = AtomicU32::new(0);
        let result: QaResult<()> = retry_with_backoff(&RetryPolicy::none(), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(QaError::Http("timeout".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
