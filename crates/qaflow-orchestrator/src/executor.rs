use async_trait::async_trait;
use qaflow_core::QaResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// What the Executor observed after playing one subgoal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    /// Summary of the action taken.
    pub result: String,
    /// UI state text after the action.
    pub ui_state: String,
    /// UI state the subgoal should have produced.
    pub expected_state: String,
}

/// Plays one subgoal against a UI.
///
/// `index` is zero-based; `total` is the number of subgoals in the plan.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, subgoal: &str, index: usize, total: usize)
        -> QaResult<ExecutionOutcome>;
}

/// Executor that waits a fixed delay and reports a mock UI state.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    step_delay: Duration,
}

impl SimulatedExecutor {
    pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(1000);

    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }

    pub fn step_delay(&self) -> Duration {
        self.step_delay
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_STEP_DELAY)
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    async fn execute(
        &self,
        subgoal: &str,
        index: usize,
        total: usize,
    ) -> QaResult<ExecutionOutcome> {
        let delay_ms = u64::try_from(self.step_delay.as_millis()).unwrap_or(u64::MAX);
        debug!(index, total, delay_ms, "Simulating subgoal");
        tokio::time::sleep(self.step_delay).await;
        Ok(ExecutionOutcome {
            result: format!("Executed subgoal {}/{total}: {subgoal}", index + 1),
            ui_state: format!("Mock UI state after executing: {subgoal}"),
            expected_state: format!("UI reflects the completed step: {subgoal}"),
        })
    }
}
