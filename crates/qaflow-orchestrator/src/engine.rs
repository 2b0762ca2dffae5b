use crate::agents::{QaAgents, VerifierInput};
use crate::events::{Notification, RunEvent};
use crate::executor::Executor;
use crate::monitor::AgentMonitor;
use crate::run_log::RunLog;
use crate::types::{
    AgentOutput, AgentRole, AgentViewState, AnalysisVerdict, LogActor, LogEntry, LogStatus,
    RunPhase, RunReport, Verdict, VerificationResult,
};
use qaflow_core::{QaError, QaResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 1024;

/// Mutable state of the current (or last) run.
#[derive(Default)]
struct RunState {
    run_id: Option<Uuid>,
    goal: String,
    phase: RunPhase,
    log: RunLog,
    subgoals: Vec<String>,
    verifications: Vec<VerificationResult>,
    analysis: Option<AnalysisVerdict>,
    error: Option<String>,
    cancel: Option<CancellationToken>,
}

/// Read-only view of the orchestrator for presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub run_id: Option<Uuid>,
    pub goal: String,
    pub phase: RunPhase,
    pub agents: Vec<AgentViewState>,
    pub log: Vec<LogEntry>,
    pub subgoals: Vec<String>,
    pub verifications: Vec<VerificationResult>,
    pub analysis: Option<AnalysisVerdict>,
    pub error: Option<String>,
}

/// A run started in the background by [`Orchestrator::try_start`].
pub struct RunHandle {
    pub run_id: Uuid,
    pub task: JoinHandle<QaResult<RunReport>>,
}

/// The QA run orchestrator.
///
/// Implements the plan → (execute → verify)* → analyse pipeline with a
/// continue-and-aggregate policy: a failed verification is logged and the
/// loop moves on. Exactly one run executes at a time.
pub struct Orchestrator {
    agents: Arc<QaAgents>,
    executor: Arc<dyn Executor>,
    monitor: Arc<AgentMonitor>,
    state: Arc<RwLock<RunState>>,
    events: broadcast::Sender<RunEvent>,
    run_lock: Arc<Mutex<()>>,
}

impl Orchestrator {
    pub fn new(agents: Arc<QaAgents>, executor: Arc<dyn Executor>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            agents,
            executor,
            monitor: Arc::new(AgentMonitor::new()),
            state: Arc::new(RwLock::new(RunState::default())),
            events,
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn agents(&self) -> &Arc<QaAgents> {
        &self.agents
    }

    /// Get a reference to the monitor.
    pub fn monitor(&self) -> &Arc<AgentMonitor> {
        &self.monitor
    }

    /// Subscribe to run events. Slow receivers may observe `Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    pub async fn snapshot(&self) -> RunSnapshot {
        let agents = self.monitor.snapshot().await;
        let state = self.state.read().await;
        RunSnapshot {
            run_id: state.run_id,
            goal: state.goal.clone(),
            phase: state.phase,
            agents,
            log: state.log.entries().to_vec(),
            subgoals: state.subgoals.clone(),
            verifications: state.verifications.clone(),
            analysis: state.analysis.clone(),
            error: state.error.clone(),
        }
    }

    /// Request cancellation of the active run. Returns false when idle.
    pub async fn cancel(&self) -> bool {
        let state = self.state.read().await;
        match &state.cancel {
            Some(token) => {
                info!(run_id = ?state.run_id, "Orchestrator: cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Run the full pipeline for `goal` and wait for it to finish.
    pub async fn run(&self, goal: &str) -> QaResult<RunReport> {
        self.run_with_cancel(goal, CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), stopping at the next suspension point once
    /// `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        goal: &str,
        cancel: CancellationToken,
    ) -> QaResult<RunReport> {
        let goal = validate_goal(goal)?;
        let _guard = self.run_lock.try_lock().map_err(|_| busy())?;
        let run_id = Uuid::new_v4();
        self.begin(run_id, &goal, cancel.clone()).await;
        self.run_locked(run_id, goal, cancel).await
    }

    /// Start a run on the Tokio runtime and return immediately.
    ///
    /// Rejections (empty goal, run already active) are reported here, before
    /// anything is spawned. The run is registered before this returns, so a
    /// [`cancel`](Self::cancel) issued right after always reaches it.
    pub async fn try_start(self: &Arc<Self>, goal: &str) -> QaResult<RunHandle> {
        let goal = validate_goal(goal)?;
        let guard = self.run_lock.clone().try_lock_owned().map_err(|_| busy())?;
        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        self.begin(run_id, &goal, cancel.clone()).await;
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let _guard = guard;
            this.run_locked(run_id, goal, cancel).await
        });
        Ok(RunHandle { run_id, task })
    }

    async fn run_locked(
        &self,
        run_id: Uuid,
        goal: String,
        cancel: CancellationToken,
    ) -> QaResult<RunReport> {
        let start = Instant::now();
        info!(run_id = %run_id, goal = %goal, "Orchestrator: starting run");

        match self.pipeline(run_id, &goal, &cancel).await {
            Ok(analysis) => {
                let report = self.finish(run_id, &goal, analysis, start).await;
                info!(
                    run_id = %run_id,
                    verdict = %report.analysis.overall_verdict,
                    duration_ms = report.duration_ms,
                    "Orchestrator: run complete"
                );
                Ok(report)
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Orchestrator: run failed");
                self.abort(run_id, &e).await;
                Err(e)
            }
        }
    }

    /// Reset all state for a new run and register its cancellation token.
    async fn begin(&self, run_id: Uuid, goal: &str, cancel: CancellationToken) {
        {
            let mut state = self.state.write().await;
            state.log.clear();
            state.run_id = Some(run_id);
            state.goal = goal.to_string();
            state.phase = RunPhase::Idle;
            state.subgoals.clear();
            state.verifications.clear();
            state.analysis = None;
            state.error = None;
            state.cancel = Some(cancel);
        }
        for agent in self.monitor.reset().await {
            self.emit(RunEvent::Agent { run_id, agent });
        }
    }

    async fn pipeline(
        &self,
        run_id: Uuid,
        goal: &str,
        cancel: &CancellationToken,
    ) -> QaResult<AnalysisVerdict> {
        // Phase 1: Plan
        self.set_phase(run_id, RunPhase::PlannerRunning).await;
        self.start_agent(run_id, AgentRole::Planner, None).await;
        self.log(run_id, LogActor::System, "Starting test...", LogStatus::Info)
            .await;
        self.log(
            run_id,
            AgentRole::Planner,
            format!("Generating plan for goal: \"{goal}\""),
            LogStatus::Info,
        )
        .await;

        let subgoals = guarded(cancel, self.agents.plan(goal)).await?;
        let total = subgoals.len();
        info!(run_id = %run_id, subgoal_count = total, "Orchestrator: plan complete");

        self.state.write().await.subgoals = subgoals.clone();
        self.complete_agent(run_id, AgentRole::Planner, AgentOutput::Lines(subgoals.clone()))
            .await;
        self.log(
            run_id,
            AgentRole::Planner,
            format!("Generated {total} subgoals."),
            LogStatus::Success,
        )
        .await;
        self.set_phase(run_id, RunPhase::PlannerDone).await;

        // Phase 2: Execute and verify each subgoal in order
        self.start_agent(
            run_id,
            AgentRole::Executor,
            Some(AgentOutput::Text(format!(
                "Starting execution of {total} subgoals..."
            ))),
        )
        .await;

        let mut verifier_lines = Vec::with_capacity(total);
        for (index, subgoal) in subgoals.iter().enumerate() {
            self.set_phase(run_id, RunPhase::ExecutorRunning { index }).await;
            let progress = format!("Executing subgoal {}/{total}: {subgoal}", index + 1);
            self.start_agent(run_id, AgentRole::Executor, Some(AgentOutput::Text(progress.clone())))
                .await;
            self.log(run_id, AgentRole::Executor, progress, LogStatus::Info)
                .await;

            let outcome = guarded(cancel, self.executor.execute(subgoal, index, total)).await?;
            self.log(run_id, AgentRole::Executor, outcome.ui_state.clone(), LogStatus::Info)
                .await;

            self.set_phase(run_id, RunPhase::VerifierRunning { index }).await;
            self.start_agent(run_id, AgentRole::Verifier, None).await;
            let input = VerifierInput {
                planner_goal: subgoal.clone(),
                executor_result: outcome.result,
                ui_state: outcome.ui_state,
                expected_state: outcome.expected_state,
            };
            let verdict = guarded(cancel, self.agents.verify(&input)).await?;
            let verification = VerificationResult {
                subgoal: subgoal.clone(),
                state_matches: verdict.state_matches_expectation,
                bug_detected: verdict.functional_bug_detected,
                reasoning: verdict.reasoning,
            };

            if !verification.passed() {
                warn!(
                    run_id = %run_id,
                    subgoal = %subgoal,
                    bug_detected = verification.bug_detected,
                    "Verification failed, continuing"
                );
            }
            let status = if verification.passed() {
                LogStatus::Success
            } else {
                LogStatus::Failure
            };
            self.log(
                run_id,
                AgentRole::Verifier,
                format!(
                    "Verification for \"{subgoal}\": {}",
                    verification.reasoning
                ),
                status,
            )
            .await;

            verifier_lines.push(format!("{subgoal}: {}", verification.outcome_label()));
            self.start_agent(
                run_id,
                AgentRole::Verifier,
                Some(AgentOutput::Lines(verifier_lines.clone())),
            )
            .await;
            self.state.write().await.verifications.push(verification);
        }

        self.complete_agent(
            run_id,
            AgentRole::Executor,
            AgentOutput::Text(format!("Completed all {total} subgoals.")),
        )
        .await;
        if total > 0 {
            self.complete_agent(run_id, AgentRole::Verifier, AgentOutput::Lines(verifier_lines))
                .await;
        }
        self.log(run_id, AgentRole::Executor, "All subgoals executed.", LogStatus::Success)
            .await;

        // Phase 3: Analyse the whole episode
        self.set_phase(run_id, RunPhase::AnalysisRunning).await;
        self.start_agent(run_id, AgentRole::Analysis, None).await;
        let full_log = self.state.read().await.log.to_text();
        self.log(
            run_id,
            AgentRole::Analysis,
            "Reviewing full test episode...",
            LogStatus::Info,
        )
        .await;

        guarded(cancel, self.agents.analyze(goal, &full_log)).await
    }

    async fn finish(
        &self,
        run_id: Uuid,
        goal: &str,
        analysis: AnalysisVerdict,
        start: Instant,
    ) -> RunReport {
        self.complete_agent(run_id, AgentRole::Analysis, analysis_output(&analysis))
            .await;

        for v in &analysis.verification_results {
            let status = if v.state_matches {
                LogStatus::Success
            } else {
                LogStatus::Failure
            };
            self.log(
                run_id,
                AgentRole::Analysis,
                format!("Analysis of \"{}\": {}", v.subgoal, v.reasoning),
                status,
            )
            .await;
        }
        self.log(
            run_id,
            AgentRole::Analysis,
            format!(
                "Overall Verdict: {}. {}",
                analysis.overall_verdict, analysis.suggested_improvements
            ),
            LogStatus::Info,
        )
        .await;

        let passed = analysis.overall_verdict == Verdict::Passed;
        let (outcome, status) = if passed {
            ("completed", LogStatus::Success)
        } else {
            ("failed", LogStatus::Failure)
        };
        self.log(run_id, LogActor::System, format!("Test run {outcome}."), status)
            .await;

        let report = {
            let mut state = self.state.write().await;
            state.phase = RunPhase::Done;
            state.analysis = Some(analysis.clone());
            state.cancel = None;
            RunReport {
                run_id,
                goal: goal.to_string(),
                subgoals: state.subgoals.clone(),
                verifications: state.verifications.clone(),
                analysis,
                passed,
                log: state.log.entries().to_vec(),
                duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            }
        };
        self.emit(RunEvent::Phase {
            run_id,
            phase: RunPhase::Done,
        });
        self.emit(RunEvent::Notification {
            run_id,
            notification: Notification::info(
                "Test Complete",
                format!("The test run has {outcome}."),
            ),
        });
        report
    }

    /// The single error boundary of a run.
    async fn abort(&self, run_id: Uuid, err: &QaError) {
        let message = err.to_string();
        for agent in self.monitor.fail_running(&message).await {
            self.emit(RunEvent::Agent { run_id, agent });
        }
        self.log(
            run_id,
            LogActor::System,
            format!("An error occurred: {message}"),
            LogStatus::Failure,
        )
        .await;
        {
            let mut state = self.state.write().await;
            state.phase = RunPhase::Error;
            state.error = Some(message);
            state.cancel = None;
        }
        self.emit(RunEvent::Phase {
            run_id,
            phase: RunPhase::Error,
        });
        self.emit(RunEvent::Notification {
            run_id,
            notification: Notification::error(
                "An Error Occurred",
                "The test run was aborted. Check logs for details.",
            ),
        });
    }

    async fn set_phase(&self, run_id: Uuid, phase: RunPhase) {
        self.state.write().await.phase = phase;
        self.emit(RunEvent::Phase { run_id, phase });
    }

    async fn log(
        &self,
        run_id: Uuid,
        agent: impl Into<LogActor>,
        details: impl Into<String>,
        status: LogStatus,
    ) {
        let entry = self
            .state
            .write()
            .await
            .log
            .append(agent, details, status)
            .clone();
        self.emit(RunEvent::Log { run_id, entry });
    }

    async fn start_agent(&self, run_id: Uuid, role: AgentRole, output: Option<AgentOutput>) {
        if let Some(agent) = self.monitor.start(role, output).await {
            self.emit(RunEvent::Agent { run_id, agent });
        }
    }

    async fn complete_agent(&self, run_id: Uuid, role: AgentRole, output: AgentOutput) {
        if let Some(agent) = self.monitor.complete(role, output).await {
            self.emit(RunEvent::Agent { run_id, agent });
        }
    }

    fn emit(&self, event: RunEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn validate_goal(goal: &str) -> QaResult<String> {
    let goal = goal.trim();
    if goal.is_empty() {
        return Err(QaError::UserInput(
            "Goal is required: please enter a QA goal.".into(),
        ));
    }
    Ok(goal.to_string())
}

fn busy() -> QaError {
    QaError::UserInput("A test run is already in progress.".into())
}

/// Await `fut` unless `cancel` fires first.
async fn guarded<T, F>(cancel: &CancellationToken, fut: F) -> QaResult<T>
where
    F: Future<Output = QaResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(QaError::Cancelled),
        result = fut => result,
    }
}

/// Card text of the Analysis agent.
fn analysis_output(analysis: &AnalysisVerdict) -> AgentOutput {
    let mut lines = vec![
        format!("Overall Verdict: {}", analysis.overall_verdict),
        "---".to_string(),
        "Verification Details:".to_string(),
    ];
    lines.extend(analysis.verification_results.iter().map(|v| {
        let outcome = if v.state_matches { "Passed" } else { "Failed" };
        format!("- {}: {outcome} ({})", v.subgoal, v.reasoning)
    }));
    lines.push("---".to_string());
    lines.push("Suggested Improvements:".to_string());
    lines.push(analysis.suggested_improvements.clone());
    AgentOutput::Lines(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_goal_trims() {
        assert_eq!(validate_goal("  Test login flow \n").unwrap(), "Test login flow");
        assert!(matches!(validate_goal("   "), Err(QaError::UserInput(_))));
    }

    #[test]
    fn test_analysis_output_layout() {
        let analysis = AnalysisVerdict {
            verification_results: vec![VerificationResult {
                subgoal: "Submit".into(),
                state_matches: false,
                bug_detected: true,
                reasoning: "Spinner never stops".into(),
            }],
            overall_verdict: Verdict::BugDetected,
            suggested_improvements: "Add a timeout check".into(),
        };
        let AgentOutput::Lines(lines) = analysis_output(&analysis) else {
            panic!("expected lines");
        };
        assert_eq!(lines[0], "Overall Verdict: Bug Detected");
        assert_eq!(lines[3], "- Submit: Failed (Spinner never stops)");
        assert_eq!(lines.last().unwrap(), "Add a timeout check");
    }

    #[tokio::test]
    async fn test_guarded_short_circuits_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let result: QaResult<()> = guarded(&token, async { Ok(()) }).await;
        assert!(matches!(result, Err(QaError::Cancelled)));
    }

    #[tokio::test]
    async fn test_run_snapshot_serializes_camel_case() {
        let snapshot = RunSnapshot {
            run_id: None,
            goal: String::new(),
            phase: RunPhase::Idle,
            agents: AgentMonitor::new().snapshot().await,
            log: Vec::new(),
            subgoals: Vec::new(),
            verifications: Vec::new(),
            analysis: None,
            error: None,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json.get("runId").is_some());
        assert_eq!(json["phase"]["phase"], "idle");
    }
}
