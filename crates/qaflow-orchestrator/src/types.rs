use chrono::{DateTime, Local, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Role of each agent in the QA pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgentRole {
    /// Decomposes a test goal into ordered subgoals.
    Planner,
    /// Plays subgoals against the (simulated) UI.
    Executor,
    /// Checks the UI state after each subgoal.
    Verifier,
    /// Reviews the whole episode and gives the verdict.
    Analysis,
    /// Suggests prompt improvements over a recorded episode.
    Supervisor,
    /// Turns a screen recording and a description into a test prompt.
    TaskPromptGenerator,
}

impl AgentRole {
    /// Agents shown as cards while a run is in progress, in display order.
    pub const DISPLAYED: [AgentRole; 4] = [
        AgentRole::Planner,
        AgentRole::Executor,
        AgentRole::Verifier,
        AgentRole::Analysis,
    ];

    /// Dashboard key.
    pub fn key(&self) -> &'static str {
        match self {
            AgentRole::Planner => "planner",
            AgentRole::Executor => "executor",
            AgentRole::Verifier => "verifier",
            AgentRole::Analysis => "analysis",
            AgentRole::Supervisor => "supervisor",
            AgentRole::TaskPromptGenerator => "taskPromptGenerator",
        }
    }

    /// Short name used in log entries.
    pub fn label(&self) -> &'static str {
        match self {
            AgentRole::Planner => "Planner",
            AgentRole::Executor => "Executor",
            AgentRole::Verifier => "Verifier",
            AgentRole::Analysis => "Analysis",
            AgentRole::Supervisor => "Supervisor",
            AgentRole::TaskPromptGenerator => "Task Prompt Generator",
        }
    }

    /// Card title.
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentRole::Planner => "Planner Agent",
            AgentRole::Executor => "Executor Agent",
            AgentRole::Verifier => "Verifier Agent",
            AgentRole::Analysis => "Analysis Agent",
            AgentRole::Supervisor => "Supervisor Agent",
            AgentRole::TaskPromptGenerator => "Task Prompt Generator",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AgentRole::Planner => "Decomposes high-level goals into actionable subgoals.",
            AgentRole::Executor => "Executes subgoals in the UI environment.",
            AgentRole::Verifier => "Checks the UI state after each subgoal against expectations.",
            AgentRole::Analysis => {
                "Verifies all steps, detects bugs, and suggests test improvements."
            }
            AgentRole::Supervisor => "Suggests improvements to test prompts and plans.",
            AgentRole::TaskPromptGenerator => {
                "Generates test prompts from recorded user sessions."
            }
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Lifecycle of one agent card within a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

impl AgentStatus {
    /// Status only moves forward: idle → running → completed | error.
    /// Staying in `running` is allowed so the output can be refreshed.
    pub fn can_transition_to(self, next: AgentStatus) -> bool {
        matches!(
            (self, next),
            (AgentStatus::Idle, AgentStatus::Running)
                | (AgentStatus::Running, AgentStatus::Running)
                | (AgentStatus::Running, AgentStatus::Completed)
                | (AgentStatus::Running, AgentStatus::Error)
        )
    }
}

/// What an agent card shows: a single line or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentOutput {
    Text(String),
    Lines(Vec<String>),
}

impl AgentOutput {
    /// Render for a terminal, one item per line.
    pub fn to_lines(&self) -> Vec<String> {
        match self {
            AgentOutput::Text(text) => vec![text.clone()],
            AgentOutput::Lines(lines) => lines.clone(),
        }
    }
}

/// Real-time view of one agent, as shown on its card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentViewState {
    pub role: AgentRole,
    pub name: String,
    pub description: String,
    pub status: AgentStatus,
    pub output: Option<AgentOutput>,
    pub error: Option<String>,
}

impl AgentViewState {
    pub fn idle(role: AgentRole) -> Self {
        Self {
            role,
            name: role.display_name().to_string(),
            description: role.description().to_string(),
            status: AgentStatus::Idle,
            output: None,
            error: None,
        }
    }
}

/// Outcome class of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Info,
    Success,
    Failure,
}

/// Who wrote a log entry. Serialized as its label (`"System"`, `"Planner"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogActor {
    System,
    Agent(AgentRole),
}

impl LogActor {
    pub fn label(&self) -> &'static str {
        match self {
            LogActor::System => "System",
            LogActor::Agent(role) => role.label(),
        }
    }
}

impl std::fmt::Display for LogActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl From<AgentRole> for LogActor {
    fn from(role: AgentRole) -> Self {
        LogActor::Agent(role)
    }
}

impl Serialize for LogActor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for LogActor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        if label == "System" {
            return Ok(LogActor::System);
        }
        [
            AgentRole::Planner,
            AgentRole::Executor,
            AgentRole::Verifier,
            AgentRole::Analysis,
            AgentRole::Supervisor,
            AgentRole::TaskPromptGenerator,
        ]
        .into_iter()
        .find(|role| role.label() == label)
        .map(LogActor::Agent)
        .ok_or_else(|| serde::de::Error::custom(format!("unknown log actor `{label}`")))
    }
}

/// One append-only record of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// 1-based, strictly increasing within a run.
    pub step: u32,
    pub agent: LogActor,
    pub details: String,
    pub status: LogStatus,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    /// `[HH:MM:SS] Agent: details`, local time.
    pub fn to_line(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.timestamp.with_timezone(&Local).format("%H:%M:%S"),
            self.agent,
            self.details
        )
    }
}

/// Where the current run is in the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    PlannerRunning,
    PlannerDone,
    /// `index` is zero-based into the subgoal list.
    ExecutorRunning {
        index: usize,
    },
    VerifierRunning {
        index: usize,
    },
    AnalysisRunning,
    Done,
    Error,
}

impl RunPhase {
    pub fn is_active(&self) -> bool {
        !matches!(self, RunPhase::Idle | RunPhase::Done | RunPhase::Error)
    }
}

/// Per-subgoal verification, as reported by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VerificationResult {
    /// The subgoal that was being executed.
    #[schemars(length(min = 1))]
    pub subgoal: String,
    /// Whether the UI state matched the expected state for the subgoal.
    #[serde(rename = "stateMatchesExpectation")]
    pub state_matches: bool,
    /// Whether a functional bug was detected.
    #[serde(rename = "functionalBugDetected", default)]
    pub bug_detected: bool,
    /// The reasoning behind the verification result for this subgoal.
    pub reasoning: String,
}

impl VerificationResult {
    pub fn passed(&self) -> bool {
        self.state_matches && !self.bug_detected
    }

    pub fn outcome_label(&self) -> &'static str {
        if self.bug_detected {
            "Bug Detected"
        } else if self.state_matches {
            "Passed"
        } else {
            "Failed"
        }
    }
}

/// Final verdict of a test episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Verdict {
    Passed,
    Failed,
    #[serde(rename = "Bug Detected")]
    BugDetected,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Passed => write!(f, "Passed"),
            Verdict::Failed => write!(f, "Failed"),
            Verdict::BugDetected => write!(f, "Bug Detected"),
        }
    }
}

/// Output of the Analysis agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisVerdict {
    /// One verification result per executed subgoal.
    pub verification_results: Vec<VerificationResult>,
    /// The final verdict for the entire test episode.
    pub overall_verdict: Verdict,
    /// Suggested improvements to the test prompts, plans, or overall strategy.
    pub suggested_improvements: String,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub goal: String,
    pub subgoals: Vec<String>,
    pub verifications: Vec<VerificationResult>,
    pub analysis: AnalysisVerdict,
    /// True when the overall verdict is `Passed`.
    pub passed: bool,
    pub log: Vec<LogEntry>,
    pub duration_ms: u64,
}
