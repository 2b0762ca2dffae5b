//! Prompt definitions of every LLM-backed agent.
//!
//! Each agent is one [`PromptCallSpec`]: a typed input, a fixed template, a
//! typed output and a temperature. The Executor is not listed here; it is
//! simulated (see [`crate::executor`]).

use crate::types::AnalysisVerdict;
use qaflow_agent::{LlmBackend, PromptCallSpec, RetryPolicy};
use qaflow_core::QaResult;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlannerInput {
    /// The high-level test goal to decompose.
    #[schemars(length(min = 1))]
    pub test_goal: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlannerOutput {
    /// The sequence of actionable subgoals.
    pub subgoals: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifierInput {
    /// The subgoal set by the planner agent.
    #[schemars(length(min = 1))]
    pub planner_goal: String,
    /// The result of the action executed by the executor agent.
    #[schemars(length(min = 1))]
    pub executor_result: String,
    /// The current UI state.
    #[schemars(length(min = 1))]
    pub ui_state: String,
    /// The expected state of the UI.
    #[schemars(length(min = 1))]
    pub expected_state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifierOutput {
    /// Whether the current UI state matches the expected state.
    pub state_matches_expectation: bool,
    /// Whether a functional bug was detected (e.g. missing screen, wrong toggle state).
    #[serde(default)]
    pub functional_bug_detected: bool,
    /// The reasoning behind the verification result.
    pub reasoning: String,
}

/// Input shared by the Analysis and Supervisor agents.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeInput {
    /// The original high-level test goal.
    #[schemars(length(min = 1))]
    pub test_goal: String,
    /// The complete execution log of the test.
    #[schemars(length(min = 1))]
    pub full_log: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorOutput {
    /// Suggested improvements to the test prompts or plans.
    pub suggested_improvements: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskPromptInput {
    /// A recording of a user session as a `data:<mime>;base64,<data>` URI.
    #[schemars(length(min = 1))]
    pub video_data_uri: String,
    /// The description of the user session.
    #[schemars(length(min = 1))]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskPromptOutput {
    /// The generated task prompt for the user session.
    pub task_prompt: String,
}

const PLANNER_PROMPT: &str = r#"You are a QA engineer. Decompose the following high-level test goal into a sequence of actionable subgoals.

Test Goal: {{testGoal}}

Subgoals:"#;

const VERIFIER_PROMPT: &str = r#"You are a QA engineer specializing in verifying the state of mobile applications after actions are performed.

You will receive the planner goal, the executor result, the current UI state, and the expected UI state.

Your task is to determine if the current UI state matches the expected UI state. You should also identify if there is a functional bug (e.g., missing screen, wrong toggle state).

Planner Goal: {{plannerGoal}}
Executor Result: {{executorResult}}
Current UI State: {{uiState}}
Expected UI State: {{expectedState}}

Based on the above information, determine if the current state matches the expectation and if a functional bug was detected. Provide your reasoning for your determination.

Output your answer in JSON format:
{
  "stateMatchesExpectation": true/false,
  "functionalBugDetected": true/false,
  "reasoning": "..."
}
"#;

const ANALYSIS_PROMPT: &str = r#"You are a lead QA engineer analyzing a completed test episode. Your task is to do two things:
1.  **Verify each step**: For each subgoal executed, determine if the outcome was a success or failure based on the logs. Identify any functional bugs.
2.  **Supervise and Suggest**: Based on the entire test run, provide an overall verdict and suggest improvements to the testing process.

Original Test Goal: {{testGoal}}

Full Execution Log:
{{fullLog}}

Analyze the log and provide your full analysis in the required JSON format. For each subgoal in the log, provide a verification result.
"#;

const SUPERVISOR_PROMPT: &str = r#"You are a lead QA engineer supervising a test run. Based on the original goal and the full execution log, suggest improvements to the test prompts, plans, or overall testing strategy.

Original Test Goal: {{testGoal}}

Full Execution Log:
{{fullLog}}

Provide your suggested improvements.
"#;

const TASK_PROMPT_GENERATOR_PROMPT: &str = r#"You are an expert QA analyst specializing in generating task prompts from video examples of user sessions.

You will use this information to generate a task prompt that can be used to automate the creation of realistic test scenarios based on real-world usage.

Use the following as the primary source of information about the user session.

Description: {{description}}
Video: {{media videoDataUri}}"#;

/// The fixed set of LLM agents, bound to one backend.
pub struct QaAgents {
    backend: Arc<dyn LlmBackend>,
    planner: PromptCallSpec<PlannerInput, PlannerOutput>,
    verifier: PromptCallSpec<VerifierInput, VerifierOutput>,
    analysis: PromptCallSpec<EpisodeInput, AnalysisVerdict>,
    supervisor: PromptCallSpec<EpisodeInput, SupervisorOutput>,
    task_prompt: PromptCallSpec<TaskPromptInput, TaskPromptOutput>,
}

impl QaAgents {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            planner: PromptCallSpec::new("planner", PLANNER_PROMPT).with_temperature(0.4),
            verifier: PromptCallSpec::new("verifier", VERIFIER_PROMPT).with_temperature(0.2),
            analysis: PromptCallSpec::new("analysis", ANALYSIS_PROMPT).with_temperature(0.3),
            supervisor: PromptCallSpec::new("supervisor", SUPERVISOR_PROMPT)
                .with_temperature(0.5),
            // Video generation is a single attempt.
            task_prompt: PromptCallSpec::new("taskPromptGenerator", TASK_PROMPT_GENERATOR_PROMPT)
                .with_temperature(0.7)
                .with_retry(RetryPolicy::none()),
        }
    }

    /// Replace the retry policy of the retried agents (all but the
    /// Task-Prompt-Generator).
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.planner = self.planner.with_retry(policy);
        self.verifier = self.verifier.with_retry(policy);
        self.analysis = self.analysis.with_retry(policy);
        self.supervisor = self.supervisor.with_retry(policy);
        self
    }

    pub fn backend(&self) -> &Arc<dyn LlmBackend> {
        &self.backend
    }

    pub fn planner(&self) -> &PromptCallSpec<PlannerInput, PlannerOutput> {
        &self.planner
    }

    pub fn task_prompt(&self) -> &PromptCallSpec<TaskPromptInput, TaskPromptOutput> {
        &self.task_prompt
    }

    /// Decompose `goal` into ordered subgoals.
    pub async fn plan(&self, goal: &str) -> QaResult<Vec<String>> {
        let input = PlannerInput {
            test_goal: goal.to_string(),
        };
        let output = self.planner.call(self.backend.as_ref(), &input).await?;
        Ok(output.subgoals)
    }

    pub async fn verify(&self, input: &VerifierInput) -> QaResult<VerifierOutput> {
        self.verifier.call(self.backend.as_ref(), input).await
    }

    /// Review a finished episode and produce the verdict.
    pub async fn analyze(&self, goal: &str, full_log: &str) -> QaResult<AnalysisVerdict> {
        let input = EpisodeInput {
            test_goal: goal.to_string(),
            full_log: full_log.to_string(),
        };
        self.analysis.call(self.backend.as_ref(), &input).await
    }

    /// Suggest prompt improvements for a recorded episode.
    pub async fn supervise(&self, goal: &str, full_log: &str) -> QaResult<String> {
        let input = EpisodeInput {
            test_goal: goal.trim().to_string(),
            full_log: full_log.to_string(),
        };
        info!(goal = %input.test_goal, log_bytes = full_log.len(), "Supervisor: reviewing episode");
        let output = self.supervisor.call(self.backend.as_ref(), &input).await?;
        Ok(output.suggested_improvements)
    }

    pub async fn generate_task_prompt(
        &self,
        video_data_uri: &str,
        description: &str,
    ) -> QaResult<String> {
        let input = TaskPromptInput {
            video_data_uri: video_data_uri.to_string(),
            description: description.to_string(),
        };
        let output = self.task_prompt.call(self.backend.as_ref(), &input).await?;
        Ok(output.task_prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qaflow_agent::{GenerationRequest, Placeholder};
    use qaflow_core::{QaError, QaResult};
    use std::sync::Mutex;

    /// Replies with a canned body per agent name and records requests.
    struct CannedBackend {
        requests: Mutex<Vec<GenerationRequest>>,
    }

    #[async_trait::async_trait]
    impl LlmBackend for CannedBackend {
        async fn generate(&self, request: &GenerationRequest) -> QaResult<String> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(match request.agent.as_str() {
                "planner" => r#"{"subgoals": ["Open login screen", "Submit"]}"#.into(),
                "supervisor" => r#"{"suggestedImprovements": "Add negative cases"}"#.into(),
                "taskPromptGenerator" => r#"{"taskPrompt": "Log in and open settings"}"#.into(),
                _ => return Err(QaError::Validation("unexpected agent".into())),
            })
        }
    }

    fn agents() -> (QaAgents, Arc<CannedBackend>) {
        let backend = Arc::new(CannedBackend {
            requests: Mutex::new(Vec::new()),
        });
        (QaAgents::new(backend.clone()), backend)
    }

    #[test]
    fn test_templates_reference_declared_fields() {
        let (agents, _) = agents();
        let fields: Vec<String> = agents
            .planner()
            .template()
            .placeholders()
            .unwrap()
            .iter()
            .map(|p| p.field_name().to_string())
            .collect();
        assert_eq!(fields, vec!["testGoal"]);

        let placeholders = agents.task_prompt().template().placeholders().unwrap();
        assert!(placeholders.contains(&Placeholder::Media("videoDataUri".into())));
        assert!(placeholders.contains(&Placeholder::Field("description".into())));
    }

    #[test]
    fn test_task_prompt_is_not_retried() {
        let (agents, _) = agents();
        assert_eq!(agents.task_prompt().retry().max_retries, 0);
        assert_eq!(agents.planner().retry().max_retries, 5);
        let agents = agents.with_retry_policy(RetryPolicy::none());
        assert_eq!(agents.planner().retry().max_retries, 0);
    }

    #[test]
    fn test_analysis_schema_requires_verdict_fields() {
        let (agents, _) = agents();
        let schema = agents.analysis.output_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&serde_json::json!("overallVerdict")));
        assert!(required.contains(&serde_json::json!("verificationResults")));
    }

    #[tokio::test]
    async fn test_plan_returns_subgoals_in_order() {
        let (agents, backend) = agents();
        let subgoals = agents.plan("Test login flow").await.unwrap();
        assert_eq!(subgoals, vec!["Open login screen", "Submit"]);
        let requests = backend.requests.lock().unwrap();
        assert!(requests[0].prompt.contains("Test Goal: Test login flow"));
        assert_eq!(requests[0].temperature, Some(0.4));
    }

    #[tokio::test]
    async fn test_supervise() {
        let (agents, _) = agents();
        let suggestions = agents
            .supervise("Test login flow", "[10:00:00] System: Starting test...")
            .await
            .unwrap();
        assert_eq!(suggestions, "Add negative cases");
    }

    #[tokio::test]
    async fn test_supervise_rejects_empty_log() {
        let (agents, backend) = agents();
        let err = agents.supervise("Test login flow", "").await.unwrap_err();
        assert!(matches!(err, QaError::Validation(_)));
        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_task_prompt_detaches_video() {
        let (agents, backend) = agents();
        let prompt = agents
            .generate_task_prompt("data:video/mp4;base64,AAAA", "User logs in")
            .await
            .unwrap();
        assert_eq!(prompt, "Log in and open settings");
        let requests = backend.requests.lock().unwrap();
        let media = requests[0].media.as_ref().unwrap();
        assert_eq!(media.mime_type, "video/mp4");
        assert!(!requests[0].prompt.contains("base64"));
        assert!(requests[0].prompt.contains("Description: User logs in"));
    }
}
