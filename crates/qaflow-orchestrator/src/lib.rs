//! Multi-agent QA run orchestration.
//!
//! Runs the Planner → (Executor → Verifier)* → Analysis pipeline over a
//! schema-validated LLM backend, keeping per-agent view state and an
//! append-only run log that presentation layers read through snapshots and a
//! broadcast event stream.
//!
//! # Main types
//!
//! - [`Orchestrator`] - Drives one run at a time through the pipeline.
//! - [`QaAgents`] - The LLM-backed agents and their prompt definitions.
//! - [`AgentMonitor`] - Card state of every displayed agent.
//! - [`RunLog`] - Append-only, step-numbered log of a run.
//! - [`SimulatedExecutor`] - Fixed-delay stand-in for a UI driver.
//! - [`TaskPromptGenerator`] - Test prompts from recorded user sessions.

/// Agent prompt definitions and typed inputs/outputs.
pub mod agents;
/// Orchestration engine and pipeline execution.
pub mod engine;
/// Events published while a run progresses.
pub mod events;
/// Subgoal executors.
pub mod executor;
/// Agent card state tracking.
pub mod monitor;
/// Task prompt generation from session recordings.
pub mod prompt_generator;
/// Append-only run log.
pub mod run_log;
/// Shared run types (roles, statuses, log entries, verdicts).
pub mod types;

pub use agents::QaAgents;
pub use engine::{Orchestrator, RunHandle, RunSnapshot};
pub use events::{Notification, NotificationLevel, RunEvent};
pub use executor::{ExecutionOutcome, Executor, SimulatedExecutor};
pub use monitor::AgentMonitor;
pub use prompt_generator::{TaskPromptGenerator, VideoUpload, DEFAULT_MAX_VIDEO_BYTES};
pub use run_log::RunLog;
pub use types::{
    AgentOutput, AgentRole, AgentStatus, AgentViewState, AnalysisVerdict, LogActor, LogEntry,
    LogStatus, RunPhase, RunReport, Verdict, VerificationResult,
};
