use crate::types::{AgentViewState, LogEntry, RunPhase};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of a user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Error,
}

/// A one-off toast for the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Change published by the orchestrator while a run progresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Phase { run_id: Uuid, phase: RunPhase },
    Agent { run_id: Uuid, agent: AgentViewState },
    Log { run_id: Uuid, entry: LogEntry },
    Notification { run_id: Uuid, notification: Notification },
}

impl RunEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            RunEvent::Phase { run_id, .. }
            | RunEvent::Agent { run_id, .. }
            | RunEvent::Log { run_id, .. }
            | RunEvent::Notification { run_id, .. } => *run_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let run_id = Uuid::new_v4();
        let event = RunEvent::Phase {
            run_id,
            phase: RunPhase::ExecutorRunning { index: 0 },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "phase");
        assert_eq!(json["phase"]["phase"], "executor_running");
        assert_eq!(event.run_id(), run_id);

        let toast = RunEvent::Notification {
            run_id,
            notification: Notification::error("An Error Occurred", "aborted"),
        };
        let json = serde_json::to_value(&toast).unwrap();
        assert_eq!(json["notification"]["level"], "error");
        let back: RunEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, toast);
    }
}
