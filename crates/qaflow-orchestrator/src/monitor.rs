use crate::types::{AgentOutput, AgentRole, AgentStatus, AgentViewState};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// Tracks the card state of every displayed agent.
///
/// Transitions are checked against [`AgentStatus::can_transition_to`];
/// illegal ones are ignored. Every mutating call returns the new state when
/// something changed so the caller can publish it.
pub struct AgentMonitor {
    states: Arc<RwLock<HashMap<AgentRole, AgentViewState>>>,
}

impl AgentMonitor {
    pub fn new() -> Self {
        Self {
            states: Arc::new(RwLock::new(initial_states())),
        }
    }

    /// Put every agent back to idle with no output.
    pub async fn reset(&self) -> Vec<AgentViewState> {
        let mut states = self.states.write().await;
        *states = initial_states();
        ordered(&states)
    }

    /// Mark an agent as running, optionally replacing its output.
    pub async fn start(
        &self,
        role: AgentRole,
        output: Option<AgentOutput>,
    ) -> Option<AgentViewState> {
        self.transition(role, AgentStatus::Running, |state| {
            if output.is_some() {
                state.output = output;
            }
        })
        .await
    }

    /// Mark an agent as completed with its final output.
    pub async fn complete(&self, role: AgentRole, output: AgentOutput) -> Option<AgentViewState> {
        self.transition(role, AgentStatus::Completed, |state| {
            state.output = Some(output);
        })
        .await
    }

    /// Move every running agent to `error` with `message`.
    pub async fn fail_running(&self, message: &str) -> Vec<AgentViewState> {
        let mut states = self.states.write().await;
        let mut changed = Vec::new();
        for role in AgentRole::DISPLAYED {
            if let Some(state) = states.get_mut(&role) {
                if state.status == AgentStatus::Running {
                    state.status = AgentStatus::Error;
                    state.error = Some(message.to_string());
                    changed.push(state.clone());
                }
            }
        }
        changed
    }

    async fn transition<F>(
        &self,
        role: AgentRole,
        next: AgentStatus,
        update: F,
    ) -> Option<AgentViewState>
    where
        F: FnOnce(&mut AgentViewState),
    {
        let mut states = self.states.write().await;
        let state = states.get_mut(&role)?;
        if !state.status.can_transition_to(next) {
            warn!(agent = %role, from = ?state.status, to = ?next, "Ignoring agent status transition");
            return None;
        }
        state.status = next;
        update(state);
        Some(state.clone())
    }

    /// Get a snapshot of all agent states, in display order.
    pub async fn snapshot(&self) -> Vec<AgentViewState> {
        let states = self.states.read().await;
        ordered(&states)
    }

    /// Get the state of a specific agent.
    pub async fn get_state(&self, role: AgentRole) -> Option<AgentViewState> {
        let states = self.states.read().await;
        states.get(&role).cloned()
    }
}

impl Default for AgentMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn initial_states() -> HashMap<AgentRole, AgentViewState> {
    AgentRole::DISPLAYED
        .into_iter()
        .map(|role| (role, AgentViewState::idle(role)))
        .collect()
}

fn ordered(states: &HashMap<AgentRole, AgentViewState>) -> Vec<AgentViewState> {
    AgentRole::DISPLAYED
        .iter()
        .filter_map(|role| states.get(role).cloned())
        .collect()
}
