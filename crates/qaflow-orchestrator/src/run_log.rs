use crate::types::{LogActor, LogEntry, LogStatus};
use chrono::Utc;

/// Append-only log of one run. Steps are numbered from 1.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    entries: Vec<LogEntry>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry stamped with the next step number and the current time.
    pub fn append(
        &mut self,
        agent: impl Into<LogActor>,
        details: impl Into<String>,
        status: LogStatus,
    ) -> &LogEntry {
        let step = u32::try_from(self.entries.len()).map_or(u32::MAX, |n| n.saturating_add(1));
        self.entries.push(LogEntry {
            step,
            agent: agent.into(),
            details: details.into(),
            status,
            timestamp: Utc::now(),
        });
        &self.entries[self.entries.len() - 1]
    }

    /// Drop every entry; the next append starts again at step 1.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// The episode text fed to the Analysis agent: one
    /// `[HH:MM:SS] Agent: details` line per entry, oldest first.
    pub fn to_text(&self) -> String {
        self.entries
            .iter()
            .map(LogEntry::to_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
