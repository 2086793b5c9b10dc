//! Append-only record of every delegation's lifecycle state.

use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Terminal and non-terminal states a delegated task can be in.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum TaskStatus {
    Assigned,
    Completed,
    Reassigned,
    Failed(String),
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed(_))
    }
}

/// One entry in the global task log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskRecord {
    pub agent: String,
    pub task: String,
    pub status: TaskStatus,
}

/// Append-only, lock-guarded log of every delegation attempted by any agent
/// in the tree. Readers see a consistent snapshot; used both for duplicate
/// detection and for reporting to external drivers.
#[derive(Default)]
pub struct TaskLog {
    entries: RwLock<Vec<TaskRecord>>,
}

impl TaskLog {
    pub fn new() -> Self {
        Self { entries: RwLock::new(Vec::new()) }
    }

    pub fn append(&self, agent: impl Into<String>, task: impl Into<String>, status: TaskStatus) {
        self.entries.write().unwrap().push(TaskRecord {
            agent: agent.into(),
            task: task.into(),
            status,
        });
    }

    /// Exact-string-equality duplicate check against every task ever logged,
    /// regardless of which agent it was assigned to or its current status.
    pub fn is_duplicate(&self, task: &str) -> bool {
        self.entries.read().unwrap().iter().any(|e| e.task == task)
    }

    /// Marks the most recent entry matching `(agent, task)` with `status`.
    pub fn set_status(&self, agent: &str, task: &str, status: TaskStatus) {
        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.iter_mut().rev().find(|e| e.agent == agent && e.task == task) {
            entry.status = status;
        }
    }

    pub fn snapshot(&self) -> Vec<TaskRecord> {
        self.entries.read().unwrap().clone()
    }

    /// Serializes the log as newline-delimited JSON for external drivers.
    pub fn to_json_lines(&self) -> String {
        self.entries
            .read()
            .unwrap()
            .iter()
            .filter_map(|e| serde_json::to_string(e).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_detection_is_exact_string_equality() {
        let log = TaskLog::new();
        log.append("agent-a", "find author of book Y", TaskStatus::Assigned);
        assert!(log.is_duplicate("find author of book Y"));
        assert!(!log.is_duplicate("Find author of book Y"));
    }

    #[test]
    fn every_task_reaches_a_terminal_status() {
        let log = TaskLog::new();
        log.append("agent-a", "task one", TaskStatus::Assigned);
        log.set_status("agent-a", "task one", TaskStatus::Failed("boom".into()));
        let snapshot = log.snapshot();
        assert!(snapshot.iter().all(|e| e.status.is_terminal()));
    }
}
