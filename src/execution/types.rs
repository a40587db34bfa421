use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Lifecycle of one execution. Streaming passes through `Dispatching` while
/// chunks flow and settles on a terminal state when the stream ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Validating,
    Assembling,
    Dispatching,
    Succeeded,
    Failed,
}

impl ExecutionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionState::Validating => "validating",
            ExecutionState::Assembling => "assembling",
            ExecutionState::Dispatching => "dispatching",
            ExecutionState::Succeeded => "succeeded",
            ExecutionState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionState::Succeeded | ExecutionState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    VariableSubstitution,
    FileProcessing,
    BackendCall,
    BackendResponse,
}

/// One append-only audit entry. Entries are never mutated after append; the
/// log reflects everything that was attempted, not only what succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp_ms: u64,
    pub action: LogAction,
    pub details: String,
    pub success: bool,
}

impl LogEntry {
    pub fn now(action: LogAction, details: impl Into<String>, success: bool) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            timestamp_ms,
            action,
            details: details.into(),
            success,
        }
    }
}

/// Outcome and audit trail of one execution. Created at dispatch time,
/// mutated only by the orchestrator driving that execution, immutable once
/// stored in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub template_id: String,
    /// The text actually sent: post-substitution, post-inlining.
    pub final_prompt: String,
    /// Completion text on success, a human-readable error summary on failure.
    pub result_text: String,
    pub logs: Vec<LogEntry>,
    pub execution_time: Duration,
    pub state: ExecutionState,
}
