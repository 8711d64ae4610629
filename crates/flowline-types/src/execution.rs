//! Execution tracking types: the persisted projection of a workflow run.
//!
//! `WorkflowExecution` is one row per run. `StepLog` is the per-step audit
//! trail written around every tool invocation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::value::StepValue;

// ---------------------------------------------------------------------------
// Execution Status
// ---------------------------------------------------------------------------

/// Overall status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }

    /// Decide what an update carrying `next` does to a row currently in `self`.
    ///
    /// Running rows accept anything. Terminal rows accept only a repeat of the
    /// same terminal status, which is a no-op.
    pub fn check_update(self, next: Option<ExecutionStatus>) -> Result<UpdateDisposition, RepositoryError> {
        match (self.is_terminal(), next) {
            (false, _) => Ok(UpdateDisposition::Apply),
            (true, Some(next)) if next == self => Ok(UpdateDisposition::NoOp),
            (true, Some(next)) => Err(RepositoryError::Conflict(format!(
                "execution is {} and cannot become {}",
                self.as_str(),
                next.as_str()
            ))),
            (true, None) => Err(RepositoryError::Conflict(format!(
                "execution is {} and accepts no further writes",
                self.as_str()
            ))),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "cancelled" => Ok(ExecutionStatus::Cancelled),
            other => Err(format!("unknown execution status '{other}'")),
        }
    }
}

/// Outcome of [`ExecutionStatus::check_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDisposition {
    Apply,
    NoOp,
}

// ---------------------------------------------------------------------------
// Workflow Execution
// ---------------------------------------------------------------------------

/// Persisted record of a single workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    /// UUIDv7 execution ID.
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// Workflow name (denormalized for display).
    pub workflow_name: String,
    pub workflow_version: String,
    pub status: ExecutionStatus,
    pub inputs: StepValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<StepValue>,
    /// Snapshot of the context's step results at the last transition.
    #[serde(default)]
    pub step_results: BTreeMap<String, StepValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    /// Apply a partial update in place, enforcing the status state machine.
    ///
    /// Returns `Ok(false)` when the update was an idempotent repeat of a
    /// terminal write and nothing changed.
    pub fn apply(&mut self, update: &ExecutionUpdate) -> Result<bool, RepositoryError> {
        if self.status.check_update(update.status)? == UpdateDisposition::NoOp {
            return Ok(false);
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(step) = &update.current_step_id {
            self.current_step_id = Some(step.clone());
        }
        if let Some(outputs) = &update.outputs {
            self.outputs = Some(outputs.clone());
        }
        if let Some(results) = &update.step_results {
            self.step_results = results.clone();
        }
        if let Some(error) = &update.error {
            self.error = Some(error.clone());
        }
        if let Some(at) = update.completed_at {
            self.completed_at = Some(at);
        }
        Ok(true)
    }
}

/// Partial update for a [`WorkflowExecution`]. `None` fields are left as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecutionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<StepValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_results: Option<BTreeMap<String, StepValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Step Logs
// ---------------------------------------------------------------------------

/// Status of an individual step log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepLogStatus {
    Running,
    Completed,
    Failed,
}

impl StepLogStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepLogStatus::Running => "running",
            StepLogStatus::Completed => "completed",
            StepLogStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for StepLogStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(StepLogStatus::Running),
            "completed" => Ok(StepLogStatus::Completed),
            "failed" => Ok(StepLogStatus::Failed),
            other => Err(format!("unknown step log status '{other}'")),
        }
    }
}

/// Audit record for one step execution within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLog {
    /// UUIDv7 log ID.
    pub id: Uuid,
    pub execution_id: Uuid,
    pub step_id: String,
    /// Step name (denormalized for display).
    pub step_name: String,
    /// Tool invoked by the step.
    pub tool: String,
    pub status: StepLogStatus,
    /// Effective parameters (after input mappings).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<StepValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<StepValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Tool invocations made by the step (loop iterations, or 1).
    pub iterations: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Terminal write for a [`StepLog`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepLogCompletion {
    pub status: StepLogStatus,
    pub output: Option<StepValue>,
    pub error: Option<String>,
    pub iterations: u32,
    pub completed_at: DateTime<Utc>,
}
