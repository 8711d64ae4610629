//! Event types for the engine event bus.
//!
//! `EngineEvent` is broadcast during workflow execution. All variants are
//! Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::execution::ExecutionStatus;

/// Events emitted while a workflow execution runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    ExecutionStarted {
        execution_id: Uuid,
        workflow_id: Uuid,
        workflow_name: String,
    },

    StepStarted {
        execution_id: Uuid,
        step_id: String,
        tool: String,
    },

    StepCompleted {
        execution_id: Uuid,
        step_id: String,
        /// Tool invocations made (loop iterations, or 1).
        iterations: u32,
        duration_ms: u64,
        next_step_id: Option<String>,
    },

    StepFailed {
        execution_id: Uuid,
        step_id: String,
        error: String,
    },

    ExecutionFinished {
        execution_id: Uuid,
        status: ExecutionStatus,
        steps_executed: u32,
    },
}

impl EngineEvent {
    pub fn execution_id(&self) -> Uuid {
        match self {
            EngineEvent::ExecutionStarted { execution_id, .. }
            | EngineEvent::StepStarted { execution_id, .. }
            | EngineEvent::StepCompleted { execution_id, .. }
            | EngineEvent::StepFailed { execution_id, .. }
            | EngineEvent::ExecutionFinished { execution_id, .. } => *execution_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_type() {
        let id = Uuid::now_v7();
        let event = EngineEvent::StepFailed {
            execution_id: id,
            step_id: "fetch".to_string(),
            error: "boom".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "step_failed");
        assert_eq!(event.execution_id(), id);
    }
}
