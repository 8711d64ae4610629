//! Agent chain types.
//!
//! A chain is a linear sequence of agent invocations where one agent's output
//! becomes the next agent's input. Each agent carries a `ChainConfig`
//! describing whether and how to hand off; a `ChainRun` records one pass.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::StepValue;

// ---------------------------------------------------------------------------
// Chain configuration
// ---------------------------------------------------------------------------

/// Hand-off configuration attached to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Agent to invoke after this one completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_agent_id: Option<String>,
    #[serde(default)]
    pub auto_trigger: bool,
    #[serde(default)]
    pub input_mapping: ChainInputMode,
    /// Seconds to wait before invoking the next agent.
    #[serde(default)]
    pub delay_seconds: u64,
    /// Predicate over `output` and `agent`; absent means always trigger.
    #[serde(default)]
    pub condition: Option<String>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            next_agent_id: None,
            auto_trigger: false,
            input_mapping: ChainInputMode::Full,
            delay_seconds: 0,
            condition: None,
        }
    }
}

/// How the completed agent's output becomes the next agent's input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainInputMode {
    /// The entire output.
    #[default]
    Full,
    /// Output passed through the host's summarizer.
    Summary,
    /// Output passed through the host's custom transform.
    Custom,
}

/// A whole chain: the start agent plus each agent's hand-off config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDefinition {
    pub id: String,
    pub name: String,
    pub start_agent_id: String,
    /// Hand-off config per agent id. Agents without an entry end the chain.
    #[serde(default)]
    pub links: BTreeMap<String, ChainConfig>,
}

// ---------------------------------------------------------------------------
// Chain runs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainRunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ChainRunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ChainRunStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChainRunStatus::Running => "running",
            ChainRunStatus::Completed => "completed",
            ChainRunStatus::Failed => "failed",
            ChainRunStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for ChainRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ChainRunStatus::Running),
            "completed" => Ok(ChainRunStatus::Completed),
            "failed" => Ok(ChainRunStatus::Failed),
            "cancelled" => Ok(ChainRunStatus::Cancelled),
            other => Err(format!("unknown chain run status '{other}'")),
        }
    }
}

/// One pass through a chain of agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainRun {
    /// UUIDv7 run ID.
    pub id: Uuid,
    pub chain_id: String,
    pub status: ChainRunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_agent_id: Option<String>,
    pub initial_input: StepValue,
    /// Set exactly once, when the run completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<StepValue>,
    /// Append-only while the run is active.
    #[serde(default)]
    pub step_results: Vec<ChainStepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ChainRun {
    /// A fresh running chain run.
    pub fn start(chain_id: impl Into<String>, initial_input: StepValue) -> Self {
        Self {
            id: Uuid::now_v7(),
            chain_id: chain_id.into(),
            status: ChainRunStatus::Running,
            current_agent_id: None,
            initial_input,
            final_output: None,
            step_results: Vec::new(),
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Output of one agent within a chain run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStepResult {
    pub agent_id: String,
    pub agent_name: String,
    pub output: StepValue,
    pub completed_at: DateTime<Utc>,
}
