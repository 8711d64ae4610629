//! Workflow definition types for flowline.
//!
//! A `WorkflowDefinition` is the immutable template the engine walks: a map of
//! steps keyed by id, each invoking one tool and naming its successor. The
//! engine never executes a definition directly; it is compiled first (see
//! `flowline_core::workflow::definition::compile`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::StepValue;

/// Step id that paths use to address the execution's initial inputs.
pub const INPUTS_ROOT: &str = "inputs";

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// The canonical workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// UUIDv7 assigned when the submission is accepted.
    pub id: Uuid,
    /// Human-readable workflow name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-form version label, copied onto every execution.
    #[serde(default = "default_version")]
    pub version: String,
    /// Step the engine starts from.
    pub start_step_id: String,
    /// Steps keyed by their id.
    pub steps: BTreeMap<String, WorkflowStep>,
}

pub fn default_version() -> String {
    "1".to_string()
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// One node in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    pub action: StepAction,
    /// Static parameters passed to the tool.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, StepValue>,
    /// Applied in order over `inputs`; mapped values win.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_mappings: Vec<InputMapping>,
    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_spec: Option<LoopSpec>,
    /// Overrides `next_step_id` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<StepCondition>,
    /// Following step, or `None` when the step is terminal.
    #[serde(default)]
    pub next_step_id: Option<String>,
}

impl WorkflowStep {
    /// Name of the tool this step invokes.
    pub fn tool(&self) -> &str {
        match &self.action {
            StepAction::Tool(name) => name,
        }
    }
}

/// What a step does when executed.
///
/// Serialised externally tagged: `{ "tool": "http_get" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Invoke a named tool from the registry.
    Tool(String),
}

/// Copy a value from the execution context into a tool parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMapping {
    /// Reference path, e.g. `fetch.result.body.items`.
    pub from: String,
    /// Target parameter name.
    pub to: String,
}

/// Loop configuration for a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopSpec {
    #[serde(rename = "type")]
    pub kind: LoopKind,
    /// Reference path resolving to a sequence (`for_each`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Number of iterations (`count`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
    ForEach,
    Count,
}

/// Conditional branch: evaluated after the step's tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCondition {
    pub expression: String,
    #[serde(default)]
    pub true_step_id: Option<String>,
    #[serde(default)]
    pub false_step_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_step() -> WorkflowStep {
        WorkflowStep {
            id: "check".to_string(),
            name: "Check status".to_string(),
            action: StepAction::Tool("noop".to_string()),
            inputs: BTreeMap::from([("retries".to_string(), StepValue::Number(2.0))]),
            input_mappings: vec![InputMapping {
                from: "fetch.result.status".to_string(),
                to: "status".to_string(),
            }],
            loop_spec: None,
            condition: Some(StepCondition {
                expression: "fetch.result.status == 200".to_string(),
                true_step_id: Some("ok".to_string()),
                false_step_id: Some("fail".to_string()),
            }),
            next_step_id: None,
        }
    }

    #[test]
    fn step_serializes_in_camel_case() {
        let json = serde_json::to_value(sample_step()).unwrap();
        assert_eq!(json["action"], json!({"tool": "noop"}));
        assert_eq!(json["inputMappings"][0]["from"], "fetch.result.status");
        assert_eq!(json["condition"]["trueStepId"], "ok");
        assert!(json.get("loop").is_none());
        assert_eq!(json["nextStepId"], serde_json::Value::Null);
    }

    #[test]
    fn loop_spec_uses_type_tag() {
        let spec: LoopSpec =
            serde_json::from_value(json!({"type": "for_each", "source": "list.result"})).unwrap();
        assert_eq!(spec.kind, LoopKind::ForEach);
        assert_eq!(spec.source.as_deref(), Some("list.result"));
        assert_eq!(spec.count, None);
    }

    #[test]
    fn step_round_trips_through_json() {
        let step = sample_step();
        let json = serde_json::to_string(&step).unwrap();
        let back: WorkflowStep = serde_json::from_str(&json).unwrap();
        assert_eq!(back, step);
        assert_eq!(back.tool(), "noop");
    }
}
