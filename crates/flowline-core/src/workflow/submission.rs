//! Wire format for submitting workflows, and its expansion into a
//! `WorkflowDefinition`.
//!
//! Submissions list steps in order and may use the `inputFromPrevious`
//! shorthand `{stepId, field, as}`, which expands into an input mapping
//! `{from: "stepId.result.field", to: as}`.

use std::collections::BTreeMap;
use std::path::Path;

use flowline_types::value::StepValue;
use flowline_types::workflow::{
    default_version, InputMapping, LoopSpec, StepAction, StepCondition, WorkflowDefinition,
    WorkflowStep,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::definition::WorkflowError;
use super::path::ReferencePath;

/// A workflow as submitted by a caller (JSON or YAML, camelCase keys).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSubmission {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub steps: Vec<SubmittedStep>,
    /// Defaults to the first listed step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_step_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedStep {
    pub id: String,
    /// Defaults to the step id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub tool: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, StepValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_from_previous: Vec<PreviousOutput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_mappings: Vec<InputMapping>,
    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_spec: Option<LoopSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<StepCondition>,
    #[serde(default)]
    pub next_step_id: Option<String>,
}

/// `inputFromPrevious` entry: copy `stepId.result.field` into param `as`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousOutput {
    pub step_id: String,
    #[serde(default)]
    pub field: String,
    #[serde(rename = "as")]
    pub as_param: String,
}

impl WorkflowSubmission {
    /// Expand into a definition with a fresh UUIDv7 id.
    pub fn into_definition(self) -> Result<WorkflowDefinition, WorkflowError> {
        let start_step_id = match self.start_step_id {
            Some(id) => id,
            None => self
                .steps
                .first()
                .map(|s| s.id.clone())
                .ok_or_else(|| {
                    WorkflowError::ValidationError("workflow must have at least one step".to_string())
                })?,
        };

        let mut steps = BTreeMap::new();
        for submitted in self.steps {
            let step = submitted.into_step();
            if steps.contains_key(&step.id) {
                return Err(WorkflowError::ValidationError(format!(
                    "duplicate step ID: '{}'",
                    step.id
                )));
            }
            steps.insert(step.id.clone(), step);
        }

        Ok(WorkflowDefinition {
            id: Uuid::now_v7(),
            name: self.name,
            description: self.description,
            version: self.version.unwrap_or_else(default_version),
            start_step_id,
            steps,
        })
    }
}

impl SubmittedStep {
    fn into_step(self) -> WorkflowStep {
        let mut input_mappings: Vec<InputMapping> = self
            .input_from_previous
            .into_iter()
            .map(|prev| InputMapping {
                from: ReferencePath::step_field(&prev.step_id, &prev.field),
                to: prev.as_param,
            })
            .collect();
        input_mappings.extend(self.input_mappings);

        WorkflowStep {
            name: self.name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            action: StepAction::Tool(self.tool),
            inputs: self.inputs,
            input_mappings,
            loop_spec: self.loop_spec,
            condition: self.condition,
            next_step_id: self.next_step_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

pub fn parse_submission_json(json: &str) -> Result<WorkflowSubmission, WorkflowError> {
    serde_json::from_str(json).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

pub fn parse_submission_yaml(yaml: &str) -> Result<WorkflowSubmission, WorkflowError> {
    serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

/// Load a submission from a `.json`, `.yaml` or `.yml` file and expand it.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let submission = match extension.as_deref() {
        Some("json") => parse_submission_json(&content)?,
        Some("yaml") | Some("yml") => parse_submission_yaml(&content)?,
        _ => {
            return Err(WorkflowError::ParseError(format!(
                "unsupported workflow file '{}': expected .json, .yaml or .yml",
                path.display()
            )));
        }
    };
    submission.into_definition()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE_JSON: &str = r#"{
        "name": "status-check",
        "steps": [
            {"id": "fetch", "name": "Fetch", "tool": "http_get",
             "inputs": {"url": "https://x"}, "nextStepId": "report"},
            {"id": "report", "name": "Report", "tool": "echo",
             "inputFromPrevious": [{"stepId": "fetch", "field": "status", "as": "code"}],
             "inputMappings": [{"from": "fetch.result.body", "to": "body"}]}
        ],
        "startStepId": "fetch"
    }"#;

    #[test]
    fn expands_input_from_previous_before_explicit_mappings() {
        let def = parse_submission_json(SAMPLE_JSON)
            .unwrap()
            .into_definition()
            .unwrap();
        let report = &def.steps["report"];
        assert_eq!(
            report.input_mappings,
            vec![
                InputMapping {
                    from: "fetch.result.status".to_string(),
                    to: "code".to_string()
                },
                InputMapping {
                    from: "fetch.result.body".to_string(),
                    to: "body".to_string()
                },
            ]
        );
        assert_eq!(report.next_step_id, None);
        assert_eq!(def.start_step_id, "fetch");
        assert_eq!(def.version, "1");
        assert_eq!(def.steps["fetch"].inputs["url"], StepValue::from("https://x"));
    }

    #[test]
    fn rejects_duplicate_step_ids() {
        let json = r#"{"name": "dup", "steps": [
            {"id": "a", "tool": "noop"}, {"id": "a", "tool": "noop"}
        ]}"#;
        let err = parse_submission_json(json).unwrap().into_definition().unwrap_err();
        assert!(matches!(err, WorkflowError::ValidationError(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn start_defaults_to_first_step_and_name_to_id() {
        let json = r#"{"name": "x", "steps": [{"id": "only", "tool": "noop"}]}"#;
        let def = parse_submission_json(json).unwrap().into_definition().unwrap();
        assert_eq!(def.start_step_id, "only");
        assert_eq!(def.steps["only"].name, "only");
    }

    #[test]
    fn empty_steps_without_start_is_rejected() {
        let json = r#"{"name": "x", "steps": []}"#;
        assert!(parse_submission_json(json).unwrap().into_definition().is_err());
    }

    #[test]
    fn parses_yaml_with_loop_and_condition() {
        let yaml = r#"
name: fan-out
version: "2"
steps:
  - id: list
    tool: echo
    inputs:
      urls: [a, b]
    nextStepId: each
  - id: each
    tool: http_get
    loop:
      type: for_each
      source: list.result.urls
    nextStepId: decide
  - id: decide
    tool: noop
    condition:
      expression: "each.result[0].status == 200"
      trueStepId: null
      falseStepId: list
"#;
        let def = parse_submission_yaml(yaml).unwrap().into_definition().unwrap();
        assert_eq!(def.version, "2");
        assert!(def.steps["each"].loop_spec.is_some());
        let condition = def.steps["decide"].condition.as_ref().unwrap();
        assert_eq!(condition.true_step_id, None);
        assert_eq!(condition.false_step_id.as_deref(), Some("list"));
    }

    #[test]
    fn load_workflow_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.json");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(SAMPLE_JSON.as_bytes())
            .unwrap();
        let def = load_workflow_file(&path).unwrap();
        assert_eq!(def.name, "status-check");

        let txt = dir.path().join("flow.txt");
        std::fs::write(&txt, SAMPLE_JSON).unwrap();
        assert!(matches!(load_workflow_file(&txt), Err(WorkflowError::ParseError(_))));

        let missing = dir.path().join("missing.yaml");
        assert!(matches!(load_workflow_file(&missing), Err(WorkflowError::IoError(_))));
    }
}
