//! Workflow definition compilation.
//!
//! `compile` checks every structural invariant of a `WorkflowDefinition` up
//! front and pre-parses its paths and conditions, so the engine only ever
//! walks a [`CompiledWorkflow`]. Anything caught here is a definition error;
//! nothing caught here can surprise the engine mid-run.

use std::collections::BTreeMap;

use flowline_types::workflow::{LoopKind, WorkflowDefinition, WorkflowStep, INPUTS_ROOT};
use thiserror::Error;

use super::condition::{Condition, ConditionError};
use super::path::{is_identifier, PathError, ReferencePath};
use crate::tool::{ToolExecutor, ToolParams};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors in a workflow definition, or in loading one.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// JSON/YAML parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// A step id referenced by the definition does not exist.
    #[error("{referenced_by} references unknown step '{step_id}'")]
    UnknownStep {
        step_id: String,
        referenced_by: String,
    },

    #[error("step '{step_id}': {source}")]
    InvalidPath {
        step_id: String,
        #[source]
        source: PathError,
    },

    #[error("step '{step_id}' has a malformed condition '{expression}': {source}")]
    MalformedCondition {
        step_id: String,
        expression: String,
        #[source]
        source: ConditionError,
    },

    #[error("step '{step_id}' uses unknown tool '{tool}'")]
    UnknownTool { step_id: String, tool: String },
}

// ---------------------------------------------------------------------------
// Compiled form
// ---------------------------------------------------------------------------

/// A definition that passed every load-time check.
#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
    definition: WorkflowDefinition,
    steps: BTreeMap<String, CompiledStep>,
}

impl CompiledWorkflow {
    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn start_step_id(&self) -> &str {
        &self.definition.start_step_id
    }

    pub fn step(&self, id: &str) -> Option<&CompiledStep> {
        self.steps.get(id)
    }

    pub fn steps(&self) -> impl Iterator<Item = &CompiledStep> {
        self.steps.values()
    }
}

/// A step with its paths and condition parsed.
#[derive(Debug, Clone)]
pub struct CompiledStep {
    pub id: String,
    pub name: String,
    pub tool: String,
    pub inputs: ToolParams,
    pub mappings: Vec<CompiledMapping>,
    pub looping: Option<CompiledLoop>,
    pub branch: Option<CompiledBranch>,
    pub next_step_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompiledMapping {
    pub from: ReferencePath,
    pub to: String,
}

#[derive(Debug, Clone)]
pub enum CompiledLoop {
    ForEach { source: ReferencePath },
    Count { count: u64 },
}

#[derive(Debug, Clone)]
pub struct CompiledBranch {
    pub condition: Condition,
    pub true_step_id: Option<String>,
    pub false_step_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Validate a definition against the tools available and pre-parse it.
///
/// Checks:
/// - Name is non-empty and at least one step exists
/// - Every map key equals its step's id, ids are identifiers, and the id
///   `inputs` is reserved
/// - The start step and every next/true/false target exist
/// - No step sets both `loop` and `condition`
/// - `for_each` loops name a source, `count` loops a count
/// - Every path and condition parses, and every step a path reads exists
/// - Every tool is known to `tools`
pub fn compile<T>(def: &WorkflowDefinition, tools: &T) -> Result<CompiledWorkflow, WorkflowError>
where
    T: ToolExecutor + ?Sized,
{
    if def.name.trim().is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow name must not be empty".to_string(),
        ));
    }
    if def.steps.is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow must have at least one step".to_string(),
        ));
    }

    for (key, step) in &def.steps {
        if key != &step.id {
            return Err(WorkflowError::ValidationError(format!(
                "step keyed '{key}' has id '{}'",
                step.id
            )));
        }
        if step.id == INPUTS_ROOT {
            return Err(WorkflowError::ValidationError(format!(
                "step id '{INPUTS_ROOT}' is reserved"
            )));
        }
        if step.id.trim().is_empty() {
            return Err(WorkflowError::ValidationError(
                "step id must not be empty".to_string(),
            ));
        }
        if !is_identifier(&step.id) {
            return Err(WorkflowError::ValidationError(format!(
                "step id '{}' must start with a letter or '_' and contain only letters, digits and '_'",
                step.id
            )));
        }
    }

    ensure_step(def, &def.start_step_id, "startStepId")?;

    let mut steps = BTreeMap::new();
    for step in def.steps.values() {
        steps.insert(step.id.clone(), compile_step(def, step, tools)?);
    }

    Ok(CompiledWorkflow {
        definition: def.clone(),
        steps,
    })
}

fn compile_step<T>(
    def: &WorkflowDefinition,
    step: &WorkflowStep,
    tools: &T,
) -> Result<CompiledStep, WorkflowError>
where
    T: ToolExecutor + ?Sized,
{
    let tool = step.tool();
    if !tools.supports(tool) {
        return Err(WorkflowError::UnknownTool {
            step_id: step.id.clone(),
            tool: tool.to_string(),
        });
    }

    if step.loop_spec.is_some() && step.condition.is_some() {
        return Err(WorkflowError::ValidationError(format!(
            "step '{}' sets both loop and condition",
            step.id
        )));
    }

    if let Some(next) = &step.next_step_id {
        ensure_step(def, next, &format!("step '{}' nextStepId", step.id))?;
    }

    let mut mappings = Vec::with_capacity(step.input_mappings.len());
    for mapping in &step.input_mappings {
        if mapping.to.is_empty() {
            return Err(WorkflowError::ValidationError(format!(
                "step '{}' has an input mapping with an empty target",
                step.id
            )));
        }
        mappings.push(CompiledMapping {
            from: parse_path(def, step, &mapping.from)?,
            to: mapping.to.clone(),
        });
    }

    let looping = match &step.loop_spec {
        None => None,
        Some(spec) => Some(match spec.kind {
            LoopKind::ForEach => {
                let source = spec.source.as_deref().ok_or_else(|| {
                    WorkflowError::ValidationError(format!(
                        "for_each loop on step '{}' requires a source",
                        step.id
                    ))
                })?;
                CompiledLoop::ForEach {
                    source: parse_path(def, step, source)?,
                }
            }
            LoopKind::Count => {
                let count = spec.count.ok_or_else(|| {
                    WorkflowError::ValidationError(format!(
                        "count loop on step '{}' requires a count",
                        step.id
                    ))
                })?;
                CompiledLoop::Count { count }
            }
        }),
    };

    let branch = match &step.condition {
        None => None,
        Some(cond) => {
            let condition = Condition::parse(&cond.expression).map_err(|source| {
                WorkflowError::MalformedCondition {
                    step_id: step.id.clone(),
                    expression: cond.expression.clone(),
                    source,
                }
            })?;
            for path in condition.paths() {
                ensure_path_target(def, step, path)?;
            }
            for target in [&cond.true_step_id, &cond.false_step_id].into_iter().flatten() {
                ensure_step(def, target, &format!("step '{}' condition", step.id))?;
            }
            Some(CompiledBranch {
                condition,
                true_step_id: cond.true_step_id.clone(),
                false_step_id: cond.false_step_id.clone(),
            })
        }
    };

    Ok(CompiledStep {
        id: step.id.clone(),
        name: step.name.clone(),
        tool: tool.to_string(),
        inputs: step.inputs.clone(),
        mappings,
        looping,
        branch,
        next_step_id: step.next_step_id.clone(),
    })
}

fn parse_path(
    def: &WorkflowDefinition,
    step: &WorkflowStep,
    raw: &str,
) -> Result<ReferencePath, WorkflowError> {
    let path = ReferencePath::parse(raw).map_err(|source| WorkflowError::InvalidPath {
        step_id: step.id.clone(),
        source,
    })?;
    ensure_path_target(def, step, &path)?;
    Ok(path)
}

fn ensure_path_target(
    def: &WorkflowDefinition,
    step: &WorkflowStep,
    path: &ReferencePath,
) -> Result<(), WorkflowError> {
    match path.step_id() {
        Some(target) => ensure_step(def, target, &format!("path '{path}' in step '{}'", step.id)),
        None => Ok(()),
    }
}

fn ensure_step(def: &WorkflowDefinition, step_id: &str, referenced_by: &str) -> Result<(), WorkflowError> {
    if def.steps.contains_key(step_id) {
        Ok(())
    } else {
        Err(WorkflowError::UnknownStep {
            step_id: step_id.to_string(),
            referenced_by: referenced_by.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{ToolCall, ToolError};
    use flowline_types::value::StepValue;
    use flowline_types::workflow::{InputMapping, LoopSpec, StepAction, StepCondition};
    use uuid::Uuid;

    struct Tools(&'static [&'static str]);

    impl ToolExecutor for Tools {
        fn supports(&self, tool: &str) -> bool {
            self.0.iter().any(|t| *t == tool)
        }

        async fn execute(
            &self,
            _tool: &str,
            _params: ToolParams,
            _call: ToolCall,
        ) -> Result<StepValue, ToolError> {
            Ok(StepValue::Null)
        }
    }

    const TOOLS: Tools = Tools(&["http_get", "noop"]);

    fn step(id: &str, tool: &str, next: Option<&str>) -> WorkflowStep {
        WorkflowStep {
            id: id.to_string(),
            name: id.to_string(),
            action: StepAction::Tool(tool.to_string()),
            inputs: BTreeMap::new(),
            input_mappings: vec![],
            loop_spec: None,
            condition: None,
            next_step_id: next.map(str::to_string),
        }
    }

    fn definition(steps: Vec<WorkflowStep>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: Uuid::now_v7(),
            name: "status-check".to_string(),
            description: None,
            version: "1".to_string(),
            start_step_id: steps[0].id.clone(),
            steps: steps.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    fn sample_definition() -> WorkflowDefinition {
        let mut check = step("check", "noop", None);
        check.condition = Some(StepCondition {
            expression: "fetch.result.status == 200".to_string(),
            true_step_id: Some("ok".to_string()),
            false_step_id: Some("fail".to_string()),
        });
        definition(vec![
            step("fetch", "http_get", Some("check")),
            check,
            step("ok", "noop", None),
            step("fail", "noop", None),
        ])
    }

    #[test]
    fn compiles_valid_definition() {
        let compiled = compile(&sample_definition(), &TOOLS).unwrap();
        assert_eq!(compiled.start_step_id(), "fetch");
        let check = compiled.step("check").unwrap();
        let branch = check.branch.as_ref().unwrap();
        assert_eq!(branch.true_step_id.as_deref(), Some("ok"));
        assert_eq!(compiled.steps().count(), 4);
    }

    #[test]
    fn rejects_empty_name_and_no_steps() {
        let mut def = sample_definition();
        def.name = " ".to_string();
        assert!(matches!(compile(&def, &TOOLS), Err(WorkflowError::ValidationError(_))));

        let mut def = sample_definition();
        def.steps.clear();
        assert!(matches!(compile(&def, &TOOLS), Err(WorkflowError::ValidationError(_))));
    }

    #[test]
    fn rejects_unknown_start_and_next() {
        let mut def = sample_definition();
        def.start_step_id = "nope".to_string();
        assert!(matches!(
            compile(&def, &TOOLS),
            Err(WorkflowError::UnknownStep { ref step_id, .. }) if step_id == "nope"
        ));

        let def = definition(vec![step("a", "noop", Some("ghost"))]);
        assert!(matches!(
            compile(&def, &TOOLS),
            Err(WorkflowError::UnknownStep { ref step_id, .. }) if step_id == "ghost"
        ));
    }

    #[test]
    fn rejects_unknown_branch_target() {
        let mut def = sample_definition();
        def.steps.get_mut("check").unwrap().condition.as_mut().unwrap().false_step_id =
            Some("missing".to_string());
        assert!(matches!(compile(&def, &TOOLS), Err(WorkflowError::UnknownStep { .. })));
    }

    #[test]
    fn null_branch_target_is_terminal() {
        let mut def = sample_definition();
        def.steps.get_mut("check").unwrap().condition.as_mut().unwrap().false_step_id = None;
        assert!(compile(&def, &TOOLS).is_ok());
    }

    #[test]
    fn rejects_key_mismatch_and_reserved_id() {
        let mut def = sample_definition();
        let fetch = def.steps.remove("fetch").unwrap();
        def.steps.insert("other".to_string(), fetch);
        assert!(matches!(compile(&def, &TOOLS), Err(WorkflowError::ValidationError(_))));

        let def = definition(vec![step("inputs", "noop", None)]);
        assert!(matches!(compile(&def, &TOOLS), Err(WorkflowError::ValidationError(_))));
    }

    #[test]
    fn rejects_step_ids_conditions_cannot_name() {
        for id in ["2fa", "gather-news", "a b"] {
            let def = definition(vec![step(id, "noop", None)]);
            let err = compile(&def, &TOOLS).unwrap_err();
            assert!(
                matches!(err, WorkflowError::ValidationError(ref msg) if msg.contains(id)),
                "{id}"
            );
        }
        assert!(compile(&definition(vec![step("_fa2", "noop", None)]), &TOOLS).is_ok());
    }

    #[test]
    fn rejects_loop_with_condition() {
        let mut def = sample_definition();
        def.steps.get_mut("check").unwrap().loop_spec = Some(LoopSpec {
            kind: LoopKind::Count,
            source: None,
            count: Some(2),
        });
        assert!(matches!(compile(&def, &TOOLS), Err(WorkflowError::ValidationError(_))));
    }

    #[test]
    fn loop_requires_its_operand() {
        let mut a = step("a", "noop", None);
        a.loop_spec = Some(LoopSpec {
            kind: LoopKind::ForEach,
            source: None,
            count: None,
        });
        assert!(matches!(
            compile(&definition(vec![a.clone()]), &TOOLS),
            Err(WorkflowError::ValidationError(_))
        ));

        a.loop_spec = Some(LoopSpec {
            kind: LoopKind::Count,
            source: None,
            count: None,
        });
        assert!(matches!(
            compile(&definition(vec![a]), &TOOLS),
            Err(WorkflowError::ValidationError(_))
        ));
    }

    #[test]
    fn rejects_bad_mapping_paths() {
        let mut a = step("a", "noop", Some("b"));
        let mut b = step("b", "noop", None);
        b.input_mappings = vec![InputMapping {
            from: "a.status".to_string(),
            to: "status".to_string(),
        }];
        a.inputs.insert("x".to_string(), StepValue::Null);
        let def = definition(vec![a.clone(), b.clone()]);
        assert!(matches!(compile(&def, &TOOLS), Err(WorkflowError::InvalidPath { .. })));

        b.input_mappings[0].from = "z.result.status".to_string();
        let def = definition(vec![a, b]);
        assert!(matches!(
            compile(&def, &TOOLS),
            Err(WorkflowError::UnknownStep { ref step_id, .. }) if step_id == "z"
        ));
    }

    #[test]
    fn inputs_paths_need_no_step() {
        let mut a = step("a", "noop", None);
        a.input_mappings = vec![InputMapping {
            from: "inputs.url".to_string(),
            to: "url".to_string(),
        }];
        assert!(compile(&definition(vec![a]), &TOOLS).is_ok());
    }

    #[test]
    fn rejects_malformed_condition() {
        let mut def = sample_definition();
        def.steps.get_mut("check").unwrap().condition.as_mut().unwrap().expression =
            "fetch.result.status == (200".to_string();
        assert!(matches!(
            compile(&def, &TOOLS),
            Err(WorkflowError::MalformedCondition { .. })
        ));
    }

    #[test]
    fn rejects_condition_on_unknown_step() {
        let mut def = sample_definition();
        def.steps.get_mut("check").unwrap().condition.as_mut().unwrap().expression =
            "ghost.result.status == 200".to_string();
        assert!(matches!(compile(&def, &TOOLS), Err(WorkflowError::UnknownStep { .. })));
    }

    #[test]
    fn rejects_unknown_tool() {
        let def = definition(vec![step("a", "shell", None)]);
        assert!(matches!(
            compile(&def, &TOOLS),
            Err(WorkflowError::UnknownTool { ref tool, .. }) if tool == "shell"
        ));
    }
}
