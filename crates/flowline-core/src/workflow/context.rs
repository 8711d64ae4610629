//! Execution context: the mutable state of one workflow run.
//!
//! `ExecutionContext` holds the read-only inputs and the results accumulated
//! so far. It lives for exactly one run; its durable projection is the
//! `WorkflowExecution` row kept by the recorder.

use std::collections::BTreeMap;

use flowline_types::value::StepValue;
use uuid::Uuid;

use super::path::PathRoot;
use super::resolver::PathScope;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    execution_id: Uuid,
    inputs: StepValue,
    step_results: BTreeMap<String, StepValue>,
    current_step_id: Option<String>,
}

impl ExecutionContext {
    pub fn new(execution_id: Uuid, inputs: StepValue) -> Self {
        Self {
            execution_id,
            inputs,
            step_results: BTreeMap::new(),
            current_step_id: None,
        }
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    pub fn inputs(&self) -> &StepValue {
        &self.inputs
    }

    /// Store a step's result (a sequence, for loop steps).
    pub fn record_result(&mut self, step_id: &str, result: StepValue) {
        self.step_results.insert(step_id.to_string(), result);
    }

    pub fn step_result(&self, step_id: &str) -> Option<&StepValue> {
        self.step_results.get(step_id)
    }

    pub fn step_results(&self) -> &BTreeMap<String, StepValue> {
        &self.step_results
    }

    pub fn current_step_id(&self) -> Option<&str> {
        self.current_step_id.as_deref()
    }

    pub fn set_current_step(&mut self, step_id: Option<String>) {
        self.current_step_id = step_id;
    }

    /// Step results as a single mapping value.
    pub fn snapshot(&self) -> StepValue {
        StepValue::Mapping(self.step_results.clone())
    }

    /// Consume the context, keeping only the accumulated results.
    pub fn into_step_results(self) -> BTreeMap<String, StepValue> {
        self.step_results
    }
}

impl PathScope for ExecutionContext {
    fn lookup_root(&self, root: &PathRoot) -> Option<&StepValue> {
        match root {
            PathRoot::Step(id) => self.step_results.get(id),
            PathRoot::Inputs => Some(&self.inputs),
            PathRoot::Named(_) => None,
        }
    }
}
