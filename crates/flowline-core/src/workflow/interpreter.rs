//! Step interpreter: runs one compiled step against the execution context.
//!
//! A step's work is split in two so the engine can log the effective
//! parameters before any tool runs:
//! 1. `effective_params` -- static inputs overlaid with resolved mappings
//! 2. `invoke` -- call the tool (once, or per loop iteration), then pick the
//!    next step
//!
//! The interpreter never mutates the context; the engine merges results.

use std::sync::Arc;

use flowline_types::value::{StepValue, ValueKind};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::context::ExecutionContext;
use super::definition::{CompiledLoop, CompiledStep};
use super::engine::FailureKind;
use super::path::PathRoot;
use super::resolver::{resolve, PathScope, ResolutionError};
use crate::tool::{ToolCall, ToolError, ToolExecutor, ToolParams};

/// Reserved parameter holding the current element of a `for_each` loop.
pub const ITEM_PARAM: &str = "item";

/// Reserved parameter holding the zero-based loop iteration.
pub const INDEX_PARAM: &str = "index";

// ---------------------------------------------------------------------------
// Outcome and errors
// ---------------------------------------------------------------------------

/// What happened when a step ran.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The step succeeded and names a following step.
    Continue { result: StepValue, next: String },
    /// The step succeeded and the run ends here.
    Terminal { result: StepValue },
    Failed(StepError),
}

/// A step outcome plus the bookkeeping the engine logs.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub outcome: StepOutcome,
    /// Tool invocations made.
    pub iterations: u32,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    #[error("input mapping for '{param}' failed: {source}")]
    Mapping {
        param: String,
        #[source]
        source: ResolutionError,
    },

    #[error("loop source failed to resolve: {0}")]
    LoopSource(#[source] ResolutionError),

    #[error("loop source '{path}' is a {found}, expected a sequence")]
    LoopSourceNotSequence { path: String, found: ValueKind },

    #[error("condition failed to resolve: {0}")]
    Condition(#[source] ResolutionError),

    #[error("tool '{tool}' failed{}: {source}", iteration_suffix(.iteration))]
    Tool {
        tool: String,
        iteration: Option<u32>,
        #[source]
        source: ToolError,
    },
}

fn iteration_suffix(iteration: &Option<u32>) -> String {
    iteration
        .map(|i| format!(" on iteration {i}"))
        .unwrap_or_default()
}

impl StepError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StepError::Mapping { .. } => FailureKind::Mapping,
            StepError::LoopSource(_) | StepError::LoopSourceNotSequence { .. } => FailureKind::LoopSource,
            StepError::Condition(_) => FailureKind::Resolution,
            StepError::Tool { .. } => FailureKind::Tool,
        }
    }

    /// Whether the tool gave up because the run was cancelled.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            StepError::Tool {
                source: ToolError::Cancelled,
                ..
            }
        )
    }
}

// ---------------------------------------------------------------------------
// StepInterpreter
// ---------------------------------------------------------------------------

pub struct StepInterpreter<T> {
    tools: Arc<T>,
}

impl<T> Clone for StepInterpreter<T> {
    fn clone(&self) -> Self {
        Self {
            tools: Arc::clone(&self.tools),
        }
    }
}

impl<T: ToolExecutor> StepInterpreter<T> {
    pub fn new(tools: Arc<T>) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &T {
        &self.tools
    }

    /// Start from the static inputs and apply each mapping in order.
    ///
    /// A mapping that fails to resolve aborts the step.
    pub fn effective_params(
        &self,
        step: &CompiledStep,
        ctx: &ExecutionContext,
    ) -> Result<ToolParams, StepError> {
        let mut params = step.inputs.clone();
        for mapping in &step.mappings {
            let value = resolve(&mapping.from, ctx).map_err(|source| StepError::Mapping {
                param: mapping.to.clone(),
                source,
            })?;
            params.insert(mapping.to.clone(), value.clone());
        }
        Ok(params)
    }

    /// Run a step end to end.
    pub async fn execute_step(
        &self,
        step: &CompiledStep,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> StepReport {
        match self.effective_params(step, ctx) {
            Ok(params) => self.invoke(step, params, ctx, cancel).await,
            Err(e) => StepReport {
                outcome: StepOutcome::Failed(e),
                iterations: 0,
            },
        }
    }

    /// Invoke the tool with already-resolved params and decide what follows.
    pub async fn invoke(
        &self,
        step: &CompiledStep,
        params: ToolParams,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> StepReport {
        let base_call = ToolCall::new(ctx.execution_id(), step.id.clone(), cancel.clone());

        let (result, iterations) = match &step.looping {
            None => {
                let result = self
                    .tools
                    .execute(&step.tool, params, base_call)
                    .await
                    .map_err(|source| StepError::Tool {
                        tool: step.tool.clone(),
                        iteration: None,
                        source,
                    });
                (result, 1)
            }
            Some(CompiledLoop::ForEach { source }) => {
                let items = match resolve(source, ctx) {
                    Ok(StepValue::Sequence(items)) => items.clone(),
                    Ok(other) => {
                        return failed(StepError::LoopSourceNotSequence {
                            path: source.to_string(),
                            found: other.kind(),
                        });
                    }
                    Err(e) => return failed(StepError::LoopSource(e)),
                };
                let inputs = items.into_iter().enumerate().map(|(i, item)| {
                    let mut p = params.clone();
                    p.insert(ITEM_PARAM.to_string(), item);
                    p.insert(INDEX_PARAM.to_string(), StepValue::from(i as u64));
                    p
                });
                self.run_loop(step, inputs, &base_call).await
            }
            Some(CompiledLoop::Count { count }) => {
                let inputs = (0..*count).map(|i| {
                    let mut p = params.clone();
                    p.insert(INDEX_PARAM.to_string(), StepValue::from(i));
                    p
                });
                self.run_loop(step, inputs, &base_call).await
            }
        };

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                return StepReport {
                    outcome: StepOutcome::Failed(e),
                    iterations,
                };
            }
        };

        let next = match &step.branch {
            None => step.next_step_id.clone(),
            Some(branch) => {
                let scope = StepScope {
                    ctx,
                    step_id: &step.id,
                    result: &result,
                };
                match branch.condition.evaluate(&scope) {
                    Ok(true) => branch.true_step_id.clone(),
                    Ok(false) => branch.false_step_id.clone(),
                    Err(e) => {
                        return StepReport {
                            outcome: StepOutcome::Failed(StepError::Condition(e)),
                            iterations,
                        };
                    }
                }
            }
        };

        let outcome = match next {
            Some(next) => StepOutcome::Continue { result, next },
            None => StepOutcome::Terminal { result },
        };
        StepReport { outcome, iterations }
    }

    /// Run iterations strictly in order; the first failure aborts the step
    /// and discards the partial results. No iteration starts once the run
    /// is cancelled.
    async fn run_loop(
        &self,
        step: &CompiledStep,
        inputs: impl Iterator<Item = ToolParams>,
        base_call: &ToolCall,
    ) -> (Result<StepValue, StepError>, u32) {
        let mut results = Vec::new();
        let mut iterations = 0u32;
        for (i, params) in inputs.enumerate() {
            let index = i as u32;
            if base_call.cancel.is_cancelled() {
                return (
                    Err(StepError::Tool {
                        tool: step.tool.clone(),
                        iteration: Some(index),
                        source: ToolError::Cancelled,
                    }),
                    iterations,
                );
            }
            iterations += 1;
            tracing::debug!(step_id = %step.id, iteration = index, "running loop iteration");
            let call = base_call.clone().with_iteration(index);
            match self.tools.execute(&step.tool, params, call).await {
                Ok(value) => results.push(value),
                Err(source) => {
                    return (
                        Err(StepError::Tool {
                            tool: step.tool.clone(),
                            iteration: Some(index),
                            source,
                        }),
                        iterations,
                    );
                }
            }
        }
        (Ok(StepValue::Sequence(results)), iterations)
    }
}

fn failed(error: StepError) -> StepReport {
    StepReport {
        outcome: StepOutcome::Failed(error),
        iterations: 0,
    }
}

/// The context plus the running step's own result, so a condition can
/// branch on the output of the step it belongs to.
struct StepScope<'a> {
    ctx: &'a ExecutionContext,
    step_id: &'a str,
    result: &'a StepValue,
}

impl PathScope for StepScope<'_> {
    fn lookup_root(&self, root: &PathRoot) -> Option<&StepValue> {
        match root {
            PathRoot::Step(id) if id == self.step_id => Some(self.result),
            other => self.ctx.lookup_root(other),
        }
    }
}
