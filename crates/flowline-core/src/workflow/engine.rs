//! Workflow engine: walks a compiled step graph from its start step until a
//! terminal step, a failure, cancellation or the step limit.
//!
//! # Execution flow
//!
//! 1. Create the `WorkflowExecution` row (`running`) and register a
//!    cancellation token for the run.
//! 2. Compile the definition; a definition error fails the run immediately.
//! 3. Before each step, check cancellation and the step limit.
//! 4. Each step: step log start -> interpreter -> step log finish ->
//!    execution row update with the new results snapshot.
//! 5. Write the terminal status, outputs and error, then publish
//!    `ExecutionFinished`.
//!
//! Steps run strictly one after another. Cancellation is only observed
//! between steps; a tool in flight sees it through its `ToolCall` token.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use flowline_types::config::EngineConfig;
use flowline_types::error::RepositoryError;
use flowline_types::event::EngineEvent;
use flowline_types::execution::{
    ExecutionStatus, ExecutionUpdate, StepLog, StepLogCompletion, StepLogStatus, WorkflowExecution,
};
use flowline_types::value::StepValue;
use flowline_types::workflow::WorkflowDefinition;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::context::ExecutionContext;
use super::definition::{compile, CompiledWorkflow, WorkflowError};
use super::interpreter::{StepInterpreter, StepOutcome, StepReport};
use crate::event::EventBus;
use crate::repository::ExecutionRecorder;
use crate::tool::ToolExecutor;

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

/// Category of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The definition failed to compile.
    Definition,
    /// The current step id does not exist in the definition.
    UnknownStep,
    StepLimitExceeded,
    /// An input mapping failed to resolve.
    Mapping,
    /// A condition path failed to resolve.
    Resolution,
    LoopSource,
    Tool,
}

/// Why a run failed, and where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    /// `None` for failures not tied to a step (definition errors).
    pub step_id: Option<String>,
    pub kind: FailureKind,
    pub message: String,
}

impl ExecutionFailure {
    /// The text written to `WorkflowExecution.error`.
    pub fn describe(&self) -> String {
        match &self.step_id {
            Some(step_id) => format!("step '{step_id}' failed: {}", self.message),
            None => self.message.clone(),
        }
    }
}

/// Result of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    /// The terminal step's result when completed, otherwise a snapshot of all
    /// step results.
    pub outputs: StepValue,
    pub step_results: BTreeMap<String, StepValue>,
    pub failure: Option<ExecutionFailure>,
    pub last_completed_step: Option<String>,
    pub steps_executed: u32,
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Infrastructure errors. Workflow failures are reported through
/// [`ExecutionResult`], not through this type.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("recorder error: {0}")]
    Recorder(#[from] RepositoryError),

    #[error("execution not found: {0}")]
    RunNotFound(Uuid),
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Sequential step-graph executor.
///
/// The tool executor and recorder are injected at construction; the engine
/// holds no other shared state beyond the cancellation tokens of live runs.
pub struct WorkflowEngine<T: ToolExecutor, R: ExecutionRecorder> {
    interpreter: StepInterpreter<T>,
    recorder: Arc<R>,
    config: EngineConfig,
    event_bus: EventBus,
    /// Cancellation tokens keyed by execution id.
    running: DashMap<Uuid, CancellationToken>,
}

/// Outcome of the step loop, before it is written to the recorder.
struct RunEnd {
    status: ExecutionStatus,
    outputs: Option<StepValue>,
    failure: Option<ExecutionFailure>,
    current_step_id: Option<String>,
}

impl<T: ToolExecutor, R: ExecutionRecorder> WorkflowEngine<T, R> {
    pub fn new(tools: Arc<T>, recorder: Arc<R>, config: EngineConfig) -> Self {
        let event_bus = EventBus::new(config.event_capacity);
        Self {
            interpreter: StepInterpreter::new(tools),
            recorder,
            config,
            event_bus,
            running: DashMap::new(),
        }
    }

    /// Publish to an existing bus instead of a private one.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    pub fn tools(&self) -> &T {
        self.interpreter.tools()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_bus.subscribe()
    }

    /// Compile a definition against this engine's tools.
    pub fn compile(&self, definition: &WorkflowDefinition) -> Result<CompiledWorkflow, WorkflowError> {
        compile(definition, self.interpreter.tools())
    }

    /// Ids of executions currently running on this engine.
    pub fn running_executions(&self) -> Vec<Uuid> {
        self.running.iter().map(|e| *e.key()).collect()
    }

    /// Signal a running execution to stop before its next step.
    pub fn cancel(&self, execution_id: &Uuid) -> Result<(), EngineError> {
        let token = self
            .running
            .get(execution_id)
            .ok_or(EngineError::RunNotFound(*execution_id))?;
        token.cancel();
        tracing::info!(execution_id = %execution_id, "workflow cancellation requested");
        Ok(())
    }

    /// Run a definition with the given inputs.
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        inputs: StepValue,
    ) -> Result<ExecutionResult, EngineError> {
        self.execute_with_cancel(definition, inputs, CancellationToken::new())
            .await
    }

    /// Run a definition, stopping between steps once `cancel` fires.
    ///
    /// An invalid definition still produces an execution row, marked failed.
    pub async fn execute_with_cancel(
        &self,
        definition: &WorkflowDefinition,
        inputs: StepValue,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        let compiled = self.compile(definition);
        self.run(definition, compiled.as_ref().map_err(|e| e.to_string()), inputs, cancel)
            .await
    }

    /// Run an already-compiled workflow.
    pub async fn execute_compiled(
        &self,
        compiled: &CompiledWorkflow,
        inputs: StepValue,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        self.run(compiled.definition(), Ok(compiled), inputs, cancel)
            .await
    }

    async fn run(
        &self,
        definition: &WorkflowDefinition,
        compiled: Result<&CompiledWorkflow, String>,
        inputs: StepValue,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, EngineError> {
        let execution_id = Uuid::now_v7();
        let execution = WorkflowExecution {
            id: execution_id,
            workflow_id: definition.id,
            workflow_name: definition.name.clone(),
            workflow_version: definition.version.clone(),
            status: ExecutionStatus::Running,
            inputs: inputs.clone(),
            outputs: None,
            step_results: BTreeMap::new(),
            current_step_id: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        };
        self.recorder.create_execution(&execution).await?;

        self.running.insert(execution_id, cancel.clone());
        let _registration = Registration {
            running: &self.running,
            execution_id,
        };

        self.event_bus.publish(EngineEvent::ExecutionStarted {
            execution_id,
            workflow_id: definition.id,
            workflow_name: definition.name.clone(),
        });
        tracing::info!(
            execution_id = %execution_id,
            workflow = definition.name.as_str(),
            "starting workflow execution"
        );

        let run_start = Instant::now();
        let mut ctx = ExecutionContext::new(execution_id, inputs);
        let mut steps_executed = 0u32;
        let mut last_completed: Option<String> = None;

        let end = match compiled {
            Err(message) => {
                tracing::warn!(execution_id = %execution_id, error = %message, "workflow definition rejected");
                RunEnd {
                    status: ExecutionStatus::Failed,
                    outputs: None,
                    failure: Some(ExecutionFailure {
                        step_id: None,
                        kind: FailureKind::Definition,
                        message,
                    }),
                    current_step_id: None,
                }
            }
            Ok(compiled) => {
                let steps = self
                    .walk(compiled, &mut ctx, &cancel, &mut steps_executed, &mut last_completed)
                    .await;
                match steps {
                    Ok(end) => end,
                    Err(e) => {
                        self.abandon(execution_id, &ctx, &e, steps_executed).await;
                        return Err(e);
                    }
                }
            }
        };

        self.finish(execution_id, ctx, end, last_completed, steps_executed, run_start)
            .await
    }

    /// The step loop.
    async fn walk(
        &self,
        compiled: &CompiledWorkflow,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
        steps_executed: &mut u32,
        last_completed: &mut Option<String>,
    ) -> Result<RunEnd, EngineError> {
        let execution_id = ctx.execution_id();
        let mut current = compiled.start_step_id().to_string();

        loop {
            if cancel.is_cancelled() {
                tracing::info!(
                    execution_id = %execution_id,
                    last_completed_step = ?last_completed,
                    "workflow cancelled"
                );
                return Ok(cancelled_end(last_completed));
            }

            if *steps_executed >= self.config.max_steps {
                tracing::warn!(
                    execution_id = %execution_id,
                    max_steps = self.config.max_steps,
                    "step limit exceeded"
                );
                return Ok(failed_end(
                    &current,
                    FailureKind::StepLimitExceeded,
                    format!("step limit of {} exceeded", self.config.max_steps),
                ));
            }

            let Some(step) = compiled.step(&current) else {
                return Ok(failed_end(
                    &current,
                    FailureKind::UnknownStep,
                    format!("unknown step '{current}'"),
                ));
            };

            ctx.set_current_step(Some(step.id.clone()));
            self.event_bus.publish(EngineEvent::StepStarted {
                execution_id,
                step_id: step.id.clone(),
                tool: step.tool.clone(),
            });
            tracing::debug!(execution_id = %execution_id, step_id = %step.id, tool = %step.tool, "starting step");

            let step_start = Instant::now();
            let mut log = StepLog {
                id: Uuid::now_v7(),
                execution_id,
                step_id: step.id.clone(),
                step_name: step.name.clone(),
                tool: step.tool.clone(),
                status: StepLogStatus::Running,
                params: None,
                output: None,
                error: None,
                iterations: 0,
                started_at: Utc::now(),
                completed_at: None,
            };

            let report = match self.interpreter.effective_params(step, ctx) {
                Ok(params) => {
                    log.params = Some(StepValue::Mapping(params.clone()));
                    self.recorder.create_step_log(&log).await?;
                    self.interpreter.invoke(step, params, ctx, cancel).await
                }
                Err(e) => {
                    self.recorder.create_step_log(&log).await?;
                    StepReport {
                        outcome: StepOutcome::Failed(e),
                        iterations: 0,
                    }
                }
            };
            *steps_executed += 1;
            let duration_ms = step_start.elapsed().as_millis() as u64;

            let (result, next) = match report.outcome {
                StepOutcome::Continue { result, next } => (result, Some(next)),
                StepOutcome::Terminal { result } => (result, None),
                StepOutcome::Failed(err) => {
                    let message = err.to_string();
                    self.recorder
                        .finish_step_log(
                            &log.id,
                            &StepLogCompletion {
                                status: StepLogStatus::Failed,
                                output: None,
                                error: Some(message.clone()),
                                iterations: report.iterations,
                                completed_at: Utc::now(),
                            },
                        )
                        .await?;
                    self.event_bus.publish(EngineEvent::StepFailed {
                        execution_id,
                        step_id: step.id.clone(),
                        error: message.clone(),
                    });
                    // A step cut short by cancellation ends the run as cancelled.
                    if cancel.is_cancelled() || err.is_cancellation() {
                        tracing::info!(
                            execution_id = %execution_id,
                            step_id = %step.id,
                            last_completed_step = ?last_completed,
                            "workflow cancelled during step"
                        );
                        return Ok(cancelled_end(last_completed));
                    }
                    tracing::warn!(execution_id = %execution_id, step_id = %step.id, error = %message, "step failed");
                    return Ok(failed_end(&step.id, err.kind(), message));
                }
            };

            self.recorder
                .finish_step_log(
                    &log.id,
                    &StepLogCompletion {
                        status: StepLogStatus::Completed,
                        output: Some(result.clone()),
                        error: None,
                        iterations: report.iterations,
                        completed_at: Utc::now(),
                    },
                )
                .await?;
            ctx.record_result(&step.id, result.clone());
            *last_completed = Some(step.id.clone());

            self.recorder
                .update_execution(
                    &execution_id,
                    &ExecutionUpdate {
                        current_step_id: Some(next.clone().unwrap_or_else(|| step.id.clone())),
                        step_results: Some(ctx.step_results().clone()),
                        ..Default::default()
                    },
                )
                .await?;

            self.event_bus.publish(EngineEvent::StepCompleted {
                execution_id,
                step_id: step.id.clone(),
                iterations: report.iterations,
                duration_ms,
                next_step_id: next.clone(),
            });
            tracing::debug!(
                execution_id = %execution_id,
                step_id = %step.id,
                next_step_id = ?next,
                duration_ms,
                "step completed"
            );

            match next {
                Some(next) => current = next,
                None => {
                    return Ok(RunEnd {
                        status: ExecutionStatus::Completed,
                        outputs: Some(result),
                        failure: None,
                        current_step_id: Some(step.id.clone()),
                    });
                }
            }
        }
    }

    /// Write the terminal state and build the result.
    async fn finish(
        &self,
        execution_id: Uuid,
        ctx: ExecutionContext,
        end: RunEnd,
        last_completed_step: Option<String>,
        steps_executed: u32,
        run_start: Instant,
    ) -> Result<ExecutionResult, EngineError> {
        let outputs = end.outputs.unwrap_or_else(|| ctx.snapshot());
        let step_results = ctx.into_step_results();

        self.recorder
            .update_execution(
                &execution_id,
                &ExecutionUpdate {
                    status: Some(end.status),
                    current_step_id: end.current_step_id,
                    outputs: Some(outputs.clone()),
                    step_results: Some(step_results.clone()),
                    error: end.failure.as_ref().map(ExecutionFailure::describe),
                    completed_at: Some(Utc::now()),
                },
            )
            .await?;

        self.event_bus.publish(EngineEvent::ExecutionFinished {
            execution_id,
            status: end.status,
            steps_executed,
        });
        tracing::info!(
            execution_id = %execution_id,
            status = end.status.as_str(),
            steps_executed,
            duration_ms = run_start.elapsed().as_millis() as u64,
            "workflow execution finished"
        );

        Ok(ExecutionResult {
            execution_id,
            status: end.status,
            outputs,
            step_results,
            failure: end.failure,
            last_completed_step,
            steps_executed,
        })
    }

    /// Best-effort: mark the row failed after the recorder itself failed.
    async fn abandon(
        &self,
        execution_id: Uuid,
        ctx: &ExecutionContext,
        error: &EngineError,
        steps_executed: u32,
    ) {
        let update = ExecutionUpdate {
            status: Some(ExecutionStatus::Failed),
            step_results: Some(ctx.step_results().clone()),
            error: Some(error.to_string()),
            completed_at: Some(Utc::now()),
            ..Default::default()
        };
        if let Err(e) = self.recorder.update_execution(&execution_id, &update).await {
            tracing::error!(execution_id = %execution_id, error = %e, "failed to mark execution as failed");
        }
        self.event_bus.publish(EngineEvent::ExecutionFinished {
            execution_id,
            status: ExecutionStatus::Failed,
            steps_executed,
        });
    }
}

fn cancelled_end(last_completed: &Option<String>) -> RunEnd {
    RunEnd {
        status: ExecutionStatus::Cancelled,
        outputs: None,
        failure: None,
        current_step_id: last_completed.clone(),
    }
}

fn failed_end(step_id: &str, kind: FailureKind, message: String) -> RunEnd {
    RunEnd {
        status: ExecutionStatus::Failed,
        outputs: None,
        failure: Some(ExecutionFailure {
            step_id: Some(step_id.to_string()),
            kind,
            message,
        }),
        current_step_id: Some(step_id.to_string()),
    }
}

/// Removes a run's cancellation token when the run ends, however it ends.
struct Registration<'a> {
    running: &'a DashMap<Uuid, CancellationToken>,
    execution_id: Uuid,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.running.remove(&self.execution_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryExecutionRecorder;
    use crate::tool::{ToolCall, ToolError, ToolParams};
    use flowline_types::workflow::{StepAction, WorkflowStep};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counting {
        calls: AtomicU32,
    }

    impl ToolExecutor for Counting {
        fn supports(&self, tool: &str) -> bool {
            tool != "missing"
        }

        async fn execute(
            &self,
            tool: &str,
            _params: ToolParams,
            _call: ToolCall,
        ) -> Result<StepValue, ToolError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match tool {
                "fail" => Err(ToolError::Failed("nope".to_string())),
                _ => Ok(StepValue::from(n as u64)),
            }
        }
    }

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
            name: "engine-test".to_string(),
            description: None,
            version: "3".to_string(),
            start_step_id: steps[0].id.clone(),
            steps: steps.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    fn engine(max_steps: u32) -> WorkflowEngine<Counting, InMemoryExecutionRecorder> {
        WorkflowEngine::new(
            Arc::new(Counting {
                calls: AtomicU32::new(0),
            }),
            Arc::new(InMemoryExecutionRecorder::new()),
            EngineConfig {
                max_steps,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn linear_run_completes_with_final_output() {
        let engine = engine(500);
        let def = definition(vec![step("a", "noop", Some("b")), step("b", "noop", None)]);

        let result = engine.execute(&def, StepValue::Null).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.outputs, StepValue::Number(1.0));
        assert_eq!(result.steps_executed, 2);
        assert_eq!(result.last_completed_step.as_deref(), Some("b"));
        assert!(result.failure.is_none());

        let row = engine
            .recorder()
            .get_execution(&result.execution_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, ExecutionStatus::Completed);
        assert_eq!(row.workflow_version, "3");
        assert_eq!(row.step_results.len(), 2);
        assert!(row.completed_at.is_some());
        assert!(engine.running_executions().is_empty());
    }

    #[tokio::test]
    async fn step_limit_aborts_cycles() {
        let engine = engine(5);
        let def = definition(vec![step("a", "noop", Some("b")), step("b", "noop", Some("a"))]);

        let result = engine.execute(&def, StepValue::Null).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.steps_executed, 5);
        let failure = result.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::StepLimitExceeded);
        assert_eq!(failure.step_id.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn invalid_definition_is_recorded_as_failed() {
        let engine = engine(500);
        let def = definition(vec![step("a", "missing", None)]);

        let result = engine.execute(&def, StepValue::Null).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.steps_executed, 0);
        let failure = result.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::Definition);
        assert_eq!(failure.step_id, None);

        let row = engine
            .recorder()
            .get_execution(&result.execution_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status, ExecutionStatus::Failed);
        assert!(row.error.unwrap().contains("unknown tool"));
    }

    #[tokio::test]
    async fn failure_keeps_earlier_results_only() {
        let engine = engine(500);
        let def = definition(vec![
            step("a", "noop", Some("b")),
            step("b", "fail", Some("c")),
            step("c", "noop", None),
        ]);

        let result = engine.execute(&def, StepValue::Null).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.step_results.contains_key("a"));
        assert!(!result.step_results.contains_key("b"));
        assert!(!result.step_results.contains_key("c"));
        let failure = result.failure.unwrap();
        assert_eq!(failure.step_id.as_deref(), Some("b"));
        assert_eq!(failure.kind, FailureKind::Tool);
        assert!(failure.describe().contains("step 'b' failed"));

        let logs = engine
            .recorder()
            .list_step_logs(&result.execution_id)
            .await
            .unwrap();
        let statuses: Vec<StepLogStatus> = logs.iter().map(|l| l.status).collect();
        assert_eq!(statuses, vec![StepLogStatus::Completed, StepLogStatus::Failed]);
    }

    #[tokio::test]
    async fn pre_cancelled_run_executes_nothing() {
        let engine = engine(500);
        let def = definition(vec![step("a", "noop", None)]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = engine
            .execute_with_cancel(&def, StepValue::Null, cancel)
            .await
            .unwrap();
        assert_eq!(result.status, ExecutionStatus::Cancelled);
        assert_eq!(result.steps_executed, 0);
        assert!(result.failure.is_none());
        assert_eq!(engine.tools().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_unknown_execution_is_error() {
        let engine = engine(500);
        assert!(matches!(
            engine.cancel(&Uuid::now_v7()),
            Err(EngineError::RunNotFound(_))
        ));
    }

    #[tokio::test]
    async fn events_follow_run_lifecycle() {
        let engine = engine(500);
        let mut rx = engine.subscribe();
        let def = definition(vec![step("a", "noop", None)]);

        let result = engine.execute(&def, StepValue::Null).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.execution_id(), result.execution_id);
            kinds.push(match event {
                EngineEvent::ExecutionStarted { .. } => "started",
                EngineEvent::StepStarted { .. } => "step_started",
                EngineEvent::StepCompleted { .. } => "step_completed",
                EngineEvent::StepFailed { .. } => "step_failed",
                EngineEvent::ExecutionFinished { .. } => "finished",
            });
        }
        assert_eq!(kinds, vec!["started", "step_started", "step_completed", "finished"]);
    }

    /// Accepts the first `accepted` step logs, then reports the store down.
    struct StepLogOutage {
        inner: InMemoryExecutionRecorder,
        accepted: u32,
        created: AtomicU32,
    }

    impl ExecutionRecorder for StepLogOutage {
        async fn create_execution(&self, execution: &WorkflowExecution) -> Result<Uuid, RepositoryError> {
            self.inner.create_execution(execution).await
        }

        async fn update_execution(&self, id: &Uuid, update: &ExecutionUpdate) -> Result<(), RepositoryError> {
            self.inner.update_execution(id, update).await
        }

        async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
            self.inner.get_execution(id).await
        }

        async fn list_executions(
            &self,
            workflow_id: Option<&Uuid>,
            limit: u32,
        ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
            self.inner.list_executions(workflow_id, limit).await
        }

        async fn create_step_log(&self, log: &StepLog) -> Result<(), RepositoryError> {
            if self.created.fetch_add(1, Ordering::SeqCst) >= self.accepted {
                return Err(RepositoryError::Connection);
            }
            self.inner.create_step_log(log).await
        }

        async fn finish_step_log(&self, id: &Uuid, completion: &StepLogCompletion) -> Result<(), RepositoryError> {
            self.inner.finish_step_log(id, completion).await
        }

        async fn list_step_logs(&self, execution_id: &Uuid) -> Result<Vec<StepLog>, RepositoryError> {
            self.inner.list_step_logs(execution_id).await
        }
    }

    #[tokio::test]
    async fn recorder_outage_reports_steps_already_run() {
        let engine = WorkflowEngine::new(
            Arc::new(Counting {
                calls: AtomicU32::new(0),
            }),
            Arc::new(StepLogOutage {
                inner: InMemoryExecutionRecorder::new(),
                accepted: 2,
                created: AtomicU32::new(0),
            }),
            EngineConfig::default(),
        );
        let mut rx = engine.subscribe();
        let def = definition(vec![
            step("a", "noop", Some("b")),
            step("b", "noop", Some("c")),
            step("c", "noop", None),
        ]);

        let err = engine.execute(&def, StepValue::Null).await.unwrap_err();
        assert!(matches!(err, EngineError::Recorder(RepositoryError::Connection)));
        assert!(engine.running_executions().is_empty());

        let mut finished = None;
        while let Ok(event) = rx.try_recv() {
            if let EngineEvent::ExecutionFinished { status, steps_executed, .. } = event {
                finished = Some((status, steps_executed));
            }
        }
        assert_eq!(finished, Some((ExecutionStatus::Failed, 2)));

        let rows = engine.recorder().list_executions(None, 10).await.unwrap();
        assert_eq!(rows[0].status, ExecutionStatus::Failed);
        assert!(rows[0].step_results.contains_key("b"));
    }
}
