//! Execution recorder trait definition.
//!
//! Persists `WorkflowExecution` rows and their step logs around every
//! meaningful transition of a run.

use std::future::Future;

use flowline_types::error::RepositoryError;
use flowline_types::execution::{ExecutionUpdate, StepLog, StepLogCompletion, WorkflowExecution};
use uuid::Uuid;

/// Storage port for workflow executions.
///
/// `update_execution` must reject writes to terminal rows with
/// `RepositoryError::Conflict`, except an update repeating the same terminal
/// status, which succeeds without changing anything. This makes retrying a
/// final update safe.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait ExecutionRecorder: Send + Sync {
    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Insert a new execution row. Returns its id.
    fn create_execution(
        &self,
        execution: &WorkflowExecution,
    ) -> impl Future<Output = Result<Uuid, RepositoryError>> + Send;

    /// Apply a partial update to an execution.
    fn update_execution(
        &self,
        id: &Uuid,
        update: &ExecutionUpdate,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn get_execution(
        &self,
        id: &Uuid,
    ) -> impl Future<Output = Result<Option<WorkflowExecution>, RepositoryError>> + Send;

    /// Most recent executions first, optionally for one workflow.
    fn list_executions(
        &self,
        workflow_id: Option<&Uuid>,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<WorkflowExecution>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Step logs
    // -----------------------------------------------------------------------

    fn create_step_log(
        &self,
        log: &StepLog,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn finish_step_log(
        &self,
        id: &Uuid,
        completion: &StepLogCompletion,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Step logs of one execution in the order they started.
    fn list_step_logs(
        &self,
        execution_id: &Uuid,
    ) -> impl Future<Output = Result<Vec<StepLog>, RepositoryError>> + Send;
}
