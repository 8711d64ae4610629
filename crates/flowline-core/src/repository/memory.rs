//! In-process repository implementations.
//!
//! Backed by `DashMap`; nothing survives the process. Used by tests and by
//! hosts running ephemeral executions.

use dashmap::DashMap;
use flowline_types::chain::ChainRun;
use flowline_types::error::RepositoryError;
use flowline_types::execution::{ExecutionUpdate, StepLog, StepLogCompletion, WorkflowExecution};
use uuid::Uuid;

use super::chain::ChainRunRepository;
use super::execution::ExecutionRecorder;

// ---------------------------------------------------------------------------
// Executions
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemoryExecutionRecorder {
    executions: DashMap<Uuid, WorkflowExecution>,
    step_logs: DashMap<Uuid, StepLog>,
}

impl InMemoryExecutionRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionRecorder for InMemoryExecutionRecorder {
    async fn create_execution(&self, execution: &WorkflowExecution) -> Result<Uuid, RepositoryError> {
        if self.executions.contains_key(&execution.id) {
            return Err(RepositoryError::Conflict(format!(
                "execution {} already exists",
                execution.id
            )));
        }
        self.executions.insert(execution.id, execution.clone());
        Ok(execution.id)
    }

    async fn update_execution(&self, id: &Uuid, update: &ExecutionUpdate) -> Result<(), RepositoryError> {
        let mut row = self
            .executions
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        row.apply(update)?;
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        Ok(self.executions.get(id).map(|r| r.value().clone()))
    }

    async fn list_executions(
        &self,
        workflow_id: Option<&Uuid>,
        limit: u32,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let mut rows: Vec<WorkflowExecution> = self
            .executions
            .iter()
            .filter(|r| workflow_id.is_none_or(|w| r.workflow_id == *w))
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn create_step_log(&self, log: &StepLog) -> Result<(), RepositoryError> {
        if !self.executions.contains_key(&log.execution_id) {
            return Err(RepositoryError::NotFound);
        }
        self.step_logs.insert(log.id, log.clone());
        Ok(())
    }

    async fn finish_step_log(&self, id: &Uuid, completion: &StepLogCompletion) -> Result<(), RepositoryError> {
        let mut log = self.step_logs.get_mut(id).ok_or(RepositoryError::NotFound)?;
        log.status = completion.status;
        log.output = completion.output.clone();
        log.error = completion.error.clone();
        log.iterations = completion.iterations;
        log.completed_at = Some(completion.completed_at);
        Ok(())
    }

    async fn list_step_logs(&self, execution_id: &Uuid) -> Result<Vec<StepLog>, RepositoryError> {
        let mut logs: Vec<StepLog> = self
            .step_logs
            .iter()
            .filter(|l| l.execution_id == *execution_id)
            .map(|l| l.value().clone())
            .collect();
        logs.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        Ok(logs)
    }
}

// ---------------------------------------------------------------------------
// Chain runs
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemoryChainRunRepository {
    runs: DashMap<Uuid, ChainRun>,
}

impl InMemoryChainRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChainRunRepository for InMemoryChainRunRepository {
    async fn create_chain_run(&self, run: &ChainRun) -> Result<(), RepositoryError> {
        if self.runs.contains_key(&run.id) {
            return Err(RepositoryError::Conflict(format!("chain run {} already exists", run.id)));
        }
        self.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn save_chain_run(&self, run: &ChainRun) -> Result<(), RepositoryError> {
        let mut existing = self.runs.get_mut(&run.id).ok_or(RepositoryError::NotFound)?;
        *existing = run.clone();
        Ok(())
    }

    async fn get_chain_run(&self, id: &Uuid) -> Result<Option<ChainRun>, RepositoryError> {
        Ok(self.runs.get(id).map(|r| r.value().clone()))
    }

    async fn list_chain_runs(&self, chain_id: &str, limit: u32) -> Result<Vec<ChainRun>, RepositoryError> {
        let mut runs: Vec<ChainRun> = self
            .runs
            .iter()
            .filter(|r| r.chain_id == chain_id)
            .map(|r| r.value().clone())
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        runs.truncate(limit as usize);
        Ok(runs)
    }
}
