//! SQLite execution recorder.
//!
//! Implements `ExecutionRecorder` from `flowline-core` using sqlx with split
//! read/write pools. Values (`inputs`, `outputs`, `step_results`, step params
//! and outputs) are stored as JSON text.

use std::collections::BTreeMap;

use flowline_core::repository::ExecutionRecorder;
use flowline_types::error::RepositoryError;
use flowline_types::execution::{
    ExecutionStatus, ExecutionUpdate, StepLog, StepLogCompletion, StepLogStatus, WorkflowExecution,
};
use flowline_types::value::StepValue;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{
    format_datetime, parse_datetime, parse_json, parse_uuid, query_error, to_json, value_json,
};

/// SQLite-backed implementation of `ExecutionRecorder`.
pub struct SqliteExecutionRecorder {
    pool: DatabasePool,
}

impl SqliteExecutionRecorder {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct ExecutionRow {
    id: String,
    workflow_id: String,
    workflow_name: String,
    workflow_version: String,
    status: String,
    inputs: String,
    outputs: Option<String>,
    step_results: String,
    current_step_id: Option<String>,
    error: Option<String>,
    started_at: String,
    completed_at: Option<String>,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            workflow_name: row.try_get("workflow_name")?,
            workflow_version: row.try_get("workflow_version")?,
            status: row.try_get("status")?,
            inputs: row.try_get("inputs")?,
            outputs: row.try_get("outputs")?,
            step_results: row.try_get("step_results")?,
            current_step_id: row.try_get("current_step_id")?,
            error: row.try_get("error")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_execution(self) -> Result<WorkflowExecution, RepositoryError> {
        let status: ExecutionStatus = self
            .status
            .parse()
            .map_err(RepositoryError::Query)?;
        let outputs: Option<StepValue> = self
            .outputs
            .as_deref()
            .map(|s| parse_json("outputs", s))
            .transpose()?;
        let step_results: BTreeMap<String, StepValue> =
            parse_json("step_results", &self.step_results)?;

        Ok(WorkflowExecution {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            workflow_name: self.workflow_name,
            workflow_version: self.workflow_version,
            status,
            inputs: parse_json("inputs", &self.inputs)?,
            outputs,
            step_results,
            current_step_id: self.current_step_id,
            error: self.error,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
        })
    }
}

struct StepLogRow {
    id: String,
    execution_id: String,
    step_id: String,
    step_name: String,
    tool: String,
    status: String,
    params: Option<String>,
    output: Option<String>,
    error: Option<String>,
    iterations: i64,
    started_at: String,
    completed_at: Option<String>,
}

impl StepLogRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            execution_id: row.try_get("execution_id")?,
            step_id: row.try_get("step_id")?,
            step_name: row.try_get("step_name")?,
            tool: row.try_get("tool")?,
            status: row.try_get("status")?,
            params: row.try_get("params")?,
            output: row.try_get("output")?,
            error: row.try_get("error")?,
            iterations: row.try_get("iterations")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_step_log(self) -> Result<StepLog, RepositoryError> {
        let status: StepLogStatus = self.status.parse().map_err(RepositoryError::Query)?;

        Ok(StepLog {
            id: parse_uuid(&self.id)?,
            execution_id: parse_uuid(&self.execution_id)?,
            step_id: self.step_id,
            step_name: self.step_name,
            tool: self.tool,
            status,
            params: self
                .params
                .as_deref()
                .map(|s| parse_json("params", s))
                .transpose()?,
            output: self
                .output
                .as_deref()
                .map(|s| parse_json("output", s))
                .transpose()?,
            error: self.error,
            iterations: self.iterations as u32,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
        })
    }
}

// ---------------------------------------------------------------------------
// ExecutionRecorder impl
// ---------------------------------------------------------------------------

impl ExecutionRecorder for SqliteExecutionRecorder {
    async fn create_execution(&self, execution: &WorkflowExecution) -> Result<Uuid, RepositoryError> {
        let result = sqlx::query(
            r#"INSERT INTO workflow_executions
               (id, workflow_id, workflow_name, workflow_version, status, inputs, outputs,
                step_results, current_step_id, error, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(execution.id.to_string())
        .bind(execution.workflow_id.to_string())
        .bind(&execution.workflow_name)
        .bind(&execution.workflow_version)
        .bind(execution.status.as_str())
        .bind(to_json(&execution.inputs)?)
        .bind(value_json(execution.outputs.as_ref())?)
        .bind(to_json(&execution.step_results)?)
        .bind(&execution.current_step_id)
        .bind(&execution.error)
        .bind(format_datetime(&execution.started_at))
        .bind(execution.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(execution.id),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(RepositoryError::Conflict(
                format!("execution {} already exists", execution.id),
            )),
            Err(e) => Err(query_error(e)),
        }
    }

    /// Read-check-write inside one transaction on the single writer
    /// connection, so the status check and the write cannot interleave.
    async fn update_execution(&self, id: &Uuid, update: &ExecutionUpdate) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let row = sqlx::query("SELECT * FROM workflow_executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_error)?
            .ok_or(RepositoryError::NotFound)?;
        let mut execution = ExecutionRow::from_row(&row)
            .map_err(query_error)?
            .into_execution()?;

        if !execution.apply(update)? {
            tracing::debug!(execution_id = %id, "ignoring repeated terminal update");
            return Ok(());
        }

        sqlx::query(
            r#"UPDATE workflow_executions
               SET status = ?, outputs = ?, step_results = ?, current_step_id = ?,
                   error = ?, completed_at = ?
               WHERE id = ?"#,
        )
        .bind(execution.status.as_str())
        .bind(value_json(execution.outputs.as_ref())?)
        .bind(to_json(&execution.step_results)?)
        .bind(&execution.current_step_id)
        .bind(&execution.error)
        .bind(execution.completed_at.as_ref().map(format_datetime))
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = ExecutionRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_execution()?))
            }
            None => Ok(None),
        }
    }

    async fn list_executions(
        &self,
        workflow_id: Option<&Uuid>,
        limit: u32,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let rows = match workflow_id {
            Some(workflow_id) => {
                sqlx::query(
                    "SELECT * FROM workflow_executions WHERE workflow_id = ? ORDER BY started_at DESC, id DESC LIMIT ?",
                )
                .bind(workflow_id.to_string())
                .bind(limit as i64)
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM workflow_executions ORDER BY started_at DESC, id DESC LIMIT ?")
                    .bind(limit as i64)
                    .fetch_all(&self.pool.reader)
                    .await
            }
        }
        .map_err(query_error)?;

        let mut executions = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = ExecutionRow::from_row(row).map_err(query_error)?;
            executions.push(r.into_execution()?);
        }
        Ok(executions)
    }

    async fn create_step_log(&self, log: &StepLog) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"INSERT INTO step_logs
               (id, execution_id, step_id, step_name, tool, status, params, output,
                error, iterations, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(log.id.to_string())
        .bind(log.execution_id.to_string())
        .bind(&log.step_id)
        .bind(&log.step_name)
        .bind(&log.tool)
        .bind(log.status.as_str())
        .bind(value_json(log.params.as_ref())?)
        .bind(value_json(log.output.as_ref())?)
        .bind(&log.error)
        .bind(log.iterations as i64)
        .bind(format_datetime(&log.started_at))
        .bind(log.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => Err(RepositoryError::NotFound),
            Err(e) => Err(query_error(e)),
        }
    }

    async fn finish_step_log(&self, id: &Uuid, completion: &StepLogCompletion) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE step_logs SET status = ?, output = ?, error = ?, iterations = ?, completed_at = ? WHERE id = ?",
        )
        .bind(completion.status.as_str())
        .bind(value_json(completion.output.as_ref())?)
        .bind(&completion.error)
        .bind(completion.iterations as i64)
        .bind(format_datetime(&completion.completed_at))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_step_logs(&self, execution_id: &Uuid) -> Result<Vec<StepLog>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM step_logs WHERE execution_id = ? ORDER BY started_at ASC, id ASC")
            .bind(execution_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let mut logs = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = StepLogRow::from_row(row).map_err(query_error)?;
            logs.push(r.into_step_log()?);
        }
        Ok(logs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
