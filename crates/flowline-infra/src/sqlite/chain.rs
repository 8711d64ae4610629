//! SQLite chain run repository.

use flowline_core::repository::ChainRunRepository;
use flowline_types::chain::{ChainRun, ChainRunStatus, ChainStepResult};
use flowline_types::error::RepositoryError;
use flowline_types::value::StepValue;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{
    format_datetime, parse_datetime, parse_json, parse_uuid, query_error, to_json, value_json,
};

pub struct SqliteChainRunRepository {
    pool: DatabasePool,
}

impl SqliteChainRunRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct ChainRunRow {
    id: String,
    chain_id: String,
    status: String,
    current_agent_id: Option<String>,
    initial_input: String,
    final_output: Option<String>,
    step_results: String,
    error: Option<String>,
    started_at: String,
    completed_at: Option<String>,
}

impl ChainRunRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            chain_id: row.try_get("chain_id")?,
            status: row.try_get("status")?,
            current_agent_id: row.try_get("current_agent_id")?,
            initial_input: row.try_get("initial_input")?,
            final_output: row.try_get("final_output")?,
            step_results: row.try_get("step_results")?,
            error: row.try_get("error")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_run(self) -> Result<ChainRun, RepositoryError> {
        let status: ChainRunStatus = self.status.parse().map_err(RepositoryError::Query)?;
        let final_output: Option<StepValue> = self
            .final_output
            .as_deref()
            .map(|s| parse_json("final_output", s))
            .transpose()?;
        let step_results: Vec<ChainStepResult> = parse_json("step_results", &self.step_results)?;

        Ok(ChainRun {
            id: parse_uuid(&self.id)?,
            chain_id: self.chain_id,
            status,
            current_agent_id: self.current_agent_id,
            initial_input: parse_json("initial_input", &self.initial_input)?,
            final_output,
            step_results,
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

impl ChainRunRepository for SqliteChainRunRepository {
    async fn create_chain_run(&self, run: &ChainRun) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"INSERT INTO chain_runs
               (id, chain_id, status, current_agent_id, initial_input, final_output,
                step_results, error, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.id.to_string())
        .bind(&run.chain_id)
        .bind(run.status.as_str())
        .bind(&run.current_agent_id)
        .bind(to_json(&run.initial_input)?)
        .bind(value_json(run.final_output.as_ref())?)
        .bind(to_json(&run.step_results)?)
        .bind(&run.error)
        .bind(format_datetime(&run.started_at))
        .bind(run.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(RepositoryError::Conflict(
                format!("chain run {} already exists", run.id),
            )),
            Err(e) => Err(query_error(e)),
        }
    }

    async fn save_chain_run(&self, run: &ChainRun) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE chain_runs
               SET status = ?, current_agent_id = ?, final_output = ?, step_results = ?,
                   error = ?, completed_at = ?
               WHERE id = ?"#,
        )
        .bind(run.status.as_str())
        .bind(&run.current_agent_id)
        .bind(value_json(run.final_output.as_ref())?)
        .bind(to_json(&run.step_results)?)
        .bind(&run.error)
        .bind(run.completed_at.as_ref().map(format_datetime))
        .bind(run.id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get_chain_run(&self, id: &Uuid) -> Result<Option<ChainRun>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chain_runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let r = ChainRunRow::from_row(&row).map_err(query_error)?;
                Ok(Some(r.into_run()?))
            }
            None => Ok(None),
        }
    }

    async fn list_chain_runs(&self, chain_id: &str, limit: u32) -> Result<Vec<ChainRun>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM chain_runs WHERE chain_id = ? ORDER BY started_at DESC, id DESC LIMIT ?",
        )
        .bind(chain_id)
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut runs = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = ChainRunRow::from_row(row).map_err(query_error)?;
            runs.push(r.into_run()?);
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn test_repo() -> SqliteChainRunRepository {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        std::mem::forget(dir);
        SqliteChainRunRepository::new(DatabasePool::new(&url).await.unwrap())
    }

    #[tokio::test]
    async fn test_chain_run_round_trip() {
        let repo = test_repo().await;
        let mut run = ChainRun::start("research", StepValue::from("quantum batteries"));
        repo.create_chain_run(&run).await.unwrap();

        run.step_results.push(ChainStepResult {
            agent_id: "researcher".to_string(),
            agent_name: "Researcher".to_string(),
            output: StepValue::from("notes"),
            completed_at: Utc::now(),
        });
        run.current_agent_id = Some("researcher".to_string());
        run.final_output = Some(StepValue::from("notes"));
        run.status = ChainRunStatus::Completed;
        run.completed_at = Some(Utc::now());
        repo.save_chain_run(&run).await.unwrap();

        let loaded = repo.get_chain_run(&run.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ChainRunStatus::Completed);
        assert_eq!(loaded.step_results.len(), 1);
        assert_eq!(loaded.step_results[0].agent_name, "Researcher");
        assert_eq!(loaded.final_output, Some(StepValue::from("notes")));
        assert_eq!(loaded.initial_input, StepValue::from("quantum batteries"));
    }

    #[tokio::test]
    async fn test_save_unknown_run_is_not_found() {
        let repo = test_repo().await;
        let run = ChainRun::start("research", StepValue::Null);
        assert!(matches!(
            repo.save_chain_run(&run).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_list_chain_runs_filters_by_chain() {
        let repo = test_repo().await;
        for _ in 0..2 {
            repo.create_chain_run(&ChainRun::start("research", StepValue::Null))
                .await
                .unwrap();
        }
        repo.create_chain_run(&ChainRun::start("publish", StepValue::Null))
            .await
            .unwrap();

        assert_eq!(repo.list_chain_runs("research", 10).await.unwrap().len(), 2);
        assert_eq!(repo.list_chain_runs("research", 1).await.unwrap().len(), 1);
        assert_eq!(repo.list_chain_runs("publish", 10).await.unwrap().len(), 1);
        assert!(repo.get_chain_run(&Uuid::now_v7()).await.unwrap().is_none());
    }
}
