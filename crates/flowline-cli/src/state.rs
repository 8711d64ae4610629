//! Application state shared by the CLI commands.
//!
//! Holds the resolved data directory, the loaded configuration and the
//! built-in tool registry. The database is opened only by commands that
//! need it, so `--ephemeral` runs never touch disk.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use flowline_core::repository::ExecutionRecorder;
use flowline_core::tool::ToolRegistry;
use flowline_core::workflow::WorkflowEngine;
use flowline_infra::config::{load_config, resolve_data_dir};
use flowline_infra::sqlite::pool::DatabasePool;
use flowline_infra::sqlite::{SqliteChainRunRepository, SqliteExecutionRecorder};
use flowline_infra::tools::builtin_registry;
use flowline_types::config::{EngineConfig, FlowlineConfig};

pub struct AppState {
    pub data_dir: PathBuf,
    pub config: FlowlineConfig,
    pub tools: Arc<ToolRegistry>,
}

impl AppState {
    /// Resolve the data directory, load `config.toml` and build the tools.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        let config = load_config(&data_dir).await;
        let tools = builtin_registry(&config.http).context("Failed to build the HTTP client")?;

        tracing::debug!(data_dir = %data_dir.display(), tools = tools.len(), "state initialized");
        Ok(Self {
            data_dir,
            config,
            tools: Arc::new(tools),
        })
    }

    /// Open (and migrate) `{data_dir}/flowline.db`.
    pub async fn open_pool(&self) -> anyhow::Result<DatabasePool> {
        DatabasePool::open_in(&self.data_dir)
            .await
            .with_context(|| format!("Failed to open database in {}", self.data_dir.display()))
    }

    pub async fn execution_recorder(&self) -> anyhow::Result<SqliteExecutionRecorder> {
        Ok(SqliteExecutionRecorder::new(self.open_pool().await?))
    }

    pub async fn chain_repository(&self) -> anyhow::Result<SqliteChainRunRepository> {
        Ok(SqliteChainRunRepository::new(self.open_pool().await?))
    }

    /// Engine over the built-in tools and the given recorder.
    pub fn engine<R: ExecutionRecorder>(
        &self,
        recorder: Arc<R>,
        config: EngineConfig,
    ) -> WorkflowEngine<ToolRegistry, R> {
        WorkflowEngine::new(Arc::clone(&self.tools), recorder, config)
    }
}
