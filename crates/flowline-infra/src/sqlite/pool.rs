//! Connection pools for the run store.
//!
//! Execution rows, step logs and chain runs live in one SQLite file. Engines
//! write through a single connection so a run's row and its step logs are
//! never written concurrently; `flowline executions` and `flowline show` read
//! through a read-only pool that WAL mode keeps unblocked during a run.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// File name of the database inside the data directory.
pub const DATABASE_FILE: &str = "flowline.db";

const READ_CONNECTIONS: u32 = 8;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// The run store's reader and writer pools.
#[derive(Clone)]
pub struct DatabasePool {
    /// Read-only; used for `get_*` and `list_*` queries.
    pub reader: SqlitePool,
    /// One connection; every insert and status transition goes here.
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open (or create) the store at `database_url` and bring its schema up
    /// to date.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT)
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await?;

        // Readers open the file read-only, so the tables must exist first.
        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(READ_CONNECTIONS)
            .connect_with(options.read_only(true))
            .await?;

        tracing::debug!(database_url, "run store ready");
        Ok(Self { reader, writer })
    }

    /// Open `{data_dir}/flowline.db`, creating the directory if needed.
    pub async fn open_in(data_dir: &Path) -> Result<Self, sqlx::Error> {
        tokio::fs::create_dir_all(data_dir).await?;
        Self::new(&database_url(data_dir)).await
    }
}

/// SQLite URL for the run store in `data_dir`.
pub fn database_url(data_dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", data_dir.join(DATABASE_FILE).display())
}
