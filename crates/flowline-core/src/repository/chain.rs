//! Chain run repository trait definition.

use std::future::Future;

use flowline_types::chain::ChainRun;
use flowline_types::error::RepositoryError;
use uuid::Uuid;

/// Storage port for agent chain runs.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait ChainRunRepository: Send + Sync {
    fn create_chain_run(
        &self,
        run: &ChainRun,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Overwrite a run with its latest state. Fails with `NotFound` if the
    /// run was never created.
    fn save_chain_run(
        &self,
        run: &ChainRun,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn get_chain_run(
        &self,
        id: &Uuid,
    ) -> impl Future<Output = Result<Option<ChainRun>, RepositoryError>> + Send;

    /// Most recent runs of a chain first.
    fn list_chain_runs(
        &self,
        chain_id: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<ChainRun>, RepositoryError>> + Send;
}
