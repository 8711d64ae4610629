//! Agent chain coordination.
//!
//! When an agent task completes, its `ChainConfig` decides whether the next
//! agent runs and with what input. Agents themselves are external: the host
//! supplies an [`AgentRunner`] and, for `summary`/`custom` input modes, an
//! [`OutputShaper`].

pub mod coordinator;

use std::future::Future;

use flowline_types::chain::ChainRunStatus;
use flowline_types::error::RepositoryError;
use flowline_types::value::StepValue;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::workflow::condition::ConditionError;
use crate::workflow::resolver::ResolutionError;

pub use coordinator::{ChainCoordinator, ChainEndReason, ChainStepOutcome};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure reported by a host capability (agent task, summarizer, transform).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct AgentError(pub String);

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("agent '{agent_id}' failed: {source}")]
    Agent {
        agent_id: String,
        #[source]
        source: AgentError,
    },

    #[error("shaping output of agent '{agent_id}' failed: {source}")]
    Shaping {
        agent_id: String,
        #[source]
        source: AgentError,
    },

    #[error("agent '{agent_id}' has a malformed chain condition: {source}")]
    MalformedCondition {
        agent_id: String,
        #[source]
        source: ConditionError,
    },

    #[error("chain condition of agent '{agent_id}' failed to resolve: {source}")]
    Condition {
        agent_id: String,
        #[source]
        source: ResolutionError,
    },

    #[error("chain exceeded {max_hops} agent invocations")]
    HopLimitExceeded { max_hops: u32 },

    #[error("chain run {0} already has a final output")]
    FinalOutputAlreadySet(Uuid),

    #[error("chain run {run_id} is {} and cannot advance", .status.as_str())]
    RunNotActive { run_id: Uuid, status: ChainRunStatus },
}

// ---------------------------------------------------------------------------
// Host capabilities
// ---------------------------------------------------------------------------

/// Runs agent tasks on behalf of the coordinator.
pub trait AgentRunner: Send + Sync {
    /// Display name of an agent, if known.
    fn agent_name(&self, agent_id: &str) -> Option<String>;

    /// Run the agent's task entry point with the given input.
    fn run_task(
        &self,
        agent_id: &str,
        input: StepValue,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<StepValue, AgentError>> + Send;
}

/// Reshapes an agent's output for the `summary` and `custom` input modes.
pub trait OutputShaper: Send + Sync {
    fn summarize(
        &self,
        output: &StepValue,
    ) -> impl Future<Output = Result<StepValue, AgentError>> + Send;

    fn transform(
        &self,
        agent_id: &str,
        output: &StepValue,
    ) -> impl Future<Output = Result<StepValue, AgentError>> + Send;
}

/// Shaper for hosts without a summarizer: both modes pass output through.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughShaper;

impl OutputShaper for PassThroughShaper {
    async fn summarize(&self, output: &StepValue) -> Result<StepValue, AgentError> {
        Ok(output.clone())
    }

    async fn transform(&self, _agent_id: &str, output: &StepValue) -> Result<StepValue, AgentError> {
        Ok(output.clone())
    }
}
