//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (flowline-infra) implements. The core crate never depends on any specific
//! storage technology; `memory` holds in-process implementations for tests
//! and ephemeral runs.

pub mod chain;
pub mod execution;
pub mod memory;

pub use chain::ChainRunRepository;
pub use execution::ExecutionRecorder;
pub use memory::{InMemoryChainRunRepository, InMemoryExecutionRecorder};
