//! Tool executor port and registry.
//!
//! A tool performs one unit of work for a step (an HTTP call, a query, a
//! local function). The engine only sees the [`ToolExecutor`] port; hosts
//! normally satisfy it with a [`ToolRegistry`] of [`BoxTool`]s built once at
//! startup.

pub mod box_tool;
pub mod registry;

use std::collections::BTreeMap;
use std::future::Future;

use flowline_types::value::StepValue;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use box_tool::BoxTool;
pub use registry::ToolRegistry;

/// Parameters handed to a tool invocation.
pub type ToolParams = BTreeMap<String, StepValue>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("tool call cancelled")]
    Cancelled,
}

/// Per-invocation context passed alongside the parameters.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub execution_id: Uuid,
    pub step_id: String,
    /// Zero-based loop iteration, `None` for non-loop steps.
    pub iteration: Option<u32>,
    /// Cancelled when the execution is cancelled; tools should honour it.
    pub cancel: CancellationToken,
}

impl ToolCall {
    pub fn new(execution_id: Uuid, step_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            execution_id,
            step_id: step_id.into(),
            iteration: None,
            cancel,
        }
    }

    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = Some(iteration);
        self
    }
}

/// A single named tool.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
/// Wrap in [`BoxTool`] for storage in a registry.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// One-line description shown by hosts when listing tools.
    fn description(&self) -> &str {
        ""
    }

    fn execute(
        &self,
        params: ToolParams,
        call: ToolCall,
    ) -> impl Future<Output = Result<StepValue, ToolError>> + Send;
}

/// The engine's view of the tool layer: `execute(toolName, params)`.
pub trait ToolExecutor: Send + Sync {
    /// Whether `tool` can be executed. Used when compiling definitions.
    fn supports(&self, tool: &str) -> bool;

    fn execute(
        &self,
        tool: &str,
        params: ToolParams,
        call: ToolCall,
    ) -> impl Future<Output = Result<StepValue, ToolError>> + Send;
}

/// Read a required string parameter.
pub fn require_str<'a>(params: &'a ToolParams, key: &str) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(StepValue::as_str)
        .ok_or_else(|| ToolError::InvalidParams(format!("'{key}' must be a string")))
}
