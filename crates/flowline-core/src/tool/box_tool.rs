//! BoxTool -- object-safe dynamic dispatch wrapper for Tool.
//!
//! 1. Define an object-safe `ToolDyn` trait with boxed futures
//! 2. Blanket-impl `ToolDyn` for all `T: Tool`
//! 3. `BoxTool` wraps `Box<dyn ToolDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use flowline_types::value::StepValue;

use super::{Tool, ToolCall, ToolError, ToolParams};

/// Object-safe version of [`Tool`] with boxed futures.
pub trait ToolDyn: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn execute_boxed<'a>(
        &'a self,
        params: ToolParams,
        call: ToolCall,
    ) -> Pin<Box<dyn Future<Output = Result<StepValue, ToolError>> + Send + 'a>>;
}

impl<T: Tool> ToolDyn for T {
    fn name(&self) -> &str {
        Tool::name(self)
    }

    fn description(&self) -> &str {
        Tool::description(self)
    }

    fn execute_boxed<'a>(
        &'a self,
        params: ToolParams,
        call: ToolCall,
    ) -> Pin<Box<dyn Future<Output = Result<StepValue, ToolError>> + Send + 'a>> {
        Box::pin(self.execute(params, call))
    }
}

/// Type-erased tool so heterogeneous tools share one registry.
pub struct BoxTool {
    inner: Box<dyn ToolDyn + Send + Sync>,
}

impl BoxTool {
    pub fn new<T: Tool + 'static>(tool: T) -> Self {
        Self {
            inner: Box::new(tool),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn description(&self) -> &str {
        self.inner.description()
    }

    pub async fn execute(&self, params: ToolParams, call: ToolCall) -> Result<StepValue, ToolError> {
        self.inner.execute_boxed(params, call).await
    }
}

impl std::fmt::Debug for BoxTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxTool").field("name", &self.name()).finish()
    }
}
