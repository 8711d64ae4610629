//! Name-keyed registry of tools.

use std::collections::HashMap;

use flowline_types::value::StepValue;

use super::{BoxTool, Tool, ToolCall, ToolError, ToolExecutor, ToolParams};

/// Maps tool names to handlers. Built once and handed to the engine.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, BoxTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name, replacing any previous entry.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> &mut Self {
        let boxed = BoxTool::new(tool);
        self.tools.insert(boxed.name().to_string(), boxed);
        self
    }

    pub fn with<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<&BoxTool> {
        self.tools.get(name)
    }

    /// Registered tools sorted by name.
    pub fn tools(&self) -> Vec<&BoxTool> {
        let mut tools: Vec<&BoxTool> = self.tools.values().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl ToolExecutor for ToolRegistry {
    fn supports(&self, tool: &str) -> bool {
        self.tools.contains_key(tool)
    }

    async fn execute(
        &self,
        tool: &str,
        params: ToolParams,
        call: ToolCall,
    ) -> Result<StepValue, ToolError> {
        let handler = self
            .tools
            .get(tool)
            .ok_or_else(|| ToolError::UnknownTool(tool.to_string()))?;
        if call.cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }
        handler.execute(params, call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::require_str;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    struct Upper;

    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        async fn execute(&self, params: ToolParams, _call: ToolCall) -> Result<StepValue, ToolError> {
            let text = require_str(&params, "text")?;
            Ok(StepValue::from(text.to_uppercase()))
        }
    }

    fn call() -> ToolCall {
        ToolCall::new(Uuid::now_v7(), "s1", CancellationToken::new())
    }

    #[tokio::test]
    async fn dispatches_by_name() {
        let registry = ToolRegistry::new().with(Upper);
        assert!(registry.supports("upper"));
        assert!(!registry.supports("lower"));

        let params = ToolParams::from([("text".to_string(), StepValue::from("hi"))]);
        let out = registry.execute("upper", params, call()).await.unwrap();
        assert_eq!(out, StepValue::from("HI"));
    }

    #[tokio::test]
    async fn unknown_tool_is_error() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("missing", ToolParams::new(), call())
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::UnknownTool("missing".to_string()));
    }

    #[tokio::test]
    async fn invalid_params_surface() {
        let registry = ToolRegistry::new().with(Upper);
        let err = registry
            .execute("upper", ToolParams::new(), call())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn cancelled_call_is_not_dispatched() {
        let registry = ToolRegistry::new().with(Upper);
        let call = call();
        call.cancel.cancel();
        let params = ToolParams::from([("text".to_string(), StepValue::from("hi"))]);
        let err = registry.execute("upper", params, call).await.unwrap_err();
        assert_eq!(err, ToolError::Cancelled);
    }

    #[test]
    fn tools_are_listed_sorted() {
        let registry = ToolRegistry::new().with(Upper);
        let names: Vec<&str> = registry.tools().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["upper"]);
        assert_eq!(registry.len(), 1);
    }
}
