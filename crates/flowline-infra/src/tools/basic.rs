//! Local tools with no side effects.

use flowline_core::tool::{Tool, ToolCall, ToolError, ToolParams};
use flowline_types::value::StepValue;

/// Returns `null`. Useful for pure branching steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTool;

impl Tool for NoopTool {
    fn name(&self) -> &str {
        "noop"
    }

    fn description(&self) -> &str {
        "Does nothing and returns null"
    }

    async fn execute(&self, _params: ToolParams, _call: ToolCall) -> Result<StepValue, ToolError> {
        Ok(StepValue::Null)
    }
}

/// Returns its effective parameters as a mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoTool;

impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Returns its parameters unchanged"
    }

    async fn execute(&self, params: ToolParams, _call: ToolCall) -> Result<StepValue, ToolError> {
        Ok(StepValue::Mapping(params))
    }
}

/// Always fails with `params.message`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailTool;

impl Tool for FailTool {
    fn name(&self) -> &str {
        "fail"
    }

    fn description(&self) -> &str {
        "Fails with the given message"
    }

    async fn execute(&self, params: ToolParams, _call: ToolCall) -> Result<StepValue, ToolError> {
        let message = params
            .get("message")
            .map(StepValue::display_string)
            .unwrap_or_else(|| "fail tool invoked".to_string());
        Err(ToolError::Failed(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    fn call() -> ToolCall {
        ToolCall::new(Uuid::now_v7(), "step", CancellationToken::new())
    }

    #[tokio::test]
    async fn echo_returns_params() {
        let mut params = ToolParams::new();
        params.insert("a".to_string(), StepValue::from(1_i64));
        let out = EchoTool.execute(params.clone(), call()).await.unwrap();
        assert_eq!(out, StepValue::Mapping(params));
    }

    #[tokio::test]
    async fn noop_returns_null() {
        assert_eq!(NoopTool.execute(ToolParams::new(), call()).await.unwrap(), StepValue::Null);
    }

    #[tokio::test]
    async fn fail_uses_message_param() {
        let mut params = ToolParams::new();
        params.insert("message".to_string(), StepValue::from("disk full"));
        let err = FailTool.execute(params, call()).await.unwrap_err();
        assert_eq!(err, ToolError::Failed("disk full".to_string()));

        let err = FailTool.execute(ToolParams::new(), call()).await.unwrap_err();
        assert_eq!(err, ToolError::Failed("fail tool invoked".to_string()));
    }
}
