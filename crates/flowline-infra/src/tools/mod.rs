//! Built-in tools.
//!
//! `builtin_registry` builds the registry a host gets without registering
//! anything of its own: `noop`, `echo`, `fail`, `http_get` and `http_request`.

pub mod basic;
pub mod http;

use flowline_core::tool::ToolRegistry;
use flowline_types::config::HttpSettings;

pub use basic::{EchoTool, FailTool, NoopTool};
pub use http::{HttpClient, HttpGetTool, HttpRequestTool};

/// Registry with every built-in tool.
pub fn builtin_registry(http: &HttpSettings) -> Result<ToolRegistry, reqwest::Error> {
    let client = HttpClient::new(http)?;
    Ok(ToolRegistry::new()
        .with(NoopTool)
        .with(EchoTool)
        .with(FailTool)
        .with(HttpGetTool::new(client.clone()))
        .with(HttpRequestTool::new(client)))
}
