//! HTTP tools backed by `reqwest`.
//!
//! Both tools return `{status, headers, body}`. The body is parsed as JSON
//! when it is valid JSON and kept as a string otherwise. Requests are raced
//! against the step's cancellation token.

use std::collections::BTreeMap;
use std::time::Duration;

use flowline_core::tool::{require_str, Tool, ToolCall, ToolError, ToolParams};
use flowline_types::config::HttpSettings;
use flowline_types::value::StepValue;
use futures_util::StreamExt;

/// Response bodies larger than this fail the tool.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared HTTP client for the HTTP tools.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new(settings: &HttpSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!("flowline/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn send(
        &self,
        method: reqwest::Method,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<RequestBody>,
        call: &ToolCall,
    ) -> Result<StepValue, ToolError> {
        let mut request = self.client.request(method.clone(), url);
        for (key, value) in headers {
            request = request.header(key.as_str(), value.as_str());
        }
        request = match body {
            Some(RequestBody::Text(text)) => request.body(text),
            Some(RequestBody::Json(json)) => request.json(&json),
            None => request,
        };

        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|e| ToolError::Failed(format!("HTTP request to '{url}' failed: {e}")))?;

            let status = response.status().as_u16();
            let response_headers: BTreeMap<String, StepValue> = response
                .headers()
                .iter()
                .map(|(k, v)| {
                    (
                        k.as_str().to_string(),
                        StepValue::from(v.to_str().unwrap_or("<binary>")),
                    )
                })
                .collect();

            let mut bytes = Vec::new();
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk
                    .map_err(|e| ToolError::Failed(format!("failed to read HTTP response body: {e}")))?;
                if bytes.len() + chunk.len() > MAX_BODY_BYTES {
                    return Err(ToolError::Failed(format!(
                        "response body from '{url}' exceeds {MAX_BODY_BYTES} bytes"
                    )));
                }
                bytes.extend_from_slice(&chunk);
            }

            Ok::<_, ToolError>((status, response_headers, bytes))
        };

        let (status, response_headers, bytes) = tokio::select! {
            biased;
            _ = call.cancel.cancelled() => return Err(ToolError::Cancelled),
            result = exchange => result?,
        };

        tracing::debug!(
            step_id = %call.step_id,
            %method,
            url,
            status,
            body_len = bytes.len(),
            "HTTP tool completed"
        );

        let mut out = BTreeMap::new();
        out.insert("status".to_string(), StepValue::from(u64::from(status)));
        out.insert("headers".to_string(), StepValue::Mapping(response_headers));
        out.insert("body".to_string(), parse_body(&bytes));
        Ok(StepValue::Mapping(out))
    }
}

enum RequestBody {
    Text(String),
    Json(serde_json::Value),
}

/// JSON when possible, otherwise the lossy UTF-8 text.
fn parse_body(bytes: &[u8]) -> StepValue {
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(json) => StepValue::from(json),
        Err(_) => StepValue::from(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Optional `headers` param: a mapping of scalar values.
fn headers_param(params: &ToolParams) -> Result<BTreeMap<String, String>, ToolError> {
    match params.get("headers") {
        None | Some(StepValue::Null) => Ok(BTreeMap::new()),
        Some(StepValue::Mapping(map)) => Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), v.display_string()))
            .collect()),
        Some(other) => Err(ToolError::InvalidParams(format!(
            "'headers' must be a mapping, got {}",
            other.kind()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// `GET url` with optional headers.
#[derive(Debug, Clone)]
pub struct HttpGetTool {
    client: HttpClient,
}

impl HttpGetTool {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

impl Tool for HttpGetTool {
    fn name(&self) -> &str {
        "http_get"
    }

    fn description(&self) -> &str {
        "GET a URL; params: url, headers?"
    }

    async fn execute(&self, params: ToolParams, call: ToolCall) -> Result<StepValue, ToolError> {
        let url = require_str(&params, "url")?;
        let headers = headers_param(&params)?;
        self.client
            .send(reqwest::Method::GET, url, &headers, None, &call)
            .await
    }
}

/// Arbitrary method with optional headers and body.
///
/// A string body is sent as-is; any other body is sent as JSON.
#[derive(Debug, Clone)]
pub struct HttpRequestTool {
    client: HttpClient,
}

impl HttpRequestTool {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        "http_request"
    }

    fn description(&self) -> &str {
        "Send an HTTP request; params: method?, url, headers?, body?"
    }

    async fn execute(&self, params: ToolParams, call: ToolCall) -> Result<StepValue, ToolError> {
        let url = require_str(&params, "url")?;
        let method_name = params
            .get("method")
            .and_then(StepValue::as_str)
            .unwrap_or("GET")
            .to_ascii_uppercase();
        let method: reqwest::Method = method_name
            .parse()
            .map_err(|_| ToolError::InvalidParams(format!("invalid HTTP method: {method_name}")))?;
        let headers = headers_param(&params)?;
        let body = match params.get("body") {
            None | Some(StepValue::Null) => None,
            Some(StepValue::String(text)) => Some(RequestBody::Text(text.clone())),
            Some(other) => Some(RequestBody::Json(other.to_json())),
        };

        self.client.send(method, url, &headers, body, &call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    fn call() -> ToolCall {
        ToolCall::new(Uuid::now_v7(), "fetch", CancellationToken::new())
    }

    fn client() -> HttpClient {
        HttpClient::new(&HttpSettings::default()).unwrap()
    }

    #[test]
    fn body_parses_json_or_falls_back_to_text() {
        assert_eq!(
            parse_body(br#"{"ok": true}"#),
            StepValue::from(json!({"ok": true}))
        );
        assert_eq!(parse_body(b"plain text"), StepValue::from("plain text"));
    }

    #[test]
    fn headers_must_be_a_mapping() {
        let mut params = ToolParams::new();
        params.insert("headers".to_string(), StepValue::from(json!({"X-Id": 7})));
        let headers = headers_param(&params).unwrap();
        assert_eq!(headers["X-Id"], "7");

        params.insert("headers".to_string(), StepValue::from("nope"));
        assert!(matches!(headers_param(&params), Err(ToolError::InvalidParams(_))));
    }

    #[tokio::test]
    async fn missing_url_is_invalid_params() {
        let err = HttpGetTool::new(client())
            .execute(ToolParams::new(), call())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn bad_method_is_invalid_params() {
        let mut params = ToolParams::new();
        params.insert("url".to_string(), StepValue::from("http://127.0.0.1:9"));
        params.insert("method".to_string(), StepValue::from("NOT A METHOD"));
        let err = HttpRequestTool::new(client())
            .execute(params, call())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn cancelled_call_returns_cancelled() {
        let call = call();
        call.cancel.cancel();
        let mut params = ToolParams::new();
        params.insert("url".to_string(), StepValue::from("http://10.255.255.1/"));
        let err = HttpGetTool::new(client()).execute(params, call).await.unwrap_err();
        assert_eq!(err, ToolError::Cancelled);
    }
}
