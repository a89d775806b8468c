//! Direct HTTP retrieval: returns status, headers and a content-type aware body.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use rust_mcp_sdk::{macros, schema::Tool};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{FetchInput, FetchOutput, FetchStrategy};
use crate::errors::FetchError;

pub const USER_AGENT_VALUE: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[macros::mcp_tool(
    name = "fetch",
    description = "Fetch a URL and return the HTTP status, headers and body as JSON"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct DirectFetchTool {
    /// The URL to fetch
    pub url: String,
    /// HTTP method: GET, POST, PUT, DELETE or PATCH. Defaults to GET
    pub method: Option<String>,
    /// Additional request headers
    pub headers: Option<HashMap<String, String>>,
    /// Request body, ignored for GET and DELETE
    pub body: Option<String>,
}

pub struct DirectFetcher {
    client: reqwest::Client,
}

impl DirectFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FetchStrategy for DirectFetcher {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn tool(&self) -> Tool {
        DirectFetchTool::tool()
    }

    fn accepts_request_options(&self) -> bool {
        true
    }

    async fn fetch(&self, input: &FetchInput) -> Result<FetchOutput, FetchError> {
        let mut request = self
            .client
            .request(input.method.into(), &input.url)
            .headers(request_headers(&input.headers)?);

        if input.method.allows_body() {
            if let Some(body) = &input.body {
                request = request.body(body.clone());
            }
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response_headers(response.headers());
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;

        let payload = json!({
            "status": status.as_u16(),
            "statusText": status.canonical_reason().unwrap_or_default(),
            "headers": headers,
            "body": classify_body(content_type.as_deref(), &bytes)?,
        });

        let text = serde_json::to_string_pretty(&payload).map_err(FetchError::InvalidJson)?;
        Ok(FetchOutput::text(text))
    }
}

/// Caller headers override the default `User-Agent`.
fn request_headers(extra: &BTreeMap<String, String>) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

    for (name, value) in extra {
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| FetchError::InvalidHeader(name.clone()))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| FetchError::InvalidHeader(name.to_string()))?;
        headers.insert(name, value);
    }

    Ok(headers)
}

/// Repeated headers are joined with `", "`.
fn response_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    collected
}

pub fn classify_body(content_type: Option<&str>, bytes: &[u8]) -> Result<Value, FetchError> {
    let Some(content_type) = content_type else {
        return Ok(Value::String("Binary content (unknown)".to_string()));
    };

    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if essence == "application/json" || essence.ends_with("+json") {
        return serde_json::from_slice(bytes).map_err(FetchError::InvalidJson);
    }

    if essence.starts_with("text/") {
        return Ok(Value::String(String::from_utf8_lossy(bytes).into_owned()));
    }

    Ok(Value::String(format!("Binary content ({content_type})")))
}
