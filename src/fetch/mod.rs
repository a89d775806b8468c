//! Content retrieval strategies exposed as the `fetch` tool
//!
//! Every strategy shares the same input contract and failure policy: retrieval
//! errors become `isError` tool results, never protocol errors.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use rust_mcp_sdk::schema::{CallToolResult, ContentBlock, TextContent, Tool};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::{Config, Environment, StrategyKind};
use crate::errors::{AppError, FetchError};

pub mod direct;
pub mod llm;
pub mod proxy;

pub const FETCH_TOOL_NAME: &str = "fetch";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            "PATCH" => Some(Self::Patch),
            _ => None,
        }
    }

    /// GET and DELETE never carry a request body upstream.
    pub fn allows_body(self) -> bool {
        !matches!(self, Self::Get | Self::Delete)
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FetchToolParams {
    pub url: String,
    pub method: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchInput {
    pub url: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl FetchInput {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            body: None,
        }
    }
}

impl TryFrom<FetchToolParams> for FetchInput {
    type Error = AppError;

    fn try_from(params: FetchToolParams) -> Result<Self, Self::Error> {
        let url = params.url.trim().to_string();
        if url.is_empty() {
            return Err(AppError::bad_request("invalid_url", "url must not be empty"));
        }

        let method = match params.method.as_deref() {
            None => HttpMethod::Get,
            Some(value) => HttpMethod::parse(value).ok_or_else(|| {
                AppError::bad_request(
                    "invalid_method",
                    "method must be one of: GET, POST, PUT, DELETE, PATCH",
                )
            })?,
        };

        Ok(Self {
            url,
            method,
            headers: params.headers.unwrap_or_default(),
            body: params.body,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutput {
    pub text: String,
    pub metadata: Option<Map<String, Value>>,
}

impl FetchOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: None,
        }
    }
}

#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Schema advertised through `tools/list`. Always named `fetch`.
    fn tool(&self) -> Tool;

    /// Whether the advertised schema includes `method`, `headers` and `body`.
    /// When it does not, those arguments are ignored rather than validated.
    fn accepts_request_options(&self) -> bool {
        false
    }

    async fn fetch(&self, input: &FetchInput) -> Result<FetchOutput, FetchError>;
}

pub fn build_strategy(
    config: &Config,
    env: &Environment,
    client: reqwest::Client,
) -> Arc<dyn FetchStrategy> {
    match config.strategy {
        StrategyKind::Direct => Arc::new(direct::DirectFetcher::new(client)),
        StrategyKind::Jina => Arc::new(proxy::JinaReader::new(
            client,
            config.jina_reader_url.clone(),
            env.jina_token.clone(),
        )),
        StrategyKind::Gemini => Arc::new(llm::GeminiUrlContext::new(
            client,
            config.gemini_api_url.clone(),
            config.gemini_model.clone(),
            env.google_api_key.clone(),
        )),
    }
}

/// Runs one tool call. Malformed arguments are an `AppError`; everything that
/// goes wrong while retrieving is folded into an `isError` result.
pub async fn handle_fetch_call(
    strategy: &dyn FetchStrategy,
    arguments: Option<Map<String, Value>>,
) -> Result<CallToolResult, AppError> {
    let mut params: FetchToolParams =
        serde_json::from_value(Value::Object(arguments.unwrap_or_default()))
            .map_err(|err| AppError::bad_request("invalid_arguments", err.to_string()))?;
    if !strategy.accepts_request_options() {
        params.method = None;
        params.headers = None;
        params.body = None;
    }
    let input = FetchInput::try_from(params)?;

    info!(url = %input.url, strategy = strategy.name(), "fetching url");

    match strategy.fetch(&input).await {
        Ok(output) => Ok(text_result(output.text, false, output.metadata)),
        Err(err) => {
            warn!(url = %input.url, strategy = strategy.name(), error = %err, "fetch failed");
            Ok(text_result(format!("Error fetching URL: {err}"), true, None))
        }
    }
}

fn text_result(text: String, is_error: bool, meta: Option<Map<String, Value>>) -> CallToolResult {
    CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(text, None, None))],
        is_error: is_error.then_some(true),
        meta,
        structured_content: None,
    }
}
