//! Markdown conversion through the Jina reader proxy.

use async_trait::async_trait;
use rust_mcp_sdk::{macros, schema::Tool};
use serde::{Deserialize, Serialize};

use super::{FetchInput, FetchOutput, FetchStrategy};
use crate::{config::JINA_TOKEN_VAR, errors::FetchError};

#[macros::mcp_tool(
    name = "fetch",
    description = "Fetch a URL and convert it to markdown using Jina"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct JinaFetchTool {
    /// The URL to fetch and convert to markdown
    pub url: String,
}

pub struct JinaReader {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl JinaReader {
    pub fn new(client: reqwest::Client, base_url: String, token: Option<String>) -> Self {
        Self {
            client,
            base_url,
            token,
        }
    }

    /// The target URL is appended verbatim to the reader base.
    pub fn reader_url(&self, url: &str) -> String {
        format!("{}{}", self.base_url, url)
    }
}

#[async_trait]
impl FetchStrategy for JinaReader {
    fn name(&self) -> &'static str {
        "jina"
    }

    fn tool(&self) -> Tool {
        JinaFetchTool::tool()
    }

    async fn fetch(&self, input: &FetchInput) -> Result<FetchOutput, FetchError> {
        let token = self
            .token
            .as_deref()
            .ok_or(FetchError::MissingCredential(JINA_TOKEN_VAR))?;

        let response = self
            .client
            .get(self.reader_url(&input.url))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UpstreamStatus(status.as_u16()));
        }

        Ok(FetchOutput::text(response.text().await?))
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        extract::Path,
        http::{header, HeaderMap, StatusCode},
        response::IntoResponse,
        routing::get,
        Router,
    };

    use super::*;
    use crate::test_support::spawn_upstream;

    async fn reader(Path(target): Path<String>, headers: HeaderMap) -> impl IntoResponse {
        let authorized = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            == Some("Bearer jina-secret");
        if !authorized {
            return (StatusCode::UNAUTHORIZED, "denied".to_string());
        }

        (StatusCode::OK, format!("# Converted\n\nSource: {target}"))
    }

    async fn reader_base() -> String {
        let router = Router::new().route("/{*target}", get(reader));
        format!("{}/", spawn_upstream(router).await)
    }

    #[test]
    fn reader_url_appends_target() {
        let reader = JinaReader::new(
            reqwest::Client::new(),
            "https://r.jina.ai/".to_string(),
            None,
        );
        assert_eq!(
            reader.reader_url("https://example.com/page"),
            "https://r.jina.ai/https://example.com/page"
        );
    }

    #[tokio::test]
    async fn missing_token_names_env_var() {
        let reader = JinaReader::new(reqwest::Client::new(), "http://127.0.0.1:9/".to_string(), None);

        let error = reader
            .fetch(&FetchInput::get("https://example.com"))
            .await
            .expect_err("missing token must fail");
        assert!(matches!(error, FetchError::MissingCredential(_)));
        assert!(error.to_string().contains("JINA_TOKEN"));
    }

    #[tokio::test]
    async fn returns_markdown_verbatim() {
        let reader = JinaReader::new(
            reqwest::Client::new(),
            reader_base().await,
            Some("jina-secret".to_string()),
        );

        let output = reader
            .fetch(&FetchInput::get("https://example.com/page"))
            .await
            .expect("fetch succeeds");
        assert_eq!(output.text, "# Converted\n\nSource: https://example.com/page");
        assert!(output.metadata.is_none());
    }

    #[tokio::test]
    async fn upstream_failure_carries_status() {
        let reader = JinaReader::new(
            reqwest::Client::new(),
            reader_base().await,
            Some("wrong-token".to_string()),
        );

        let error = reader
            .fetch(&FetchInput::get("https://example.com"))
            .await
            .expect_err("unauthorized must fail");
        assert!(matches!(error, FetchError::UpstreamStatus(401)));
        assert!(error.to_string().contains("401"));
    }
}
