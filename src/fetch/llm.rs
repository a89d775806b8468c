//! LLM-assisted retrieval using Gemini's URL context tool.

use async_trait::async_trait;
use rust_mcp_sdk::{macros, schema::Tool};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{FetchInput, FetchOutput, FetchStrategy};
use crate::{config::GOOGLE_API_KEY_VAR, errors::FetchError};

#[macros::mcp_tool(
    name = "fetch",
    description = "Fetch a URL and convert it to markdown using Gemini URL context"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct GeminiFetchTool {
    /// The URL to fetch and convert to markdown
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<Value>,
    url_context_metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

pub struct GeminiUrlContext {
    client: reqwest::Client,
    api_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiUrlContext {
    pub fn new(
        client: reqwest::Client,
        api_url: String,
        model: String,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            api_url,
            model,
            api_key,
        }
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_url.trim_end_matches('/'),
            self.model
        )
    }
}

pub fn build_prompt(url: &str) -> String {
    format!(
        "Fetch the content at {url} and convert it to clean, well-structured markdown. \
         Keep headings, lists, links, tables and code blocks. \
         Respond with the markdown only."
    )
}

#[async_trait]
impl FetchStrategy for GeminiUrlContext {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn tool(&self) -> Tool {
        GeminiFetchTool::tool()
    }

    async fn fetch(&self, input: &FetchInput) -> Result<FetchOutput, FetchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(FetchError::MissingCredential(GOOGLE_API_KEY_VAR))?;

        let request = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": build_prompt(&input.url) }]
            }],
            "tools": [{ "url_context": {} }]
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UpstreamStatus(status.as_u16()));
        }

        let completion: GenerateContentResponse = response.json().await?;
        into_output(completion)
    }
}

fn into_output(completion: GenerateContentResponse) -> Result<FetchOutput, FetchError> {
    let Some(candidate) = completion.candidates.into_iter().next() else {
        return Err(FetchError::EmptyCompletion);
    };

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(FetchError::EmptyCompletion);
    }

    // Provider metadata is passed through untouched.
    let mut metadata = Map::new();
    if let Some(grounding) = candidate.grounding_metadata {
        metadata.insert("groundingMetadata".to_string(), grounding);
    }
    if let Some(url_context) = candidate.url_context_metadata {
        metadata.insert("urlContextMetadata".to_string(), url_context);
    }

    Ok(FetchOutput {
        text,
        metadata: (!metadata.is_empty()).then_some(metadata),
    })
}
