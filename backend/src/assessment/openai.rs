use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::AssessmentConfig;

#[derive(thiserror::Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("LLM API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("LLM response contained no text output")]
    EmptyOutput,
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    reasoning: Reasoning<'a>,
    service_tier: &'a str,
}

#[derive(Debug, Serialize)]
struct Tool {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct Reasoning<'a> {
    effort: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ResponsesReply {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl ResponsesReply {
    /// Concatenation of every `output_text` part of every message item.
    pub fn output_text(&self) -> String {
        self.output
            .iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| item.content.iter())
            .filter(|part| part.kind == "output_text")
            .map(|part| part.text.as_str())
            .collect()
    }
}

/// Minimal client for the OpenAI Responses API.
#[derive(Clone)]
pub struct ResponsesClient {
    http_client: HttpClient,
    api_key: String,
    base_url: String,
    model: String,
    reasoning_effort: String,
    service_tier: String,
    web_search: bool,
}

impl ResponsesClient {
    pub fn new(config: &AssessmentConfig, api_key: String) -> Result<Self, LlmError> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            reasoning_effort: config.reasoning_effort.clone(),
            service_tier: config.service_tier.clone(),
            web_search: config.web_search,
        })
    }

    pub async fn create_response(&self, instructions: &str, input: &str) -> Result<String, LlmError> {
        let body = ResponsesRequest {
            model: &self.model,
            instructions,
            input,
            tools: if self.web_search {
                vec![Tool { kind: "web_search" }]
            } else {
                Vec::new()
            },
            reasoning: Reasoning {
                effort: &self.reasoning_effort,
            },
            service_tier: &self.service_tier,
        };

        let response = self
            .http_client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&raw)
                .map(|b| b.error.message)
                .unwrap_or(raw);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let reply: ResponsesReply = response.json().await?;
        let text = reply.output_text();
        if text.trim().is_empty() {
            return Err(LlmError::EmptyOutput);
        }
        Ok(text)
    }
}
