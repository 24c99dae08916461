//! Anthropic Messages API transport used by remote region classification.
//!
//! One request per call, no retries: the classifier chain owns the deadline
//! and the fallback. Sampling runs at temperature 0 so the same template
//! classifies the same way twice.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Default model for classification calls.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
/// A few hundred spans' worth of area entries.
const MAX_TOKENS: u32 = 8192;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("response body could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("response has no text content")]
    EmptyContent,

    #[error("response was cut off at the token limit")]
    Truncated,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [UserMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<Block>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl MessagesResponse {
    /// All text blocks, concatenated, with any code fence removed.
    fn into_text(self) -> Result<String, LlmError> {
        if self.stop_reason.as_deref() == Some("max_tokens") {
            return Err(LlmError::Truncated);
        }
        let text: String = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                Block::Text { text } => Some(text),
                Block::Other => None,
            })
            .collect();
        let text = strip_code_fence(&text);
        if text.is_empty() {
            Err(LlmError::EmptyContent)
        } else {
            Ok(text.to_string())
        }
    }
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    /// `timeout` bounds the HTTP exchange; callers may impose a tighter
    /// deadline of their own.
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key,
            model,
        })
    }

    /// Points the client at a proxy or gateway instead of the public API.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends one user prompt and returns the model's text answer.
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            system,
            messages: [UserMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!("Messages API returned {status}");
            return Err(api_error(status.as_u16(), body));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body)?;
        if let Some(usage) = &parsed.usage {
            debug!(
                "Messages call done: input_tokens={}, output_tokens={}",
                usage.input_tokens, usage.output_tokens
            );
        }
        parsed.into_text()
    }
}

fn api_error(status: u16, body: String) -> LlmError {
    let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    LlmError::Api { status, message }
}

/// Removes a surrounding markdown code fence (with or without a language
/// tag). Unfenced text is only trimmed.
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (`json`, `JSON`, ...) up to the first newline.
    let body = match rest.find('\n') {
        Some(newline) if rest[..newline].chars().all(|c| c.is_ascii_alphanumeric()) => {
            &rest[newline + 1..]
        }
        _ => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
