use async_trait::async_trait;
use futures::StreamExt;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::core::config::LlmConfig;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("LLM provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Could not parse LLM output: {0}")]
    Parse(String),
    #[error("LLM returned an empty response")]
    EmptyResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Per-call overrides; `None` falls back to the client configuration
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub json_mode: bool,
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, LlmError>;

    /// Stream content deltas into `tx`; returns once the provider closes the stream
    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
        tx: mpsc::Sender<String>,
    ) -> Result<(), LlmError>;
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint
pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn request_body(&self, messages: &[ChatMessage], options: &GenerationOptions, stream: bool) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": options.temperature.unwrap_or(self.temperature),
            "max_tokens": options.max_tokens.unwrap_or(self.max_tokens),
            "stream": stream
        });
        if options.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("LLM provider error {}: {}", status, body);
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl LLMProvider for OpenAIClient {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        let body = self.request_body(messages, options, false);
        let response = self.send(&body).await?;
        let result: Value = response.json().await?;

        let content = result["choices"][0]["message"]["content"]
            .as_str()
            .map(str::trim)
            .unwrap_or("");
        if content.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(content.to_string())
    }

    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
        tx: mpsc::Sender<String>,
    ) -> Result<(), LlmError> {
        let body = self.request_body(messages, options, true);
        let response = self.send(&body).await?;

        let mut stream = response.bytes_stream();
        let mut pending = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            pending.push_str(&String::from_utf8_lossy(&chunk));

            // SSE events may be split across chunks; only consume whole lines
            while let Some(newline) = pending.find('\n') {
                let line: String = pending.drain(..=newline).collect();
                match parse_stream_line(&line) {
                    StreamLine::Delta(content) => {
                        if tx.send(content).await.is_err() {
                            return Ok(());
                        }
                    }
                    StreamLine::Done => return Ok(()),
                    StreamLine::Skip => {}
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq)]
pub enum StreamLine {
    Delta(String),
    Done,
    Skip,
}

pub fn parse_stream_line(line: &str) -> StreamLine {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return StreamLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return StreamLine::Done;
    }
    serde_json::from_str::<Value>(data)
        .ok()
        .and_then(|v| v["choices"][0]["delta"]["content"].as_str().map(String::from))
        .filter(|c| !c.is_empty())
        .map_or(StreamLine::Skip, StreamLine::Delta)
}

/// Pull the first JSON document out of model output that may be wrapped in
/// prose or markdown code fences.
pub fn extract_json(raw: &str) -> Result<Value, LlmError> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    let unfenced = strip_code_fence(trimmed);
    if let Ok(value) = serde_json::from_str::<Value>(unfenced) {
        return Ok(value);
    }

    let start = unfenced
        .find(['[', '{'])
        .ok_or_else(|| LlmError::Parse("no JSON found in response".to_string()))?;
    let close = if unfenced.as_bytes()[start] == b'[' { ']' } else { '}' };
    let end = unfenced
        .rfind(close)
        .filter(|&end| end > start)
        .ok_or_else(|| LlmError::Parse("unterminated JSON in response".to_string()))?;

    serde_json::from_str(&unfenced[start..=end]).map_err(|e| LlmError::Parse(e.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
