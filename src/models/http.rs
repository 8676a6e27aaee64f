use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Serialize;

use super::ChatModel;
use crate::error::ChatError;

#[derive(Clone, Debug)]
pub struct HttpModelConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout: Duration,
}

/// OpenAI-compatible chat-completions endpoint.
pub struct HttpChatModel {
    cfg: HttpModelConfig,
    client: Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

impl HttpChatModel {
    pub fn new(cfg: HttpModelConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self { cfg, client })
    }

    fn post(&self, request: &ChatRequest<'_>) -> Result<String, ChatError> {
        let resp = self
            .client
            .post(&self.cfg.endpoint)
            .bearer_auth(self.cfg.api_key.trim())
            .json(request)
            .send()
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ChatError::RateLimited);
        }
        let body = resp
            .text()
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        if status != StatusCode::OK {
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_completion(&body)
    }

    /// Sends a five-token request to verify the endpoint, key and model name.
    pub fn ping(&self) -> Result<(), ChatError> {
        let request = ChatRequest {
            model: &self.cfg.model,
            messages: vec![ChatMessage {
                role: "user",
                content: "ping",
            }],
            max_tokens: 5,
            temperature: None,
            top_p: None,
        };
        match self.post(&request) {
            Ok(_) | Err(ChatError::Empty) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl ChatModel for HttpChatModel {
    fn name(&self) -> &str {
        &self.cfg.model
    }

    fn chat(&self, prompt: &str) -> Result<String, ChatError> {
        let request = ChatRequest {
            model: &self.cfg.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.cfg.max_tokens,
            temperature: Some(self.cfg.temperature),
            top_p: Some(self.cfg.top_p),
        };
        self.post(&request)
    }
}

/// Pulls `choices[0].message.content` out of a chat-completions body.
pub fn parse_completion(body: &str) -> Result<String, ChatError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ChatError::Malformed(e.to_string()))?;
    let content = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| ChatError::Malformed("missing choices[0].message.content".to_string()))?;
    let content = content.trim();
    if content.is_empty() {
        return Err(ChatError::Empty);
    }
    Ok(content.to_string())
}
