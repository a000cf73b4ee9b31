//! Chat-completion transport for the rescue oracle.
//!
//! One HTTP backend covers both a local Ollama server and hosted
//! OpenAI-compatible endpoints; they share the `/v1/chat/completions` route
//! and differ only in authentication.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Call timed out after {0} ms")]
    Timeout(u64),
    #[error("Endpoint returned {status}: {message}")]
    Status { status: u16, message: String },
}

impl From<LlmError> for odontolink_common::LinkError {
    fn from(e: LlmError) -> Self {
        odontolink_common::LinkError::Other(anyhow::Error::new(e))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// A single deterministic completion request.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
}

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError>;
    fn model_id(&self) -> &str;
    fn backend_name(&self) -> &'static str;
}

/// Which server the backend talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatFlavor {
    Ollama,
    OpenAiCompatible { api_key: Option<String> },
}

// ── Wire format ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize, Default)]
struct ChatReply {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

fn chat_body<'a>(req: &'a LlmRequest, model: &'a str) -> ChatBody<'a> {
    ChatBody {
        model,
        messages: &req.messages,
        max_tokens: req.max_tokens,
        temperature: 0.0,
        response_format: ResponseFormat { kind: "json_object" },
    }
}

fn into_response(reply: ChatReply, fallback_model: &str) -> LlmResponse {
    let content = reply
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    LlmResponse {
        content,
        model: reply.model.unwrap_or_else(|| fallback_model.to_string()),
    }
}

fn error_message(body: &serde_json::Value) -> String {
    body["error"]["message"]
        .as_str()
        .or_else(|| body["error"].as_str())
        .or_else(|| body["message"].as_str())
        .unwrap_or("no error message")
        .to_string()
}

// ── Backend ───────────────────────────────────────────────────────────────────

pub struct ChatBackend {
    base_url: String,
    model: String,
    flavor: ChatFlavor,
    client: reqwest::Client,
}

impl ChatBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, flavor: ChatFlavor) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            flavor,
            client: reqwest::Client::new(),
        }
    }

    pub fn ollama(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(base_url, model, ChatFlavor::Ollama)
    }

    pub fn openai_compatible(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self::new(base_url, model, ChatFlavor::OpenAiCompatible { api_key })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmBackend for ChatBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let mut builder = self.client.post(self.endpoint()).json(&chat_body(&req, &self.model));
        if let ChatFlavor::OpenAiCompatible { api_key: Some(key) } = &self.flavor {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        let reply: ChatReply = resp.json().await?;
        Ok(into_response(reply, &self.model))
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn backend_name(&self) -> &'static str {
        match self.flavor {
            ChatFlavor::Ollama => "ollama",
            ChatFlavor::OpenAiCompatible { .. } => "openai_compatible",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_content_and_model_fallback() {
        let reply: ChatReply = serde_json::from_value(serde_json::json!({
            "model": "llama3:8b",
            "choices": [{"message": {"content": "{\"canonical_terms\": [\"dental implant\"]}"}}],
            "usage": {"prompt_tokens": 40, "completion_tokens": 9},
        }))
        .unwrap();
        let resp = into_response(reply, "fallback");
        assert_eq!(resp.model, "llama3:8b");
        assert!(resp.content.contains("dental implant"));

        let empty = into_response(ChatReply::default(), "fallback");
        assert_eq!(empty.model, "fallback");
        assert!(empty.content.is_empty());
    }

    #[test]
    fn test_body_asks_for_json_at_zero_temperature() {
        let req = LlmRequest {
            messages: vec![Message::system("s"), Message::user("u")],
            max_tokens: 64,
        };
        let body = serde_json::to_value(chat_body(&req, "m")).unwrap();
        assert_eq!(body["model"], "m");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_error_message_shapes() {
        let nested = serde_json::json!({"error": {"message": "bad key"}});
        let flat = serde_json::json!({"error": "overloaded"});
        assert_eq!(error_message(&nested), "bad key");
        assert_eq!(error_message(&flat), "overloaded");
        assert_eq!(error_message(&serde_json::Value::Null), "no error message");
    }

    #[test]
    fn test_backend_names() {
        assert_eq!(ChatBackend::ollama("http://localhost:11434", "m").backend_name(), "ollama");
        let hosted = ChatBackend::openai_compatible("https://api.example.com/", "m", None);
        assert_eq!(hosted.backend_name(), "openai_compatible");
        assert_eq!(hosted.endpoint(), "https://api.example.com/v1/chat/completions");
    }
}
