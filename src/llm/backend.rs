use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::linter::normalize_dashes;
use crate::message::Message;

use super::error::LlmError;

/// Per-call generation parameters.
#[derive(Clone, Copy, Debug)]
pub struct CallOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 1.0,
        }
    }
}

/// One streamed text delta, already dash-normalized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamDelta {
    pub text: String,
}

/// Pluggable transport for the LLM client. [`HttpLlmBackend`] is the
/// production implementation; tests inject their own scripted backend so
/// the Micro-Fix Loop, Scorer, and Orchestrator can be exercised without a
/// network call (see `tests/common`).
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Non-streaming call. Returns the raw (not yet dash-normalized) model
    /// text; normalization is the client's job so both code paths share it.
    async fn call(&self, messages: &[Message], opts: &CallOptions) -> Result<String, LlmError>;

    /// Streaming call. Implementations must send each delta as it arrives
    /// and observe `cancelled` at every suspension point, returning `Ok(())`
    /// rather than an error when cancellation is observed (§5: cancellation
    /// unwinds by returning current-best state, never by erroring).
    async fn generate_stream(
        &self,
        messages: &[Message],
        max_tokens: u32,
        cancelled: Arc<AtomicBool>,
        tx: mpsc::Sender<StreamDelta>,
    ) -> Result<(), LlmError>;
}

/// Production backend: a Messages-API-shaped HTTP endpoint (§6), reached
/// over `reqwest` with rustls, matching the teacher's dependency table.
pub struct HttpLlmBackend {
    http: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
}

impl HttpLlmBackend {
    #[must_use]
    pub fn new(api_base: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into(),
            api_key,
            model: model.into(),
        }
    }

    fn request(&self, body: serde_json::Value) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .post(&self.api_base)
            .header("content-type", "application/json")
            .header("anthropic-dangerous-direct-browser-access", "true")
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }
        req
    }

    fn messages_body(&self, messages: &[Message], max_tokens: u32, temperature: f32, stream: bool) -> serde_json::Value {
        let (system, rest): (Vec<&Message>, Vec<&Message>) =
            messages.iter().partition(|m| m.role == Message::SYSTEM);
        let system_prompt = system
            .first()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let chat_messages: Vec<_> = rest
            .iter()
            .map(|m| json!({"role": if m.role == Message::ASSISTANT { "assistant" } else { "user" }, "content": m.content}))
            .collect();
        json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "system": system_prompt,
            "messages": chat_messages,
            "temperature": temperature,
            "stream": stream,
        })
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct SseDelta {
    #[serde(default)]
    delta: Option<SseDeltaInner>,
}

#[derive(Deserialize)]
struct SseDeltaInner {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl LlmBackend for HttpLlmBackend {
    async fn call(&self, messages: &[Message], opts: &CallOptions) -> Result<String, LlmError> {
        let body = self.messages_body(messages, opts.max_tokens, opts.temperature, false);
        let resp = self
            .request(body)
            .send()
            .await
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        if resp.status().as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::ApiError(format!("{status}: {text}")));
        }

        let parsed: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::ParseFailure(e.to_string()))?;
        let text = parsed
            .content
            .into_iter()
            .find(|c| c.kind == "text")
            .map(|c| c.text)
            .unwrap_or_default();
        Ok(text)
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        max_tokens: u32,
        cancelled: Arc<AtomicBool>,
        tx: mpsc::Sender<StreamDelta>,
    ) -> Result<(), LlmError> {
        let body = self.messages_body(messages, max_tokens, 1.0, true);
        let resp = self
            .request(body)
            .send()
            .await
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        if resp.status().as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::ApiError(format!("{status}: {text}")));
        }

        let mut byte_stream = resp.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = byte_stream.next().await {
            if cancelled.load(Ordering::SeqCst) {
                return Ok(());
            }
            let chunk = chunk.map_err(|e| LlmError::ApiError(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_string();
                buffer.drain(..=pos);
                let Some(payload) = line.strip_prefix("data: ") else {
                    continue;
                };
                if payload == "[DONE]" {
                    return Ok(());
                }
                if let Ok(event) = serde_json::from_str::<SseDelta>(payload) {
                    if let Some(delta) = event.delta {
                        if delta.text.is_empty() {
                            continue;
                        }
                        let normalized = normalize_dashes(&delta.text);
                        if tx.send(StreamDelta { text: normalized }).await.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Sleep used by [`super::client::LlmClient`]'s single rate-limit retry.
/// Shortened under `cfg(test)` so the retry-once tests don't spend five
/// real seconds per assertion.
pub(super) async fn rate_limit_backoff() {
    #[cfg(test)]
    let delay = Duration::from_millis(5);
    #[cfg(not(test))]
    let delay = Duration::from_secs(5);
    tokio::time::sleep(delay).await;
}
