use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::instrument;

use crate::event_bus::{EventEmitter, LLMStreamingEvent};
use crate::message::Message;

use super::backend::{CallOptions, LlmBackend, StreamDelta, rate_limit_backoff};
use super::error::LlmError;

const STREAM_CHANNEL_CAPACITY: usize = 256;

/// Cooperative cancellation handle for an in-flight [`LlmClient::generate_stream`]
/// call, plus the terminal error (if any) once the receiver closes.
pub struct StreamHandle {
    cancelled: Arc<AtomicBool>,
    error: Arc<Mutex<Option<LlmError>>>,
}

impl StreamHandle {
    /// Request cancellation. Cooperative: already-delivered deltas are kept,
    /// the backend observes this flag at its next suspension point and
    /// returns `Ok(())` rather than erroring (§5).
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The terminal error, if the stream ended in one rather than
    /// completing or being cancelled. Only meaningful after the paired
    /// receiver has been drained to closure.
    pub fn take_error(&self) -> Option<LlmError> {
        self.error.lock().unwrap().take()
    }
}

/// Streaming + non-streaming front door to the configured [`LlmBackend`].
pub struct LlmClient {
    backend: Arc<dyn LlmBackend>,
    emitter: Option<Arc<dyn EventEmitter>>,
}

impl LlmClient {
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            emitter: None,
        }
    }

    #[must_use]
    pub fn with_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Non-streaming call. Retries once after a fixed ~5s delay on a
    /// rate-limit response; surfaces [`LlmError::RateLimited`] if the retry
    /// also fails (§4.B, §7).
    #[instrument(skip(self, system_prompt, user_prompt), err)]
    pub async fn call(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        opts: CallOptions,
    ) -> Result<String, LlmError> {
        let messages = vec![Message::system(system_prompt), Message::user(user_prompt)];
        match self.backend.call(&messages, &opts).await {
            Err(LlmError::RateLimited) => {
                tracing::warn!("rate limited, retrying once after backoff");
                rate_limit_backoff().await;
                self.backend.call(&messages, &opts).await
            }
            other => other,
        }
    }

    /// Streaming call. Returns a [`StreamHandle`] for cancellation and a
    /// receiver of dash-normalized [`StreamDelta`]s. The receiver closes
    /// when the stream completes, is cancelled, or fails; call
    /// `handle.take_error()` afterward to distinguish the latter.
    #[instrument(skip(self, system_prompt, user_prompt))]
    pub fn generate_stream(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
        session_id: Option<String>,
    ) -> (StreamHandle, mpsc::Receiver<StreamDelta>) {
        let cancelled = Arc::new(AtomicBool::new(false));
        let error = Arc::new(Mutex::new(None));
        let handle = StreamHandle {
            cancelled: cancelled.clone(),
            error: error.clone(),
        };

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let backend = self.backend.clone();
        let emitter = self.emitter.clone();
        let messages = vec![Message::system(system_prompt), Message::user(user_prompt)];

        tokio::spawn(async move {
            let result = run_stream(
                &*backend,
                &messages,
                max_tokens,
                cancelled.clone(),
                tx.clone(),
                emitter.as_deref(),
                session_id.as_deref(),
            )
            .await;

            let result = match result {
                Err(LlmError::RateLimited) if !cancelled.load(Ordering::SeqCst) => {
                    tracing::warn!("stream rate limited, retrying once after backoff");
                    rate_limit_backoff().await;
                    run_stream(
                        &*backend,
                        &messages,
                        max_tokens,
                        cancelled.clone(),
                        tx.clone(),
                        emitter.as_deref(),
                        session_id.as_deref(),
                    )
                    .await
                }
                other => other,
            };

            if let Err(e) = result {
                if let Some(emitter) = &emitter {
                    let _ = emitter.emit(crate::event_bus::Event::LLM(LLMStreamingEvent::error_event(
                        session_id.clone(),
                        None,
                        None,
                        e.to_string(),
                    )));
                }
                *error.lock().unwrap() = Some(e);
            }
        });

        (handle, rx)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_stream(
    backend: &dyn LlmBackend,
    messages: &[Message],
    max_tokens: u32,
    cancelled: Arc<AtomicBool>,
    tx: mpsc::Sender<StreamDelta>,
    emitter: Option<&Arc<dyn EventEmitter>>,
    session_id: Option<&str>,
) -> Result<(), LlmError> {
    let (inner_tx, mut inner_rx) = mpsc::channel::<StreamDelta>(STREAM_CHANNEL_CAPACITY);
    let backend_fut = backend.generate_stream(messages, max_tokens, cancelled, inner_tx);

    let forward = async {
        while let Some(delta) = inner_rx.recv().await {
            if let Some(emitter) = emitter {
                let metadata = FxHashMap::default();
                let _ = emitter.emit(crate::event_bus::Event::LLM(LLMStreamingEvent::chunk_event(
                    session_id.map(str::to_string),
                    None,
                    None,
                    delta.text.clone(),
                    metadata,
                )));
            }
            if tx.send(delta).await.is_err() {
                break;
            }
        }
    };

    let (result, ()) = tokio::join!(backend_fut, forward);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::backend::CallOptions;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct FlakyBackend {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmBackend for FlakyBackend {
        async fn call(&self, _messages: &[Message], _opts: &CallOptions) -> Result<String, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(LlmError::RateLimited)
            } else {
                Ok("recovered".to_string())
            }
        }

        async fn generate_stream(
            &self,
            _messages: &[Message],
            _max_tokens: u32,
            _cancelled: Arc<AtomicBool>,
            _tx: mpsc::Sender<StreamDelta>,
        ) -> Result<(), LlmError> {
            Ok(())
        }
    }

    struct AlwaysRateLimited;

    #[async_trait]
    impl LlmBackend for AlwaysRateLimited {
        async fn call(&self, _messages: &[Message], _opts: &CallOptions) -> Result<String, LlmError> {
            Err(LlmError::RateLimited)
        }

        async fn generate_stream(
            &self,
            _messages: &[Message],
            _max_tokens: u32,
            _cancelled: Arc<AtomicBool>,
            _tx: mpsc::Sender<StreamDelta>,
        ) -> Result<(), LlmError> {
            Err(LlmError::RateLimited)
        }
    }

    #[tokio::test]
    async fn call_retries_once_then_succeeds() {
        let backend = Arc::new(FlakyBackend { calls: AtomicU32::new(0) });
        let client = LlmClient::new(backend);
        let result = client.call("sys", "user", CallOptions::default()).await;
        assert_eq!(result.unwrap(), "recovered");
    }

    #[tokio::test]
    async fn call_surfaces_rate_limited_after_second_failure() {
        let backend = Arc::new(AlwaysRateLimited);
        let client = LlmClient::new(backend);
        let result = client.call("sys", "user", CallOptions::default()).await;
        assert!(matches!(result, Err(LlmError::RateLimited)));
    }
}
