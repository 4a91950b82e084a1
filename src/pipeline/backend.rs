//! Model backends: the capability every model-driven pass calls.
//!
//! Passes see only [`ModelBackend::infer`]: a prompt (and optional page
//! images) in, raw text out. [`LlmBackend`] is the production
//! implementation over an `edgequake-llm` provider; tests plug in scripted
//! backends.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 from LLM APIs are transient. Exponential backoff
//! (`retry_backoff_ms * 2^attempt`) spaces retries out: with a 500 ms base
//! and 2 retries the waits are 500 ms → 1 s.
//!
//! ## Single concurrency per role
//!
//! A backend role (text or vision) is treated as one slot. [`LlmBackend`]
//! holds an async mutex across the call, so documents processed concurrently
//! by [`crate::stream`] queue on the role instead of overlapping.

use crate::config::ExtractionConfig;
use crate::error::PassError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// One model request.
#[derive(Debug, Clone, Default)]
pub struct InferenceRequest {
    pub system: String,
    pub prompt: String,
    pub images: Vec<ImageData>,
}

impl InferenceRequest {
    pub fn text(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            images: Vec::new(),
        }
    }

    pub fn with_images(mut self, images: Vec<ImageData>) -> Self {
        self.images = images;
        self
    }
}

/// A model that answers prompts with text expected to hold a JSON object.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Name for logs and reports.
    fn name(&self) -> &str;

    /// Run one request. Errors are per-request and never fatal.
    async fn infer(&self, request: &InferenceRequest) -> Result<String, PassError>;

    /// Tokens used so far as `(input, output)`, if the backend counts them.
    fn token_usage(&self) -> (u64, u64) {
        (0, 0)
    }
}

/// [`ModelBackend`] over an `edgequake-llm` provider.
pub struct LlmBackend {
    name: String,
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
    timeout_secs: u64,
    gate: Mutex<()>,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl LlmBackend {
    pub fn new(name: impl Into<String>, provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            name: name.into(),
            provider,
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            timeout_secs: config.api_timeout_secs,
            gate: Mutex::new(()),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl ModelBackend for LlmBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<String, PassError> {
        let _slot = self.gate.lock().await;
        let start = Instant::now();

        let messages = vec![
            ChatMessage::system(&request.system),
            ChatMessage::user_with_images(&request.prompt, request.images.clone()),
        ];

        let mut last_err: Option<String> = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    self.name, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            let call = self.provider.chat(&messages, Some(&self.options));
            match timeout(Duration::from_secs(self.timeout_secs), call).await {
                Err(_) => {
                    warn!("{}: call timed out after {}s", self.name, self.timeout_secs);
                    return Err(PassError::Timeout {
                        backend: self.name.clone(),
                        secs: self.timeout_secs,
                    });
                }
                Ok(Ok(response)) => {
                    self.input_tokens
                        .fetch_add(response.prompt_tokens as u64, Ordering::Relaxed);
                    self.output_tokens
                        .fetch_add(response.completion_tokens as u64, Ordering::Relaxed);
                    debug!(
                        "{}: {} input tokens, {} output tokens, {:?}",
                        self.name,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(response.content);
                }
                Ok(Err(e)) => {
                    let msg = e.to_string();
                    warn!("{}: attempt {} failed: {}", self.name, attempt + 1, msg);
                    last_err = Some(msg);
                }
            }
        }

        Err(PassError::BackendFailed {
            backend: self.name.clone(),
            retries: self.max_retries,
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }

    fn token_usage(&self) -> (u64, u64) {
        (
            self.input_tokens.load(Ordering::Relaxed),
            self.output_tokens.load(Ordering::Relaxed),
        )
    }
}

impl std::fmt::Debug for LlmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmBackend")
            .field("name", &self.name)
            .field("provider", &"<dyn LLMProvider>")
            .field("max_retries", &self.max_retries)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Build `CompletionOptions` from the extraction config.
pub fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&ExtractionConfig::default());
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn request_builders() {
        let r = InferenceRequest::text("sys", "prompt");
        assert!(r.images.is_empty());
        let r = r.with_images(vec![ImageData::new("AAAA", "image/png")]);
        assert_eq!(r.images.len(), 1);
    }
}
