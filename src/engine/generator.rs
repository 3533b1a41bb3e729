// Echograph Engine — Text Generator
//
// Cache-miss fallback. The pipeline hands the generator the run context and
// a per-run cancel signal; a cancelled call completes as a failed generation
// rather than an error, so the pipeline stays usable for the next run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::Notify;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{CacheConfig, GenerateContext};

// ── Cancellation ───────────────────────────────────────────────────────────

/// Per-run cancellation signal. The pipeline creates a fresh one for every
/// run and cancels the previous run's signal when a new run is issued.
#[derive(Clone, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelSignal {
    pub fn new() -> Self {
        CancelSignal::default()
    }

    /// Request cancellation and wake every waiter.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation has been requested. Intended for
    /// `tokio::select!` against an in-flight backend call.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            // Register the waiter before re-checking so a cancel between the
            // check and the await is not lost.
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Whether two handles refer to the same underlying signal.
    pub(crate) fn same(&self, other: &CancelSignal) -> bool {
        Arc::ptr_eq(&self.flag, &other.flag)
    }
}

// ── Generator trait ────────────────────────────────────────────────────────

/// Generator collaborator. Returns whether generation succeeded; on success
/// the generated text is written into `ctx.generated`. Cancellation shows up
/// as `Ok(false)`, backend trouble as `Err`.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        ctx: &mut GenerateContext,
        cancel: &CancelSignal,
    ) -> EngineResult<bool>;
}

// ── HTTP-backed generator ──────────────────────────────────────────────────

/// Generator calling Ollama or an OpenAI-compatible completion API.
/// Timeout policy lives here, not in the pipeline.
pub struct HttpGenerator {
    client: Client,
    base_url: String,
    model: String,
}

impl HttpGenerator {
    pub fn new(config: &CacheConfig) -> Self {
        HttpGenerator {
            client: Client::new(),
            base_url: config.generator_base_url.clone(),
            model: config.generator_model.clone(),
        }
    }

    /// Ollama API: POST /api/generate { model, prompt, stream: false } → { response }
    async fn complete_ollama(&self, prompt: &str) -> EngineResult<String> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(std::time::Duration::from_secs(300))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(EngineError::Generator(format!("Ollama generate {status} — {text}")));
        }

        let v: Value = resp.json().await?;
        v["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| EngineError::Generator("no 'response' field in Ollama reply".into()))
    }

    /// OpenAI-compatible API: POST /v1/chat/completions → choices[0].message.content
    async fn complete_openai(&self, prompt: &str) -> EngineResult<String> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(std::time::Duration::from_secs(300))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(EngineError::Generator(format!("chat completion {status} — {text}")));
        }

        let v: Value = resp.json().await?;
        v["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| EngineError::Generator("no message content in completion reply".into()))
    }

    /// Tries the Ollama API format first, falls back to OpenAI format.
    async fn complete(&self, prompt: &str) -> EngineResult<String> {
        let ollama_err = match self.complete_ollama(prompt).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };
        info!("[generator] Ollama format failed ({ollama_err}), trying OpenAI format");
        self.complete_openai(prompt).await.map_err(|openai_err| {
            EngineError::Generator(format!(
                "generation failed. Ollama: {ollama_err} | OpenAI: {openai_err}"
            ))
        })
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(
        &self,
        ctx: &mut GenerateContext,
        cancel: &CancelSignal,
    ) -> EngineResult<bool> {
        let prompt = ctx.joined_input();

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("[generator] run cancelled mid-generation");
                Ok(false)
            }
            result = self.complete(&prompt) => {
                let text = result?;
                if text.is_empty() {
                    return Ok(false);
                }
                ctx.generated = Some(text);
                Ok(true)
            }
        }
    }
}
