// Echograph Engine — Embedding Encoder
//
// Turns text into embedding rows. The pipeline only knows the trait; the
// default implementation calls Ollama or an OpenAI-compatible embedding API.

use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde_json::{json, Value};

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::CacheConfig;
use crate::engine::tensor::Matrix;

/// Embedding encoder collaborator. Must be deterministic for identical
/// input, and every row it returns must match `dim()`.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Encode each input string into one embedding row, in order.
    async fn encode(&self, inputs: &[String]) -> EngineResult<Matrix>;

    /// The embedding dimension this encoder produces.
    fn dim(&self) -> usize;
}

// ── HTTP-backed encoder ────────────────────────────────────────────────────

/// Encoder calling Ollama or an OpenAI-compatible embedding API.
pub struct HttpEncoder {
    client: Client,
    base_url: String,
    model: String,
    dim: usize,
}

impl HttpEncoder {
    pub fn new(config: &CacheConfig) -> Self {
        HttpEncoder {
            client: Client::new(),
            base_url: config.embedding_base_url.clone(),
            model: config.embedding_model.clone(),
            dim: config.embedding_dims,
        }
    }

    /// Ollama API: POST /api/embed { model, input: [...] } → { embeddings: [[f32...], ...] }
    async fn encode_ollama(&self, inputs: &[String]) -> EngineResult<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(std::time::Duration::from_secs(60))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(EngineError::Encoder(format!("Ollama embed {status} — {text}")));
        }

        let v: Value = resp.json().await?;
        let rows = v["embeddings"]
            .as_array()
            .ok_or_else(|| EngineError::Encoder("no 'embeddings' array in Ollama response".into()))?;

        rows.iter()
            .map(|row| {
                let values: Vec<f32> = row
                    .as_array()
                    .map(|a| a.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect())
                    .unwrap_or_default();
                if values.is_empty() {
                    Err(EngineError::Encoder("empty embedding row from Ollama".into()))
                } else {
                    Ok(values)
                }
            })
            .collect()
    }

    /// OpenAI-compatible API: POST /v1/embeddings { model, input } → { data: [{ embedding }] }
    async fn encode_openai(&self, inputs: &[String]) -> EngineResult<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(EngineError::Encoder(format!("OpenAI embed {status} — {text}")));
        }

        let v: Value = resp.json().await?;
        let data = v["data"]
            .as_array()
            .ok_or_else(|| EngineError::Encoder("no 'data' array in OpenAI response".into()))?;

        data.iter()
            .map(|item| {
                let values: Vec<f32> = item["embedding"]
                    .as_array()
                    .map(|a| a.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect())
                    .unwrap_or_default();
                if values.is_empty() {
                    Err(EngineError::Encoder("empty embedding row from OpenAI format".into()))
                } else {
                    Ok(values)
                }
            })
            .collect()
    }

    fn validate(&self, inputs: &[String], rows: Vec<Vec<f32>>) -> EngineResult<Matrix> {
        if rows.len() != inputs.len() {
            return Err(EngineError::Encoder(format!(
                "expected {} embedding rows, got {}",
                inputs.len(),
                rows.len()
            )));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != self.dim {
                return Err(EngineError::Encoder(format!(
                    "row {} has dimension {} (configured {})",
                    i,
                    row.len(),
                    self.dim
                )));
            }
        }
        Matrix::from_rows(&rows)
    }
}

#[async_trait]
impl Encoder for HttpEncoder {
    /// Tries the Ollama API format first, falls back to OpenAI format.
    async fn encode(&self, inputs: &[String]) -> EngineResult<Matrix> {
        if inputs.is_empty() {
            return Err(EngineError::Encoder("nothing to encode".into()));
        }

        let ollama_result = self.encode_ollama(inputs).await;
        let ollama_err = match ollama_result {
            Ok(rows) => return self.validate(inputs, rows),
            Err(e) => e,
        };

        info!("[encoder] Ollama format failed ({ollama_err}), trying OpenAI format");
        match self.encode_openai(inputs).await {
            Ok(rows) => self.validate(inputs, rows),
            Err(openai_err) => Err(EngineError::Encoder(format!(
                "embedding failed. Ollama: {ollama_err} | OpenAI: {openai_err}"
            ))),
        }
    }

    fn dim(&self) -> usize {
        self.dim
    }
}
