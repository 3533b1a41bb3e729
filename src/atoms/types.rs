// ── Echograph Atoms: Pure Data Types ───────────────────────────────────────
// Plain struct/enum definitions that flow through the entire engine.
// Atoms layer rule: no I/O, no side effects, no imports from engine/.

use serde::{Deserialize, Serialize};

use crate::atoms::constants::{
    DEFAULT_INPUT_THRESHOLD, DEFAULT_OUTPUT_THRESHOLD, DEFAULT_TOP_K, FLAG_RETRIEVED,
    FLAG_SUCCEEDED,
};

// ── Graph primitives ───────────────────────────────────────────────────────

/// One cached question→answer mapping: a pair of content hashes.
/// The edge's position in the store doubles as the row index into the
/// parallel embedding matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Content hash of the query text.
    pub input: u32,
    /// Content hash of the cached response text.
    pub output: u32,
}

/// Which of an edge's two embedding rows an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingSlot {
    Input,
    Output,
}

// ── Content table entries ──────────────────────────────────────────────────

/// A literal string value keyed by its content hash, plus its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub hash: u32,
    pub text: String,
    pub embedding: Vec<f32>,
}

// ── Per-run context ────────────────────────────────────────────────────────

/// Ephemeral state for one pipeline run. Created by the caller, filled in by
/// [`GenerationPipeline::run`](crate::engine::pipeline::GenerationPipeline::run),
/// then consumed. Never shared across concurrent runs.
#[derive(Debug, Clone, Default)]
pub struct GenerateContext {
    /// The rolling conversation context, most recent line last.
    pub input: Vec<String>,
    /// Result bitmask: [`FLAG_RETRIEVED`] | [`FLAG_SUCCEEDED`].
    pub flags: u8,
    /// Raw generator output, set only when the generation path ran.
    pub generated: Option<String>,
    /// The resolved response entry, set on both hit and successful generation.
    pub output_entry: Option<ContentEntry>,
}

impl GenerateContext {
    pub fn new(input: Vec<String>) -> Self {
        GenerateContext {
            input,
            flags: 0,
            generated: None,
            output_entry: None,
        }
    }

    /// The full context joined into one query string, most recent line last.
    pub fn joined_input(&self) -> String {
        self.input.join("\n")
    }

    /// The run resolved an existing cache entry.
    pub fn mark_retrieved(&mut self) {
        self.flags = FLAG_RETRIEVED | FLAG_SUCCEEDED;
    }

    /// The run produced a fresh generation.
    pub fn mark_generated(&mut self) {
        self.flags = FLAG_SUCCEEDED;
    }

    /// The run produced no result.
    pub fn mark_failed(&mut self) {
        self.flags = 0;
    }

    pub fn was_retrieved(&self) -> bool {
        self.flags & FLAG_RETRIEVED != 0
    }

    pub fn succeeded(&self) -> bool {
        self.flags & FLAG_SUCCEEDED != 0
    }
}

// ── Configuration ──────────────────────────────────────────────────────────

/// Cache engine configuration (embedding + generator provider settings and
/// similarity thresholds). A plain owned value passed explicitly by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Base URL for the embedding API (Ollama: http://localhost:11434)
    pub embedding_base_url: String,
    /// Embedding model name (e.g., "nomic-embed-text", "all-minilm")
    pub embedding_model: String,
    /// Embedding dimensions (e.g., 768 for nomic-embed-text, 384 for all-minilm)
    pub embedding_dims: usize,
    /// Base URL for the generator API
    pub generator_base_url: String,
    /// Generator model name
    pub generator_model: String,
    /// Minimum query-vs-input similarity for a cache hit (0.0–1.0, `>=`)
    pub input_threshold: f32,
    /// Minimum anchor-vs-output similarity before an edge is clipped (0.0–1.0)
    pub output_threshold: f32,
    /// Candidate depth for the top-K filter variant
    pub top_k: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            embedding_base_url: "http://localhost:11434".into(),
            embedding_model: "nomic-embed-text".into(),
            embedding_dims: 768,
            generator_base_url: "http://localhost:11434".into(),
            generator_model: "llama3.2".into(),
            input_threshold: DEFAULT_INPUT_THRESHOLD,
            output_threshold: DEFAULT_OUTPUT_THRESHOLD,
            top_k: DEFAULT_TOP_K,
        }
    }
}

// ── Introspection ──────────────────────────────────────────────────────────

/// Statistics about the cache, for host introspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub edge_count: usize,
    pub entry_count: usize,
    pub dim: u32,
}
