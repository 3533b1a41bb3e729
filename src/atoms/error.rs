// ── Echograph Atoms: Error Types ───────────────────────────────────────────
// Single canonical error enum for the engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, Format, Config, …).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • Generator failures are recovered locally inside the pipeline and recorded
//     in the run context; they only surface here when the backend itself errors.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary store or content-table file is malformed or truncated.
    /// Fatal for the load that hit it; never partially applied.
    #[error("Format error: {0}")]
    Format(String),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Pipeline or store configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding encoder failure (API-level detail only).
    #[error("Encoder error: {0}")]
    Encoder(String),

    /// Text generator failure (API-level detail only).
    #[error("Generator error: {0}")]
    Generator(String),

    /// Index out of range in a public store API.
    #[error("Index {index} out of range (len {len})")]
    OutOfRange { index: usize, len: usize },
}

// ── Convenience constructors ───────────────────────────────────────────────

impl EngineError {
    /// Create a format/corruption error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All engine operations should return this type.
pub type EngineResult<T> = Result<T, EngineError>;
