// Echograph — semantic response cache.
//
// Given a query (a short rolling conversation context), either return a
// previously cached response whose input embedding is similar enough, or
// fall back to an external generator and write the fresh (input, output)
// embedding pair back into the persistent store so future near-identical
// queries are served from cache.
//
// Layer map:
//   atoms/   — pure data: errors, constants, plain types
//   engine/  — the machinery: store, content table, similarity filters,
//              encoder/generator collaborators, and the pipeline

pub mod atoms;
pub mod engine;

// Re-export the public API at the crate root.
pub use atoms::constants::{FLAG_RETRIEVED, FLAG_SUCCEEDED};
pub use atoms::error::{EngineError, EngineResult};
pub use atoms::types::{CacheConfig, CacheStats, ContentEntry, Edge, EmbeddingSlot, GenerateContext};
pub use engine::content::ContentTable;
pub use engine::encoder::{Encoder, HttpEncoder};
pub use engine::filter::{FilterDecision, SimilarityFilter, TopKFilter, TopSimilarityFilter};
pub use engine::generator::{CancelSignal, Generator, HttpGenerator};
pub use engine::hasher::content_hash;
pub use engine::pipeline::GenerationPipeline;
pub use engine::store::VectorGraphStore;
pub use engine::tensor::{Matrix, QueryTensors, RecentMeanConverter, TensorConverter};
