// ── Echograph Atoms: Constants ─────────────────────────────────────────────
// All named constants for the crate live here.

// ── Similarity filtering ───────────────────────────────────────────────────
// A clipped candidate gets this score so it can never win the arg-max.
pub const REJECT_SCORE: f32 = f32::NEG_INFINITY;

/// Minimum cosine similarity a query must reach against a stored input
/// embedding to count as a cache hit. Compared with `>=`.
pub const DEFAULT_INPUT_THRESHOLD: f32 = 0.9;

/// Minimum cosine similarity the query anchor must reach against a stored
/// output embedding; edges below it are clipped out of candidate selection.
pub const DEFAULT_OUTPUT_THRESHOLD: f32 = 0.5;

/// Default candidate depth for [`TopKFilter`](crate::engine::filter::TopKFilter).
pub const DEFAULT_TOP_K: usize = 1;

// ── Run result flags ───────────────────────────────────────────────────────
// Bitmask stored on `GenerateContext.flags`.

/// Bit 0: the retrieval path was taken (cache hit) rather than generation.
pub const FLAG_RETRIEVED: u8 = 1 << 0;

/// Bit 1: the run produced a usable result.
pub const FLAG_SUCCEEDED: u8 = 1 << 1;
