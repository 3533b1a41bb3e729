// Echograph Engine — Tensor Kernel
//
// Row-major float matrices plus the numeric operations the decision kernel
// needs: cosine similarity, batched scoring, arg-max, and top-K selection.
// Everything here is plain CPU math over contiguous buffers.

use crate::atoms::error::{EngineError, EngineResult};

// ── Matrix ─────────────────────────────────────────────────────────────────

/// A dense `rows × dim` matrix of f32, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    dim: usize,
    data: Vec<f32>,
}

impl Matrix {
    /// Build from explicit rows. Every row must have the same dimension.
    pub fn from_rows(rows: &[Vec<f32>]) -> EngineResult<Self> {
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(EngineError::config(format!(
                    "matrix row {} has dimension {} (expected {})",
                    i,
                    row.len(),
                    dim
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Matrix {
            rows: rows.len(),
            dim,
            data,
        })
    }

    /// Build a single-row matrix from one vector.
    pub fn from_row(row: &[f32]) -> Self {
        Matrix {
            rows: 1,
            dim: row.len(),
            data: row.to_vec(),
        }
    }

    /// Build from an already-flat buffer. The invariant
    /// `data.len() == rows * dim` is the caller's responsibility to have
    /// established; it is re-checked here.
    pub(crate) fn from_flat(rows: usize, dim: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), rows * dim);
        Matrix { rows, dim, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Borrow row `i`. Panics on out-of-range index; rows are only indexed
    /// with counters already bounded by `rows()`.
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// Element-wise mean of all rows. `None` for an empty matrix.
    pub fn mean_row(&self) -> Option<Vec<f32>> {
        if self.rows == 0 {
            return None;
        }
        let mut mean = vec![0.0f32; self.dim];
        for i in 0..self.rows {
            for (acc, v) in mean.iter_mut().zip(self.row(i)) {
                *acc += v;
            }
        }
        let n = self.rows as f32;
        for v in mean.iter_mut() {
            *v /= n;
        }
        Some(mean)
    }
}

// ── Similarity kernels ─────────────────────────────────────────────────────

/// Cosine similarity between two vectors. Returns 0.0 for mismatched
/// lengths, empty inputs, or zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-12 {
        0.0
    } else {
        (dot / denom) as f32
    }
}

/// Cosine similarity of `query` against every row of `m`.
pub fn similarity_scores(query: &[f32], m: &Matrix) -> Vec<f32> {
    (0..m.rows())
        .map(|i| cosine_similarity(query, m.row(i)))
        .collect()
}

/// Index of the maximum score. Ties resolve to the lowest index (first
/// occurrence). `None` for an empty slice.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    if scores.is_empty() {
        return None;
    }
    let mut best = 0usize;
    for (i, &s) in scores.iter().enumerate().skip(1) {
        if s > scores[best] {
            best = i;
        }
    }
    Some(best)
}

/// Indices of the K highest scores, highest first. Ties keep the lower
/// index first. K is clamped to the slice length.
pub fn top_k(scores: &[f32], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    indices.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    indices.truncate(k.min(scores.len()));
    indices
}

// ── Query tensors and converter strategy ───────────────────────────────────

/// The two 1×dim query-side tensors the decision kernel consumes: the
/// query input embedding and the output-anchor embedding used for clipping.
#[derive(Debug, Clone)]
pub struct QueryTensors {
    pub input: Matrix,
    pub anchor: Matrix,
}

/// Strategy turning the encoder's per-line embedding rows into the two
/// query tensors. Selected at pipeline construction.
pub trait TensorConverter: Send + Sync {
    fn convert(&self, rows: &Matrix) -> EngineResult<QueryTensors>;
}

/// Default conversion: the query input is the most recent context line's
/// embedding; the output anchor is the mean of all context lines, which
/// tracks the conversation gist the cached answer should stay close to.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecentMeanConverter;

impl TensorConverter for RecentMeanConverter {
    fn convert(&self, rows: &Matrix) -> EngineResult<QueryTensors> {
        if rows.is_empty() {
            return Err(EngineError::config("cannot build query tensors from zero embeddings"));
        }
        let input = Matrix::from_row(rows.row(rows.rows() - 1));
        let anchor = match rows.mean_row() {
            Some(mean) => Matrix::from_row(&mean),
            None => input.clone(),
        };
        Ok(QueryTensors { input, anchor })
    }
}
