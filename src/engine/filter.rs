// Echograph Engine — Similarity Filters
//
// The decision kernel: given the two query tensors and the store's
// materialized matrices, pick the best cached edge or report no match.
// Filters are interface-polymorphic so the pipeline can swap strategies
// at construction time.

use log::debug;

use crate::atoms::constants::REJECT_SCORE;
use crate::atoms::error::EngineResult;
use crate::engine::store::VectorGraphStore;
use crate::engine::tensor::{argmax, similarity_scores, top_k, QueryTensors};

/// An accepted cache candidate: the winning edge index and its raw
/// query-vs-input cosine score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterDecision {
    pub index: usize,
    pub score: f32,
}

/// Decide whether a query is close enough to something already cached,
/// and if so, which stored edge to use. `Ok(None)` means no match.
pub trait SimilarityFilter: Send + Sync {
    fn filter(
        &self,
        query: &QueryTensors,
        store: &VectorGraphStore,
    ) -> EngineResult<Option<FilterDecision>>;
}

// ── Top-similarity with output-side clipping ───────────────────────────────

/// Arg-max over query-vs-input cosine scores, with output-anchor clipping:
/// an edge whose stored *answer* has drifted below `output_threshold` is
/// forced out of candidate selection even if its *question* scores highest.
#[derive(Debug, Clone, Copy)]
pub struct TopSimilarityFilter {
    /// A candidate wins iff its input score clears this (compared with `>=`).
    pub input_threshold: f32,
    /// Edges with anchor-vs-output similarity below this are clipped.
    pub output_threshold: f32,
}

impl TopSimilarityFilter {
    pub fn new(input_threshold: f32, output_threshold: f32) -> Self {
        TopSimilarityFilter {
            input_threshold,
            output_threshold,
        }
    }
}

impl SimilarityFilter for TopSimilarityFilter {
    fn filter(
        &self,
        query: &QueryTensors,
        store: &VectorGraphStore,
    ) -> EngineResult<Option<FilterDecision>> {
        // Cold start: nothing cached yet.
        if store.is_empty() {
            return Ok(None);
        }

        let (inputs, outputs) = store.allocate_tensors();
        let mut input_scores = similarity_scores(query.input.row(0), &inputs);
        let output_scores = similarity_scores(query.anchor.row(0), &outputs);

        let mut clipped = 0usize;
        for (score, out) in input_scores.iter_mut().zip(&output_scores) {
            if *out < self.output_threshold {
                *score = REJECT_SCORE;
                clipped += 1;
            }
        }

        // Ties resolve to the lowest index. The store is non-empty here.
        let best = match argmax(&input_scores) {
            Some(i) => i,
            None => return Ok(None),
        };
        let score = input_scores[best];

        debug!(
            "[filter] top-similarity: best={best} score={score:.4} clipped={clipped}/{}",
            store.len()
        );

        if score >= self.input_threshold {
            Ok(Some(FilterDecision { index: best, score }))
        } else {
            Ok(None)
        }
    }
}

// ── Top-K without clipping ─────────────────────────────────────────────────

/// Partial-sort variant used when anchor clipping is unnecessary: rank the
/// K best input scores and accept iff the K-th clears the threshold. The
/// first (highest-scored) candidate wins; lower-ranked candidates are not
/// re-ranked further.
#[derive(Debug, Clone, Copy)]
pub struct TopKFilter {
    pub input_threshold: f32,
    pub k: usize,
}

impl TopKFilter {
    pub fn new(input_threshold: f32, k: usize) -> Self {
        TopKFilter { input_threshold, k }
    }
}

impl SimilarityFilter for TopKFilter {
    fn filter(
        &self,
        query: &QueryTensors,
        store: &VectorGraphStore,
    ) -> EngineResult<Option<FilterDecision>> {
        if store.is_empty() {
            return Ok(None);
        }

        let (inputs, _outputs) = store.allocate_tensors();
        let scores = similarity_scores(query.input.row(0), &inputs);

        // Clamp K to what the store actually holds.
        let k = self.k.max(1).min(scores.len());
        let ranked = top_k(&scores, k);
        let kth = scores[ranked[k - 1]];

        debug!(
            "[filter] top-k: k={k} kth={kth:.4} best={:.4}",
            scores[ranked[0]]
        );

        if kth >= self.input_threshold {
            Ok(Some(FilterDecision {
                index: ranked[0],
                score: scores[ranked[0]],
            }))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tensor::Matrix;

    fn query(input: &[f32], anchor: &[f32]) -> QueryTensors {
        QueryTensors {
            input: Matrix::from_row(input),
            anchor: Matrix::from_row(anchor),
        }
    }

    fn store_with(edges: &[(&[f32], &[f32])]) -> VectorGraphStore {
        let dim = edges.first().map(|(i, _)| i.len()).unwrap_or(4) as u32;
        let mut store = VectorGraphStore::new(dim);
        for (n, (inp, out)) in edges.iter().enumerate() {
            store.append(100 + n as u32, inp, 200 + n as u32, out).unwrap();
        }
        store
    }

    #[test]
    fn empty_store_is_no_match() {
        let store = VectorGraphStore::new(4);
        let q = query(&[1.0, 0.0, 0.0, 0.0], &[1.0, 0.0, 0.0, 0.0]);
        let filter = TopSimilarityFilter::new(0.0, 0.0);
        assert_eq!(filter.filter(&q, &store).unwrap(), None);
        let topk = TopKFilter::new(0.0, 3);
        assert_eq!(topk.filter(&q, &store).unwrap(), None);
    }

    #[test]
    fn exact_match_wins() {
        let store = store_with(&[
            (&[0.0, 1.0, 0.0], &[1.0, 0.0, 0.0]),
            (&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]),
        ]);
        let q = query(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        let filter = TopSimilarityFilter::new(0.9, 0.0);
        let d = filter.filter(&q, &store).unwrap().unwrap();
        assert_eq!(d.index, 1);
        assert!((d.score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let store = store_with(&[(&[1.0, 0.0], &[1.0, 0.0])]);
        let q = query(&[1.0, 0.0], &[1.0, 0.0]);

        // Score is exactly 1.0; threshold 1.0 must still hit.
        let hit = TopSimilarityFilter::new(1.0, 0.0);
        assert!(hit.filter(&q, &store).unwrap().is_some());

        // An orthogonal query scores 0.0: misses any positive threshold,
        // hits a threshold of exactly 0.0.
        let ortho = query(&[0.0, 1.0], &[1.0, 0.0]);
        let exact = TopSimilarityFilter::new(0.0, 0.0);
        assert!(exact.filter(&ortho, &store).unwrap().is_some());
        let above = TopSimilarityFilter::new(0.1, 0.0);
        assert!(above.filter(&ortho, &store).unwrap().is_none());
    }

    #[test]
    fn clipping_blocks_highest_input_score() {
        // Edge 0: perfect input match but drifted output.
        // Edge 1: weaker input match with an aligned output.
        let store = store_with(&[
            (&[1.0, 0.0, 0.0], &[0.0, 0.0, 1.0]),
            (&[0.9, 0.1, 0.0], &[0.0, 1.0, 0.0]),
        ]);
        let q = query(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);

        let filter = TopSimilarityFilter::new(0.5, 0.5);
        let d = filter.filter(&q, &store).unwrap().unwrap();
        assert_eq!(d.index, 1, "clipped edge must never be selected");
    }

    #[test]
    fn all_clipped_is_no_match() {
        let store = store_with(&[(&[1.0, 0.0], &[1.0, 0.0])]);
        let q = query(&[1.0, 0.0], &[0.0, 1.0]);
        let filter = TopSimilarityFilter::new(0.5, 0.9);
        assert_eq!(filter.filter(&q, &store).unwrap(), None);
    }

    #[test]
    fn tie_break_picks_lowest_index() {
        let store = store_with(&[
            (&[1.0, 0.0], &[1.0, 0.0]),
            (&[1.0, 0.0], &[1.0, 0.0]),
        ]);
        let q = query(&[1.0, 0.0], &[1.0, 0.0]);
        let filter = TopSimilarityFilter::new(0.5, 0.0);
        assert_eq!(filter.filter(&q, &store).unwrap().unwrap().index, 0);
    }

    #[test]
    fn top_k_accepts_when_kth_clears_threshold() {
        let store = store_with(&[
            (&[1.0, 0.0], &[1.0, 0.0]),
            (&[0.9, 0.4359], &[1.0, 0.0]),
            (&[0.0, 1.0], &[1.0, 0.0]),
        ]);
        let q = query(&[1.0, 0.0], &[1.0, 0.0]);

        // k=2: second-best score is ~0.9; accepted, first candidate wins.
        let filter = TopKFilter::new(0.8, 2);
        let d = filter.filter(&q, &store).unwrap().unwrap();
        assert_eq!(d.index, 0);

        // k=3: third-best score is 0.0; rejected outright.
        let strict = TopKFilter::new(0.8, 3);
        assert!(strict.filter(&q, &store).unwrap().is_none());
    }

    #[test]
    fn top_k_clamps_k_to_store_size() {
        let store = store_with(&[(&[1.0, 0.0], &[1.0, 0.0])]);
        let q = query(&[1.0, 0.0], &[1.0, 0.0]);
        let filter = TopKFilter::new(0.9, 10);
        assert!(filter.filter(&q, &store).unwrap().is_some());
    }
}
