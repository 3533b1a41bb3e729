// Echograph integration tests — full pipeline cycles over mock collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use echograph::{
    content_hash, CancelSignal, ContentEntry, ContentTable, Encoder, EngineResult,
    GenerateContext, GenerationPipeline, Generator, Matrix, RecentMeanConverter,
    TopSimilarityFilter, VectorGraphStore,
};

// ── Mock collaborators ──────────────────────────────────────────────────────

/// Deterministic encoder: known texts map to fixed vectors, everything else
/// gets the fallback vector.
struct MapEncoder {
    dim: usize,
    map: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
}

impl MapEncoder {
    fn new(dim: usize, pairs: &[(&str, &[f32])], fallback: &[f32]) -> Self {
        MapEncoder {
            dim,
            map: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect(),
            fallback: fallback.to_vec(),
        }
    }
}

#[async_trait]
impl Encoder for MapEncoder {
    async fn encode(&self, inputs: &[String]) -> EngineResult<Matrix> {
        let rows: Vec<Vec<f32>> = inputs
            .iter()
            .map(|t| self.map.get(t).cloned().unwrap_or_else(|| self.fallback.clone()))
            .collect();
        Matrix::from_rows(&rows)
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

/// Encoder that fails every call after the first; exercises the
/// write-back-skipped recovery path.
struct FailAfterFirstEncoder {
    dim: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Encoder for FailAfterFirstEncoder {
    async fn encode(&self, inputs: &[String]) -> EngineResult<Matrix> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(echograph::EngineError::Encoder("backend down".into()));
        }
        let rows: Vec<Vec<f32>> = inputs.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect();
        Matrix::from_rows(&rows)
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

/// Generator returning a fixed reply, counting its invocations.
struct ReplyGenerator {
    reply: String,
    calls: AtomicUsize,
}

impl ReplyGenerator {
    fn new(reply: &str) -> Self {
        ReplyGenerator {
            reply: reply.into(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Generator for ReplyGenerator {
    async fn generate(
        &self,
        ctx: &mut GenerateContext,
        _cancel: &CancelSignal,
    ) -> EngineResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ctx.generated = Some(self.reply.clone());
        Ok(true)
    }
}

/// Generator whose backend is broken.
struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(
        &self,
        _ctx: &mut GenerateContext,
        _cancel: &CancelSignal,
    ) -> EngineResult<bool> {
        Err(echograph::EngineError::Generator("backend down".into()))
    }
}

/// First call blocks until cancelled (or a long timeout); later calls reply
/// immediately. Used to observe one run cancelling its predecessor.
struct CancelAwareGenerator {
    reply: String,
    calls: AtomicUsize,
}

#[async_trait]
impl Generator for CancelAwareGenerator {
    async fn generate(
        &self,
        ctx: &mut GenerateContext,
        cancel: &CancelSignal,
    ) -> EngineResult<bool> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(false),
                _ = tokio::time::sleep(std::time::Duration::from_secs(10)) => {}
            }
        }
        ctx.generated = Some(self.reply.clone());
        Ok(true)
    }
}

// ── Fixtures ────────────────────────────────────────────────────────────────

const DIM: usize = 4;

const E_QUERY: [f32; 4] = [1.0, 0.0, 0.0, 0.0];
const E_ANSWER: [f32; 4] = [0.0, 1.0, 0.0, 0.0];

fn seeded_store() -> (VectorGraphStore, ContentTable) {
    let mut store = VectorGraphStore::new(DIM as u32);
    store.append(111, &E_QUERY, 222, &E_ANSWER).unwrap();

    let mut table = ContentTable::new();
    table.add_entry(ContentEntry {
        hash: 222,
        text: "hello".into(),
        embedding: E_ANSWER.to_vec(),
    });
    (store, table)
}

fn pipeline_with(
    store: VectorGraphStore,
    table: ContentTable,
    encoder: Arc<dyn Encoder>,
    generator: Option<Arc<dyn Generator>>,
    input_threshold: f32,
    output_threshold: f32,
) -> GenerationPipeline {
    GenerationPipeline::new(
        store,
        table,
        encoder,
        generator,
        Arc::new(TopSimilarityFilter::new(input_threshold, output_threshold)),
        Arc::new(RecentMeanConverter),
    )
    .unwrap()
}

// ── Retrieval path ──────────────────────────────────────────────────────────

#[tokio::test]
async fn cache_hit_resolves_stored_text() {
    let (store, table) = seeded_store();
    let encoder = Arc::new(MapEncoder::new(
        DIM,
        &[("greetings", &E_QUERY)],
        &[0.0; 4],
    ));
    let pipeline = pipeline_with(store, table, encoder, None, 0.9, 0.0);

    let ctx = pipeline
        .run(GenerateContext::new(vec!["greetings".into()]))
        .await
        .unwrap();

    assert!(ctx.was_retrieved());
    assert!(ctx.succeeded());
    assert_eq!(ctx.output_entry.unwrap().text, "hello");
    assert_eq!(pipeline.stats().edge_count, 1, "retrieval must not mutate the store");
}

#[tokio::test]
async fn dissimilar_query_misses() {
    let (store, table) = seeded_store();
    let encoder = Arc::new(MapEncoder::new(
        DIM,
        &[("unrelated", &[0.0, 0.0, 0.0, 1.0])],
        &[0.0; 4],
    ));
    let pipeline = pipeline_with(store, table, encoder, None, 0.9, 0.0);

    let ctx = pipeline
        .run(GenerateContext::new(vec!["unrelated".into()]))
        .await
        .unwrap();

    assert!(!ctx.was_retrieved());
    assert!(!ctx.succeeded());
    assert!(ctx.output_entry.is_none());
}

#[tokio::test]
async fn output_drift_clips_otherwise_perfect_match() {
    // The stored answer embedding is orthogonal to the query anchor; with a
    // positive output threshold the edge must never be selected even though
    // the input sides match exactly.
    let (store, table) = seeded_store();
    let encoder = Arc::new(MapEncoder::new(DIM, &[("greetings", &E_QUERY)], &[0.0; 4]));
    let pipeline = pipeline_with(store, table, encoder, None, 0.9, 0.5);

    let ctx = pipeline
        .run(GenerateContext::new(vec!["greetings".into()]))
        .await
        .unwrap();

    assert!(!ctx.was_retrieved());
}

// ── Generation path ─────────────────────────────────────────────────────────

#[tokio::test]
async fn generation_writes_back_then_second_run_hits() {
    let encoder = Arc::new(MapEncoder::new(
        DIM,
        &[
            ("what is rust", &E_QUERY),
            ("a systems language", &[0.0, 0.0, 1.0, 0.0]),
        ],
        &[0.0; 4],
    ));
    let generator = Arc::new(ReplyGenerator::new("a systems language"));
    let pipeline = pipeline_with(
        VectorGraphStore::new(DIM as u32),
        ContentTable::new(),
        encoder,
        Some(generator.clone()),
        0.9,
        0.0,
    );

    // First run: cold store, generation + write-back.
    let first = pipeline
        .run(GenerateContext::new(vec!["what is rust".into()]))
        .await
        .unwrap();
    assert!(!first.was_retrieved());
    assert!(first.succeeded());
    assert_eq!(first.output_entry.as_ref().unwrap().text, "a systems language");
    assert_eq!(pipeline.stats().edge_count, 1);
    assert_eq!(pipeline.stats().entry_count, 1);

    // Second run: identical query must be served from cache, store untouched.
    let second = pipeline
        .run(GenerateContext::new(vec!["what is rust".into()]))
        .await
        .unwrap();
    assert!(second.was_retrieved());
    assert_eq!(second.output_entry.unwrap().text, "a systems language");
    assert_eq!(pipeline.stats().edge_count, 1);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn generator_failure_reports_no_result() {
    let encoder = Arc::new(MapEncoder::new(DIM, &[], &E_QUERY));
    let pipeline = pipeline_with(
        VectorGraphStore::new(DIM as u32),
        ContentTable::new(),
        encoder,
        Some(Arc::new(FailingGenerator)),
        0.9,
        0.0,
    );

    let ctx = pipeline
        .run(GenerateContext::new(vec!["anything".into()]))
        .await
        .unwrap();

    assert!(!ctx.succeeded());
    assert!(ctx.output_entry.is_none());
    assert_eq!(pipeline.stats().edge_count, 0);

    // The pipeline stays usable after a failed generation.
    let again = pipeline
        .run(GenerateContext::new(vec!["anything".into()]))
        .await
        .unwrap();
    assert!(!again.succeeded());
}

#[tokio::test]
async fn missing_generator_marks_failed() {
    let encoder = Arc::new(MapEncoder::new(DIM, &[], &E_QUERY));
    let pipeline = pipeline_with(
        VectorGraphStore::new(DIM as u32),
        ContentTable::new(),
        encoder,
        None,
        0.9,
        0.0,
    );

    let ctx = pipeline
        .run(GenerateContext::new(vec!["anything".into()]))
        .await
        .unwrap();
    assert!(!ctx.succeeded());
    assert!(!ctx.was_retrieved());
}

#[tokio::test]
async fn hash_collision_skips_edge_append() {
    let reply = "colliding answer";
    let mut table = ContentTable::new();
    // Seed an entry under the exact hash the generated text will get.
    table.add_entry(ContentEntry {
        hash: content_hash(reply),
        text: "previously stored".into(),
        embedding: vec![0.0; DIM],
    });

    let encoder = Arc::new(MapEncoder::new(DIM, &[], &E_QUERY));
    let pipeline = pipeline_with(
        VectorGraphStore::new(DIM as u32),
        table,
        encoder,
        Some(Arc::new(ReplyGenerator::new(reply))),
        0.9,
        0.0,
    );

    let ctx = pipeline
        .run(GenerateContext::new(vec!["some question".into()]))
        .await
        .unwrap();

    // The caller still gets the generated text, but no dangling edge may
    // appear: an edge whose output hash maps to foreign content would serve
    // the wrong answer forever.
    assert!(ctx.succeeded());
    assert_eq!(ctx.output_entry.unwrap().text, reply);
    assert_eq!(pipeline.stats().edge_count, 0);
    assert_eq!(pipeline.stats().entry_count, 1);
}

#[tokio::test]
async fn output_embedding_failure_skips_write_back() {
    let encoder = Arc::new(FailAfterFirstEncoder {
        dim: DIM,
        calls: AtomicUsize::new(0),
    });
    let pipeline = pipeline_with(
        VectorGraphStore::new(DIM as u32),
        ContentTable::new(),
        encoder,
        Some(Arc::new(ReplyGenerator::new("uncacheable"))),
        0.9,
        0.0,
    );

    let ctx = pipeline
        .run(GenerateContext::new(vec!["q".into()]))
        .await
        .unwrap();

    assert!(ctx.succeeded());
    assert_eq!(ctx.output_entry.unwrap().text, "uncacheable");
    assert_eq!(pipeline.stats().edge_count, 0);
    assert_eq!(pipeline.stats().entry_count, 0);
}

// ── Concurrency ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn new_run_cancels_in_flight_generation() {
    let encoder = Arc::new(MapEncoder::new(DIM, &[], &E_QUERY));
    let generator = Arc::new(CancelAwareGenerator {
        reply: "late answer".into(),
        calls: AtomicUsize::new(0),
    });
    let pipeline = Arc::new(pipeline_with(
        VectorGraphStore::new(DIM as u32),
        ContentTable::new(),
        encoder,
        Some(generator.clone()),
        0.9,
        0.0,
    ));

    let first = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            pipeline
                .run(GenerateContext::new(vec!["first".into()]))
                .await
        })
    };

    // Let the first run reach its generator before issuing the second.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let second = pipeline
        .run(GenerateContext::new(vec!["second".into()]))
        .await
        .unwrap();

    let first = first.await.unwrap().unwrap();
    assert!(!first.succeeded(), "cancelled run must complete as a failed generation");
    assert!(second.succeeded());
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn queued_runs_execute_in_sequence() {
    let encoder = Arc::new(MapEncoder::new(
        DIM,
        &[
            ("q", &E_QUERY),
            ("the answer", &[0.0, 0.0, 1.0, 0.0]),
        ],
        &[0.0; 4],
    ));
    let generator = Arc::new(ReplyGenerator::new("the answer"));
    let pipeline = Arc::new(pipeline_with(
        VectorGraphStore::new(DIM as u32),
        ContentTable::new(),
        encoder,
        Some(generator.clone()),
        0.9,
        0.0,
    ));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            pipeline.run(GenerateContext::new(vec!["q".into()])).await
        }));
    }

    for handle in handles {
        let ctx = handle.await.unwrap().unwrap();
        assert!(ctx.succeeded());
        assert_eq!(ctx.output_entry.unwrap().text, "the answer");
    }

    // Exactly one run generated; the rest were served from cache after
    // queueing on the single-flight gate.
    assert_eq!(pipeline.stats().edge_count, 1);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

// ── Persistence ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn pipeline_save_persists_both_structures() {
    let encoder = Arc::new(MapEncoder::new(DIM, &[("q", &E_QUERY)], &[0.0, 0.0, 1.0, 0.0]));
    let pipeline = pipeline_with(
        VectorGraphStore::new(DIM as u32),
        ContentTable::new(),
        encoder,
        Some(Arc::new(ReplyGenerator::new("persisted answer"))),
        0.9,
        0.0,
    );

    pipeline
        .run(GenerateContext::new(vec!["q".into()]))
        .await
        .unwrap();

    let dir = std::env::temp_dir();
    let store_path = dir.join(format!("echograph-it-store-{}.bin", std::process::id()));
    let table_path = dir.join(format!("echograph-it-table-{}.bin", std::process::id()));
    pipeline.save(&store_path, &table_path).unwrap();

    let store = VectorGraphStore::load(&store_path).unwrap();
    let table = ContentTable::load(&table_path).unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(
        table
            .try_get(store.get_output_hash(0).unwrap())
            .unwrap()
            .text,
        "persisted answer"
    );

    std::fs::remove_file(&store_path).ok();
    std::fs::remove_file(&table_path).ok();
}
