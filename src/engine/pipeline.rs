// Echograph Engine — Generation Pipeline
//
// One end-to-end decision cycle: encode the query context, ask the
// similarity filter for a cached edge, then either resolve the cached
// response from the content table or fall back to the generator and write
// the fresh (input, output) pair back into the store.
//
// Concurrency model: runs are single-flight. A capacity-1 semaphore gates
// the whole cycle; concurrent callers queue in arrival order. The store and
// table are only mutated inside the gated section. Issuing a new run cancels
// the previous run's in-flight generator call.

use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{CacheConfig, CacheStats, ContentEntry, GenerateContext};
use crate::engine::content::ContentTable;
use crate::engine::encoder::{Encoder, HttpEncoder};
use crate::engine::filter::{SimilarityFilter, TopSimilarityFilter};
use crate::engine::generator::{CancelSignal, Generator, HttpGenerator};
use crate::engine::hasher::content_hash;
use crate::engine::store::VectorGraphStore;
use crate::engine::tensor::{RecentMeanConverter, TensorConverter};

pub struct GenerationPipeline {
    store: Mutex<VectorGraphStore>,
    table: Mutex<ContentTable>,
    encoder: Arc<dyn Encoder>,
    generator: Option<Arc<dyn Generator>>,
    filter: Arc<dyn SimilarityFilter>,
    converter: Arc<dyn TensorConverter>,
    /// Single-flight gate: at most one run executes at a time; waiters are
    /// serviced in arrival order.
    gate: Semaphore,
    /// Cancel signal of the most recently issued run.
    active_cancel: Mutex<Option<CancelSignal>>,
}

impl GenerationPipeline {
    /// Assemble a pipeline from explicit collaborators. The encoder
    /// dimension must match the store dimension; mismatches would corrupt
    /// every similarity score and are rejected at construction.
    pub fn new(
        store: VectorGraphStore,
        table: ContentTable,
        encoder: Arc<dyn Encoder>,
        generator: Option<Arc<dyn Generator>>,
        filter: Arc<dyn SimilarityFilter>,
        converter: Arc<dyn TensorConverter>,
    ) -> EngineResult<Self> {
        if encoder.dim() != store.dim() as usize {
            return Err(EngineError::config(format!(
                "encoder dimension {} does not match store dimension {}",
                encoder.dim(),
                store.dim()
            )));
        }
        Ok(GenerationPipeline {
            store: Mutex::new(store),
            table: Mutex::new(table),
            encoder,
            generator,
            filter,
            converter,
            gate: Semaphore::new(1),
            active_cancel: Mutex::new(None),
        })
    }

    /// Assemble a pipeline with the default HTTP collaborators and the
    /// top-similarity filter, all configured from `config`.
    pub fn from_config(
        store: VectorGraphStore,
        table: ContentTable,
        config: &CacheConfig,
    ) -> EngineResult<Self> {
        Self::new(
            store,
            table,
            Arc::new(HttpEncoder::new(config)),
            Some(Arc::new(HttpGenerator::new(config))),
            Arc::new(TopSimilarityFilter::new(
                config.input_threshold,
                config.output_threshold,
            )),
            Arc::new(RecentMeanConverter),
        )
    }

    /// Execute one decision cycle. Returns the context with its result
    /// flags set: retrieved+succeeded on a cache hit, succeeded on a fresh
    /// generation, neither when the generator failed, declined, or was
    /// cancelled. Infrastructure trouble (encoder failure, corrupt store)
    /// surfaces as an error instead.
    pub async fn run(&self, mut ctx: GenerateContext) -> EngineResult<GenerateContext> {
        // A fresh signal per run; the previous run's generator call is
        // cancelled as soon as a newer run is issued, even while this one
        // still queues on the gate.
        let cancel = CancelSignal::new();
        if let Some(previous) = self.active_cancel.lock().replace(cancel.clone()) {
            previous.cancel();
        }

        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| EngineError::config("pipeline gate closed"))?;

        let result = self.run_inner(&mut ctx, &cancel).await;

        // Drop our signal from the slot unless a newer run already took it.
        {
            let mut slot = self.active_cancel.lock();
            if slot.as_ref().is_some_and(|c| c.same(&cancel)) {
                *slot = None;
            }
        }

        match result {
            Ok(()) => Ok(ctx),
            Err(e) => {
                ctx.mark_failed();
                Err(e)
            }
        }
    }

    async fn run_inner(
        &self,
        ctx: &mut GenerateContext,
        cancel: &CancelSignal,
    ) -> EngineResult<()> {
        if ctx.input.is_empty() {
            return Err(EngineError::config("run context has no input"));
        }

        // ── Encode ──────────────────────────────────────────────────────
        let rows = self.encoder.encode(&ctx.input).await?;
        {
            let store = self.store.lock();
            if rows.dim() != store.dim() as usize {
                return Err(EngineError::Encoder(format!(
                    "encoder produced dimension {}, store requires {}",
                    rows.dim(),
                    store.dim()
                )));
            }
        }
        let query = self.converter.convert(&rows)?;

        // ── Filter ──────────────────────────────────────────────────────
        let decision = {
            let store = self.store.lock();
            self.filter.filter(&query, &store)?
        };

        // ── Hit: resolve from the content table ─────────────────────────
        if let Some(decision) = decision {
            let output_hash = self.store.lock().get_output_hash(decision.index)?;
            let entry = self
                .table
                .lock()
                .try_get(output_hash)
                .cloned()
                .ok_or_else(|| {
                    EngineError::format(format!(
                        "edge {} output hash {output_hash:#010x} has no content entry",
                        decision.index
                    ))
                })?;

            info!(
                "[pipeline] cache hit: edge {} score {:.4}",
                decision.index, decision.score
            );
            ctx.output_entry = Some(entry);
            ctx.mark_retrieved();
            return Ok(());
        }

        // ── Miss: generate ──────────────────────────────────────────────
        let Some(generator) = &self.generator else {
            warn!("[pipeline] cache miss with no generator configured");
            ctx.mark_failed();
            return Ok(());
        };

        match generator.generate(ctx, cancel).await {
            Ok(true) => {}
            Ok(false) => {
                info!("[pipeline] generation declined or cancelled — no result");
                ctx.mark_failed();
                return Ok(());
            }
            Err(e) => {
                warn!("[pipeline] generation failed: {e}");
                ctx.mark_failed();
                return Ok(());
            }
        }

        let Some(generated) = ctx.generated.clone().filter(|t| !t.is_empty()) else {
            warn!("[pipeline] generator reported success but produced no text");
            ctx.mark_failed();
            return Ok(());
        };

        // ── Write-back ──────────────────────────────────────────────────
        let input_text = ctx.joined_input();
        let input_hash = content_hash(&input_text);
        let output_hash = content_hash(&generated);

        let entry = match self.encoder.encode(std::slice::from_ref(&generated)).await {
            Ok(out_rows) if out_rows.rows() == 1 => {
                let entry = ContentEntry {
                    hash: output_hash,
                    text: generated,
                    embedding: out_rows.row(0).to_vec(),
                };
                self.write_back(input_hash, query.input.row(0), &entry);
                entry
            }
            Ok(_) | Err(_) => {
                // The caller still gets the generated text; the pair just
                // is not cached for future runs.
                warn!("[pipeline] output embedding failed — write-back skipped");
                ContentEntry {
                    hash: output_hash,
                    text: generated,
                    embedding: Vec::new(),
                }
            }
        };

        ctx.output_entry = Some(entry);
        ctx.mark_generated();
        Ok(())
    }

    /// Persist one fresh pair. Content entry first, then the edge: a crash
    /// between the two leaves an orphan content entry (harmless) rather
    /// than a dangling edge that can never be resolved.
    fn write_back(&self, input_hash: u32, input_emb: &[f32], entry: &ContentEntry) {
        let mut table = self.table.lock();
        let mut store = self.store.lock();

        if !table.add_entry(entry.clone()) {
            warn!(
                "[pipeline] content hash collision {:#010x} — write-back skipped",
                entry.hash
            );
            return;
        }

        match store.append(input_hash, input_emb, entry.hash, &entry.embedding) {
            Ok(()) => info!(
                "[pipeline] write-back: edge {} ({input_hash:#010x} -> {:#010x})",
                store.len() - 1,
                entry.hash
            ),
            Err(e) => warn!("[pipeline] edge append failed: {e}"),
        }
    }

    // ── Introspection & persistence ─────────────────────────────────────

    pub fn stats(&self) -> CacheStats {
        // Same lock order as write_back: table before store.
        let table = self.table.lock();
        let store = self.store.lock();
        CacheStats {
            edge_count: store.len(),
            entry_count: table.len(),
            dim: store.dim(),
        }
    }

    /// Flush both structures to disk, content table first so the files on
    /// disk keep the same consistency order as the in-memory write-back.
    pub fn save(
        &self,
        store_path: &std::path::Path,
        table_path: &std::path::Path,
    ) -> EngineResult<()> {
        self.table.lock().save(table_path)?;
        self.store.lock().save(store_path)?;
        Ok(())
    }
}
