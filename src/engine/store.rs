// Echograph Engine — Vector Graph Store
//
// Append-only store of cached (query, response) edges. Each edge is a pair
// of content hashes plus two embedding rows held in one flat interleaved
// buffer: row 2*i is edge i's input embedding, row 2*i+1 its output
// embedding. The edge's list position doubles as the row index into the
// matrices handed to the similarity filter.
//
// On-disk layout (little-endian):
//   i32 dim
//   i32 edge_count
//   edge_count * dim * 2 × f32   (interleaved embedding buffer, row-major)
//   edge_count × (u32 input_hash, u32 output_hash)

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use log::{debug, info};

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{Edge, EmbeddingSlot};
use crate::engine::codec;
use crate::engine::tensor::Matrix;

#[derive(Debug)]
pub struct VectorGraphStore {
    dim: u32,
    edges: Vec<Edge>,
    /// Flat buffer, length `edges.len() * 2 * dim`, interleaved per edge.
    embeddings: Vec<f32>,
}

impl VectorGraphStore {
    /// Create an empty store with a fixed embedding dimension.
    pub fn new(dim: u32) -> Self {
        VectorGraphStore {
            dim,
            edges: Vec::new(),
            embeddings: Vec::new(),
        }
    }

    pub fn dim(&self) -> u32 {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edge(&self, index: usize) -> Option<&Edge> {
        self.edges.get(index)
    }

    /// The output-content hash of edge `index`. Out-of-range indices are a
    /// caller bug surfaced as an error rather than a panic.
    pub fn get_output_hash(&self, index: usize) -> EngineResult<u32> {
        self.edges
            .get(index)
            .map(|e| e.output)
            .ok_or(EngineError::OutOfRange {
                index,
                len: self.edges.len(),
            })
    }

    /// Append one edge and its two embedding rows. Both embeddings must
    /// match the store dimension; a mismatch would silently corrupt the
    /// similarity math for every row after it.
    pub fn append(
        &mut self,
        input_hash: u32,
        input_emb: &[f32],
        output_hash: u32,
        output_emb: &[f32],
    ) -> EngineResult<()> {
        let dim = self.dim as usize;
        if input_emb.len() != dim || output_emb.len() != dim {
            return Err(EngineError::config(format!(
                "embedding dimension mismatch: got {}/{} (store dim {})",
                input_emb.len(),
                output_emb.len(),
                dim
            )));
        }
        self.embeddings.extend_from_slice(input_emb);
        self.embeddings.extend_from_slice(output_emb);
        self.edges.push(Edge {
            input: input_hash,
            output: output_hash,
        });
        debug!(
            "[store] appended edge {} ({:#010x} -> {:#010x})",
            self.edges.len() - 1,
            input_hash,
            output_hash
        );
        Ok(())
    }

    /// Remove edge `index` together with both of its embedding rows, shifting
    /// subsequent rows down. The edge list and the embedding buffer move as
    /// one unit; removing only one side would silently misalign every edge
    /// after the removal point.
    pub fn remove(&mut self, index: usize) -> EngineResult<Edge> {
        if index >= self.edges.len() {
            return Err(EngineError::OutOfRange {
                index,
                len: self.edges.len(),
            });
        }
        let dim = self.dim as usize;
        let start = index * 2 * dim;
        self.embeddings.drain(start..start + 2 * dim);
        let edge = self.edges.remove(index);
        debug!("[store] removed edge {index} ({:#010x} -> {:#010x})", edge.input, edge.output);
        Ok(edge)
    }

    /// Overwrite one of edge `index`'s embedding rows in place.
    pub fn set_embedding(
        &mut self,
        index: usize,
        slot: EmbeddingSlot,
        values: &[f32],
    ) -> EngineResult<()> {
        if index >= self.edges.len() {
            return Err(EngineError::OutOfRange {
                index,
                len: self.edges.len(),
            });
        }
        let dim = self.dim as usize;
        if values.len() != dim {
            return Err(EngineError::config(format!(
                "embedding dimension mismatch: got {} (store dim {})",
                values.len(),
                dim
            )));
        }
        let row = match slot {
            EmbeddingSlot::Input => 2 * index,
            EmbeddingSlot::Output => 2 * index + 1,
        };
        self.embeddings[row * dim..(row + 1) * dim].copy_from_slice(values);
        Ok(())
    }

    /// Materialize the full input and output matrices (each
    /// `edges.len() × dim`) by deinterleaving the flat buffer: input matrix
    /// row `i` comes from buffer offset `2*i*dim`, output matrix row `i`
    /// from `(2*i+1)*dim`.
    pub fn allocate_tensors(&self) -> (Matrix, Matrix) {
        let dim = self.dim as usize;
        let n = self.edges.len();
        let mut inputs = Vec::with_capacity(n * dim);
        let mut outputs = Vec::with_capacity(n * dim);
        for i in 0..n {
            let base = 2 * i * dim;
            inputs.extend_from_slice(&self.embeddings[base..base + dim]);
            outputs.extend_from_slice(&self.embeddings[base + dim..base + 2 * dim]);
        }
        (
            Matrix::from_flat(n, dim, inputs),
            Matrix::from_flat(n, dim, outputs),
        )
    }

    // ── Persistence ────────────────────────────────────────────────────────

    /// Serialize the store to `path` in the binary layout above.
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let mut w = BufWriter::new(File::create(path)?);
        codec::write_i32(&mut w, self.dim as i32)?;
        codec::write_i32(&mut w, self.edges.len() as i32)?;
        codec::write_f32_slice(&mut w, &self.embeddings)?;
        for edge in &self.edges {
            codec::write_u32(&mut w, edge.input)?;
            codec::write_u32(&mut w, edge.output)?;
        }
        w.flush()?;
        info!(
            "[store] saved {} edges (dim {}) to {}",
            self.edges.len(),
            self.dim,
            path.display()
        );
        Ok(())
    }

    /// Load a store from `path`. Truncated or internally inconsistent files
    /// are rejected whole; a partially-read store is never returned.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let mut r = BufReader::new(File::open(path)?);

        let dim = codec::read_i32(&mut r, "store dim")?;
        if dim <= 0 {
            return Err(EngineError::format(format!("invalid store dim: {dim}")));
        }
        let dim = dim as u32;
        let edge_count = codec::read_count(&mut r, "store edge count")?;

        let float_count = edge_count
            .checked_mul(2)
            .and_then(|n| n.checked_mul(dim as usize))
            .ok_or_else(|| {
                EngineError::format(format!(
                    "store header overflows: {edge_count} edges, dim {dim}"
                ))
            })?;
        let embeddings = codec::read_f32_vec(&mut r, float_count, "store embedding buffer")?;

        let mut edges = Vec::with_capacity(edge_count);
        for i in 0..edge_count {
            let input = codec::read_u32(&mut r, "edge input hash")?;
            let output = codec::read_u32(&mut r, "edge output hash")?;
            edges.push(Edge { input, output });
            debug!("[store] loaded edge {i} ({input:#010x} -> {output:#010x})");
        }

        if embeddings.len() != edges.len() * 2 * dim as usize {
            return Err(EngineError::format(format!(
                "embedding buffer length {} does not match {} edges at dim {}",
                embeddings.len(),
                edges.len(),
                dim
            )));
        }

        info!(
            "[store] loaded {} edges (dim {}) from {}",
            edges.len(),
            dim,
            path.display()
        );
        Ok(VectorGraphStore {
            dim,
            edges,
            embeddings,
        })
    }
}
