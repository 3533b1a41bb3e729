// Echograph Engine — Content Table
//
// Hash-keyed map from 32-bit content hash to literal string value plus its
// embedding. Entries are deduplicated by hash and kept in insertion order
// for serialization; lookups go through a HashMap index instead of scanning.
//
// On-disk layout (little-endian):
//   i32 entry_count
//   entry_count × (u32 hash, i32 byte_len + UTF-8 bytes,
//                  i32 emb_len + emb_len × f32)

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use log::{info, warn};

use crate::atoms::error::EngineResult;
use crate::atoms::types::ContentEntry;
use crate::engine::codec;

#[derive(Debug, Default)]
pub struct ContentTable {
    entries: Vec<ContentEntry>,
    /// hash → position in `entries`.
    index: HashMap<u32, usize>,
}

impl ContentTable {
    pub fn new() -> Self {
        ContentTable::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by content hash.
    pub fn try_get(&self, hash: u32) -> Option<&ContentEntry> {
        self.index.get(&hash).map(|&i| &self.entries[i])
    }

    /// Insert an entry. Returns `false` without modifying the table when the
    /// hash is already present; the caller decides how to handle the
    /// collision.
    pub fn add_entry(&mut self, entry: ContentEntry) -> bool {
        if self.index.contains_key(&entry.hash) {
            return false;
        }
        self.index.insert(entry.hash, self.entries.len());
        self.entries.push(entry);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContentEntry> {
        self.entries.iter()
    }

    // ── Persistence ────────────────────────────────────────────────────────

    /// Serialize the table to `path`, entries in insertion order.
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let mut w = BufWriter::new(File::create(path)?);
        codec::write_i32(&mut w, self.entries.len() as i32)?;
        for entry in &self.entries {
            codec::write_u32(&mut w, entry.hash)?;
            codec::write_string(&mut w, &entry.text)?;
            codec::write_i32(&mut w, entry.embedding.len() as i32)?;
            codec::write_f32_slice(&mut w, &entry.embedding)?;
        }
        w.flush()?;
        info!("[content] saved {} entries to {}", self.entries.len(), path.display());
        Ok(())
    }

    /// Load a table from `path`. Truncation is rejected whole. A duplicated
    /// hash inside the file keeps the first occurrence; the table only ever
    /// holds one entry per hash.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let mut r = BufReader::new(File::open(path)?);
        let entry_count = codec::read_count(&mut r, "content entry count")?;

        let mut table = ContentTable::new();
        for _ in 0..entry_count {
            let hash = codec::read_u32(&mut r, "content entry hash")?;
            let text = codec::read_string(&mut r, "content entry text")?;
            let emb_len = codec::read_count(&mut r, "content entry embedding length")?;
            let embedding = codec::read_f32_vec(&mut r, emb_len, "content entry embedding")?;

            if !table.add_entry(ContentEntry { hash, text, embedding }) {
                warn!("[content] duplicate hash {hash:#010x} in {} — keeping first", path.display());
            }
        }

        info!("[content] loaded {} entries from {}", table.len(), path.display());
        Ok(table)
    }
}
