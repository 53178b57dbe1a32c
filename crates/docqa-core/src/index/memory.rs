//! In-memory [`VectorIndex`] implementation.
//!
//! Brute-force cosine similarity over every stored vector. Sessions hold a
//! few documents at most, so a linear scan is fast enough and keeps result
//! order exact.

use anyhow::{bail, Result};

use crate::models::ScoredChunk;
use crate::similarity::cosine_similarity;

use super::{IndexedChunk, VectorIndex};

/// In-memory vector index, one per session.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    entries: Vec<IndexedChunk>,
    dims: Option<usize>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for InMemoryIndex {
    fn insert(&mut self, entries: Vec<IndexedChunk>) -> Result<()> {
        let expected = self
            .dims
            .or_else(|| entries.first().map(|e| e.vector.len()));

        if let Some(dims) = expected {
            if dims == 0 {
                bail!("cannot index zero-length embedding vectors");
            }
            if let Some(bad) = entries.iter().find(|e| e.vector.len() != dims) {
                bail!(
                    "embedding dimension mismatch for chunk {}: expected {}, got {}",
                    bad.chunk.id,
                    dims,
                    bad.vector.len()
                );
            }
        }

        if !entries.is_empty() {
            self.dims = expected;
        }
        self.entries.extend(entries);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        if k == 0 || self.entries.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: cosine_similarity(query, &e.vector),
            })
            .collect();

        // sort_by is stable, so equal scores stay in insertion order.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }
}
