//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the storage seam for chunk embeddings: one
//! index instance belongs to one session, and the answering pipeline only
//! ever reaches it through that session, so a query can never see another
//! session's chunks.
//!
//! Embedding is not the index's job. The application's write path computes
//! all vectors first and then calls [`VectorIndex::insert`] once, which keeps
//! a failed upload from leaving a half-indexed session behind.
//!
//! Implementations must be `Send + Sync` so sessions can live behind an
//! async mutex shared across request handlers.

pub mod memory;

use anyhow::Result;

use crate::models::{Chunk, ScoredChunk};

/// A chunk paired with its embedding, ready for insertion.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Append-only nearest-neighbour index over chunk embeddings.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](VectorIndex::insert) | Append embedded chunks |
/// | [`search`](VectorIndex::search) | Top-k chunks by similarity |
/// | [`len`](VectorIndex::len) | Number of stored chunks |
/// | [`dims`](VectorIndex::dims) | Vector width fixed by the first insert |
pub trait VectorIndex: Send + Sync {
    /// Append entries in order.
    ///
    /// All entries must share the index's dimensionality; on mismatch
    /// nothing is inserted and an error is returned.
    fn insert(&mut self, entries: Vec<IndexedChunk>) -> Result<()>;

    /// Return at most `k` chunks ordered by descending similarity to
    /// `query`. Equal scores keep insertion order.
    fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk>;

    /// Number of stored chunks.
    fn len(&self) -> usize;

    /// Vector width, or `None` while the index is empty.
    fn dims(&self) -> Option<usize>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
