//! Embedding write path and similarity retrieval.

use docqa_core::index::IndexedChunk;
use docqa_core::models::{Chunk, SourceKind};
use serde::Serialize;

use crate::embedding::{embed_query, EmbedTask, Embedder};
use crate::error::{RagError, RagResult};
use crate::session::Session;

/// A retrieved chunk with the source it came from, for citation.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub source_name: String,
    pub source_kind: SourceKind,
}

/// Embed every chunk, in batches of `batch_size`.
///
/// Either all chunks come back embedded or an error is returned; callers
/// insert the result into an index only on success.
pub async fn embed_chunks(
    embedder: &dyn Embedder,
    chunks: Vec<Chunk>,
    batch_size: usize,
) -> RagResult<Vec<IndexedChunk>> {
    let mut vectors = Vec::with_capacity(chunks.len());

    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = embedder.embed(&texts, EmbedTask::Document).await?;
        if embedded.len() != texts.len() {
            return Err(RagError::EmbeddingService(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embedded.len()
            )));
        }
        vectors.extend(embedded);
    }

    tracing::debug!(chunks = chunks.len(), model = embedder.model_name(), "embedded chunks");

    Ok(chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| IndexedChunk { chunk, vector })
        .collect())
}

/// Top-`k` chunks of `session` for `question`.
///
/// An empty index returns nothing without calling the embedding service.
pub async fn retrieve(
    embedder: &dyn Embedder,
    session: &Session,
    question: &str,
    k: usize,
) -> RagResult<Vec<RetrievedChunk>> {
    if session.index.is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let query = embed_query(embedder, question).await?;
    Ok(search_session(session, &query, k))
}

/// Top-`k` chunks of `session` for an already embedded query.
pub fn search_session(session: &Session, query: &[f32], k: usize) -> Vec<RetrievedChunk> {
    session
        .index
        .search(query, k)
        .into_iter()
        .map(|hit| {
            let (source_name, source_kind) = session
                .source(&hit.chunk.source_id)
                .map(|s| (s.name.clone(), s.kind))
                .unwrap_or_else(|| ("unknown".to_string(), SourceKind::Text));
            RetrievedChunk {
                chunk: hit.chunk,
                score: hit.score,
                source_name,
                source_kind,
            }
        })
        .collect()
}
