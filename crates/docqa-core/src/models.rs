//! Core data models shared by the ingestion and answering pipeline.
//!
//! A [`Source`] is one uploaded artifact after text extraction. Its text is
//! split into [`Chunk`]s, which are embedded and stored in a session's
//! vector index. Every answered question is recorded as a [`ChatTurn`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of artifact a [`Source`] was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pdf,
    Image,
    Url,
    Text,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Pdf => "pdf",
            SourceKind::Image => "image",
            SourceKind::Url => "url",
            SourceKind::Text => "text",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One uploaded artifact with its extracted plain text.
///
/// Immutable once created; owned by exactly one session.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub id: String,
    pub kind: SourceKind,
    /// File name, URL, or `"Custom text"`.
    pub name: String,
    pub text: String,
    /// Number of loader documents (PDF pages; 1 for everything else).
    pub page_count: usize,
    /// SHA-256 of `text`, hex encoded.
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Source {
    /// Character (not byte) length of the extracted text.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// A contiguous slice of a source's text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// Deterministic UUIDv5 of `(source_id, index)`.
    pub id: String,
    pub source_id: String,
    pub index: usize,
    pub text: String,
    /// Offset of the first character of `text` in the source text, in chars.
    pub start: usize,
    /// Number of leading characters shared with the previous chunk.
    pub overlap: usize,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// Where the text of an answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
    /// Grounded in the session's own documents.
    Document,
    /// Grounded in live web search snippets.
    Web,
    /// The model answered from general knowledge.
    None,
}

impl AnswerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerSource::Document => "document",
            AnswerSource::Web => "web",
            AnswerSource::None => "none",
        }
    }
}

/// A question/answer pair recorded in a session's chat history.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
    pub source: AnswerSource,
    pub asked_at: DateTime<Utc>,
}

/// A chunk returned from a similarity search, with its score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity to the query in `[-1.0, 1.0]`.
    pub score: f32,
}

/// One live web search hit used as alternate answer context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebSnippet {
    pub title: String,
    pub url: String,
    pub snippet: String,
}
