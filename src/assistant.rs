//! Application façade used by both the HTTP server and the CLI.
//!
//! Upload flow: ingest → chunk → embed → lock session → insert → summarize.
//! Everything up to the insert happens before a session is touched, so a
//! failed upload never creates or changes a session. Model calls (answers
//! and summaries) run without the session lock held.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use docqa_core::chunk::{chunk_text, ChunkParams};
use docqa_core::index::IndexedChunk;
use docqa_core::models::{ChatTurn, Source, SourceKind};
use docqa_core::prompt::{self, Preview, SummaryScope};
use serde::Serialize;

use crate::answer::{Answer, AnswerComposer, AnswerSettings};
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::RagResult;
use crate::generation::{create_generator, GenerationRequest, Generator};
use crate::ingest::{describe, Ingestor, SourceInput};
use crate::retrieve::embed_chunks;
use crate::session::{InMemorySessionStore, Session, SessionStore};
use crate::web_search::{create_searcher, WebSearcher};

#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub name: String,
    pub character_count: usize,
    pub page_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&Source> for SourceInfo {
    fn from(s: &Source) -> Self {
        Self {
            id: s.id.clone(),
            kind: s.kind,
            name: s.name.clone(),
            character_count: s.char_count(),
            page_count: s.page_count,
            created_at: s.created_at,
        }
    }
}

/// Result of creating a session from a first source.
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub session_id: String,
    pub summary: String,
    pub source: SourceInfo,
    pub chunk_count: usize,
}

/// Result of adding a source to an existing session.
#[derive(Debug, Clone, Serialize)]
pub struct AddOutcome {
    pub session_id: String,
    pub summary: String,
    pub source: SourceInfo,
    pub preview: Preview,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub source_count: usize,
    pub sources: Vec<SourceInfo>,
    pub total_characters: usize,
    pub chunk_count: usize,
    pub turn_count: usize,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionListing {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub source_count: usize,
    pub turn_count: usize,
    pub has_summary: bool,
}

/// External services the assistant depends on.
#[derive(Clone)]
pub struct Services {
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
    pub searcher: Arc<dyn WebSearcher>,
    pub store: Arc<dyn SessionStore>,
}

impl Services {
    /// Build the configured providers with an in-memory session store.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            embedder: Arc::from(create_embedder(config)?),
            generator: Arc::from(create_generator(config)?),
            searcher: Arc::from(create_searcher(config)?),
            store: Arc::new(InMemorySessionStore::new()),
        })
    }
}

pub struct Assistant {
    chunk_params: ChunkParams,
    batch_size: usize,
    ingestor: Ingestor,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    composer: AnswerComposer,
    store: Arc<dyn SessionStore>,
}

impl Assistant {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(config, Services::from_config(config)?)
    }

    pub fn new(config: &Config, services: Services) -> anyhow::Result<Self> {
        let chunk_params = config.chunking.params();
        chunk_params.validate()?;

        tracing::info!(
            embedder = services.embedder.model_name(),
            dims = services.embedder.dims(),
            generator = services.generator.model_name(),
            web_search = services.searcher.name(),
            "assistant ready"
        );

        Ok(Self {
            chunk_params,
            batch_size: config.embedding.batch_size,
            ingestor: Ingestor::new(&config.ingest, services.generator.clone())?,
            composer: AnswerComposer::new(
                services.embedder.clone(),
                services.generator.clone(),
                services.searcher,
                AnswerSettings::from_config(config),
            ),
            embedder: services.embedder,
            generator: services.generator,
            store: services.store,
        })
    }

    /// Create a session with no sources.
    pub fn create_session(&self) -> String {
        let session = Session::new();
        let id = session.id.clone();
        self.store.insert(session);
        tracing::info!(session = %id, "created empty session");
        id
    }

    /// Create a session from its first source.
    pub async fn upload(&self, input: SourceInput) -> RagResult<UploadOutcome> {
        let (source, entries) = self.prepare(input).await?;
        let info = SourceInfo::from(&source);
        let chunk_count = entries.len();

        let mut session = Session::new();
        session.add_source(source, entries)?;
        let (scope, combined) = summary_input(&session);
        let summary = self.summarize(&session.id, scope, &combined).await;
        session.summary = Some(summary.clone());

        let session_id = session.id.clone();
        self.store.insert(session);
        tracing::info!(session = %session_id, chunks = chunk_count, "created session from upload");

        Ok(UploadOutcome {
            session_id,
            summary,
            source: info,
            chunk_count,
        })
    }

    /// Add a source to an existing session and refresh its summary.
    pub async fn add_context(&self, session_id: &str, input: SourceInput) -> RagResult<AddOutcome> {
        // Fail fast before paying for extraction and embeddings.
        let handle = self.store.get(session_id)?;

        let (source, entries) = self.prepare(input).await?;
        let info = SourceInfo::from(&source);
        let preview = prompt::preview(&describe(&source), &source.text, source.page_count);
        let chunk_count = entries.len();

        let (scope, combined, source_count) = {
            let mut session = handle.lock().await;
            session.add_source(source, entries)?;
            tracing::info!(
                session = %session_id,
                sources = session.sources.len(),
                chunks = session.index.len(),
                "added context"
            );
            let (scope, combined) = summary_input(&session);
            (scope, combined, session.sources.len())
        };

        // The model call runs unlocked. A source added meanwhile brings its
        // own, newer summary, which this one must not overwrite.
        let summary = self.summarize(session_id, scope, &combined).await;
        {
            let mut session = handle.lock().await;
            if session.sources.len() == source_count {
                session.summary = Some(summary.clone());
            }
        }

        Ok(AddOutcome {
            session_id: session_id.to_string(),
            summary,
            source: info,
            preview,
            chunk_count,
        })
    }

    pub async fn ask(&self, session_id: &str, question: &str) -> RagResult<Answer> {
        let handle = self.store.get(session_id)?;
        self.composer.answer(&handle, question).await
    }

    pub async fn search_web(&self, question: &str) -> RagResult<Answer> {
        self.composer.web_answer(question).await
    }

    pub async fn summary(&self, session_id: &str) -> RagResult<Option<String>> {
        let handle = self.store.get(session_id)?;
        let session = handle.lock().await;
        Ok(session.summary.clone())
    }

    pub async fn info(&self, session_id: &str) -> RagResult<SessionInfo> {
        let handle = self.store.get(session_id)?;
        let session = handle.lock().await;
        Ok(SessionInfo {
            session_id: session.id.clone(),
            created_at: session.created_at,
            source_count: session.sources.len(),
            sources: session.sources.iter().map(SourceInfo::from).collect(),
            total_characters: session.total_characters(),
            chunk_count: session.index.len(),
            turn_count: session.history.len(),
            summary: session.summary.clone(),
        })
    }

    pub async fn history(&self, session_id: &str) -> RagResult<Vec<ChatTurn>> {
        let handle = self.store.get(session_id)?;
        let session = handle.lock().await;
        Ok(session.history.clone())
    }

    /// All sessions, oldest first.
    pub async fn list(&self) -> Vec<SessionListing> {
        let mut listings = Vec::new();
        for handle in self.store.all() {
            let session = handle.lock().await;
            listings.push(SessionListing {
                session_id: session.id.clone(),
                created_at: session.created_at,
                source_count: session.sources.len(),
                turn_count: session.history.len(),
                has_summary: session.summary.is_some(),
            });
        }
        listings.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        listings
    }

    pub fn delete(&self, session_id: &str) -> RagResult<()> {
        self.store.remove(session_id)?;
        tracing::info!(session = %session_id, "deleted session");
        Ok(())
    }

    /// Extract, chunk, and embed a source without touching any session.
    async fn prepare(&self, input: SourceInput) -> RagResult<(Source, Vec<IndexedChunk>)> {
        let source = self.ingestor.ingest(input).await?;
        let chunks = chunk_text(&source.id, &source.text, self.chunk_params);
        let entries = embed_chunks(self.embedder.as_ref(), chunks, self.batch_size).await?;
        Ok((source, entries))
    }

    /// Summary of a session's combined text. Failures become the summary
    /// text instead of an error.
    async fn summarize(&self, session_id: &str, scope: SummaryScope, combined: &str) -> String {
        let Some(request) = prompt::summary_prompt(scope, combined) else {
            return prompt::local_summary(combined);
        };

        match self.generator.generate(GenerationRequest::text(request)).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(session = %session_id, error = %e, "summary generation failed");
                format!("Could not generate summary: {}", e)
            }
        }
    }
}

/// What to summarize: the scope and the combined text of every source.
fn summary_input(session: &Session) -> (SummaryScope, String) {
    let scope = match session.sources.as_slice() {
        [only] => SummaryScope::Single(only.kind),
        _ => SummaryScope::Mixed,
    };
    (scope, session.combined_text())
}
