//! Question answering over a session, with web fallback.
//!
//! ```text
//!   retrieve top-k ──▶ empty? ───────────────yes──┐
//!        │ no                                     ▼
//!        ▼                                   web search
//!   document prompt ──▶ not found? ──yes──▶  results? ──no──▶ general knowledge (none)
//!        │ no                                     │ yes
//!        ▼                                        ▼
//!   answer (document)                        web prompt (web)
//! ```
//!
//! A failed generation call fails the turn. A failed search fails the turn
//! unless `answer.model_knowledge_on_search_error` is set, in which case
//! the model answers from general knowledge and a notice is attached.
//! Only successful turns are appended to the session history.

use std::sync::Arc;

use chrono::Utc;
use docqa_core::models::{AnswerSource, ChatTurn, SourceKind, WebSnippet};
use docqa_core::prompt::{self, ContextPassage, NotFoundDetection, StructuredAnswer};
use serde::Serialize;

use crate::config::Config;
use crate::embedding::{embed_query, Embedder};
use crate::error::{RagError, RagResult};
use crate::generation::{GenerationRequest, Generator};
use crate::retrieve::{search_session, RetrievedChunk};
use crate::session::{Session, SessionHandle};
use crate::web_search::WebSearcher;

/// Characters of chunk text shown in a citation.
const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct AnswerSettings {
    pub top_k: usize,
    pub detection: NotFoundDetection,
    pub structured_output: bool,
    pub model_knowledge_on_search_error: bool,
}

impl AnswerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            detection: config.answer.not_found_detection,
            structured_output: config.answer.structured_output,
            model_knowledge_on_search_error: config.answer.model_knowledge_on_search_error,
        }
    }
}

/// A document passage an answer was grounded in.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub source_name: String,
    pub source_kind: SourceKind,
    pub chunk_index: usize,
    pub score: f32,
    pub excerpt: String,
}

impl From<&RetrievedChunk> for Citation {
    fn from(r: &RetrievedChunk) -> Self {
        let mut excerpt: String = r.chunk.text.chars().take(EXCERPT_CHARS).collect();
        if r.chunk.text.chars().count() > EXCERPT_CHARS {
            excerpt.push_str("...");
        }
        Self {
            source_name: r.source_name.clone(),
            source_kind: r.source_kind,
            chunk_index: r.chunk.index,
            score: r.score,
            excerpt,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
    /// Document passages, set when `source` is `document`.
    pub citations: Vec<Citation>,
    /// Search hits, set when `source` is `web`.
    pub web_results: Vec<WebSnippet>,
    /// The document path was skipped or rejected.
    pub fell_back: bool,
    /// The documents were consulted and did not contain the answer.
    pub not_found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

pub struct AnswerComposer {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    searcher: Arc<dyn WebSearcher>,
    settings: AnswerSettings,
}

impl AnswerComposer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        searcher: Arc<dyn WebSearcher>,
        settings: AnswerSettings,
    ) -> Self {
        Self {
            embedder,
            generator,
            searcher,
            settings,
        }
    }

    /// Answer `question` from the session behind `handle`, falling back to
    /// the web, and record the turn.
    ///
    /// The session lock is taken only to read the index and to append the
    /// turn; embedding, search, and generation run unlocked, so other
    /// readers of the session are never stuck behind a model call.
    pub async fn answer(&self, handle: &SessionHandle, question: &str) -> RagResult<Answer> {
        let question = validate_question(question)?;

        let retrieved = self.retrieve(handle, question).await?;

        let mut not_found = false;
        if !retrieved.is_empty() {
            let (text, insufficient) = self.document_answer(&retrieved, question).await?;
            if !insufficient {
                let answer = Answer {
                    text,
                    source: AnswerSource::Document,
                    citations: retrieved.iter().map(Citation::from).collect(),
                    web_results: Vec::new(),
                    fell_back: false,
                    not_found: false,
                    notice: None,
                };
                record(&mut *handle.lock().await, question, &answer);
                return Ok(answer);
            }
            not_found = true;
            tracing::info!("documents lack the answer, searching the web");
        }

        let mut answer = self.web_answer(question).await?;
        answer.fell_back = true;
        answer.not_found = not_found;
        record(&mut *handle.lock().await, question, &answer);
        Ok(answer)
    }

    async fn retrieve(
        &self,
        handle: &SessionHandle,
        question: &str,
    ) -> RagResult<Vec<RetrievedChunk>> {
        let k = self.settings.top_k;
        if k == 0 || handle.lock().await.index.is_empty() {
            return Ok(Vec::new());
        }
        let query = embed_query(self.embedder.as_ref(), question).await?;
        let session = handle.lock().await;
        Ok(search_session(&session, &query, k))
    }

    /// Answer from live web search alone (no session involved).
    pub async fn web_answer(&self, question: &str) -> RagResult<Answer> {
        let question = validate_question(question)?;

        let (snippets, notice) = match self.searcher.search(question).await {
            Ok(snippets) if !snippets.is_empty() => (snippets, None),
            Ok(_) => (
                Vec::new(),
                Some("No web results found; answered from general knowledge.".to_string()),
            ),
            Err(e) if self.settings.model_knowledge_on_search_error => {
                tracing::warn!(error = %e, "web search failed, using general knowledge");
                (
                    Vec::new(),
                    Some(format!(
                        "Web search unavailable ({}); answered from general knowledge.",
                        e
                    )),
                )
            }
            Err(e) => return Err(e),
        };

        if snippets.is_empty() {
            let text = self
                .generator
                .generate(GenerationRequest::text(prompt::general_prompt(question)))
                .await?;
            return Ok(Answer {
                text: text.trim().to_string(),
                source: AnswerSource::None,
                citations: Vec::new(),
                web_results: Vec::new(),
                fell_back: true,
                not_found: false,
                notice,
            });
        }

        let text = self
            .generator
            .generate(GenerationRequest::text(prompt::web_prompt(&snippets, question)))
            .await?;

        Ok(Answer {
            text: text.trim().to_string(),
            source: AnswerSource::Web,
            citations: Vec::new(),
            web_results: snippets,
            fell_back: true,
            not_found: false,
            notice: None,
        })
    }

    /// Returns the answer text and whether it signals missing context.
    async fn document_answer(
        &self,
        retrieved: &[RetrievedChunk],
        question: &str,
    ) -> RagResult<(String, bool)> {
        let passages: Vec<ContextPassage<'_>> = retrieved
            .iter()
            .map(|r| ContextPassage {
                source_name: &r.source_name,
                text: &r.chunk.text,
            })
            .collect();

        let structured =
            self.settings.structured_output && self.generator.supports_structured_output();
        let mut request =
            GenerationRequest::text(prompt::document_prompt(&passages, question, structured));
        if structured {
            request = request.with_schema(prompt::structured_answer_schema());
        }

        let raw = self.generator.generate(request).await?;

        if structured {
            match prompt::parse_structured_answer(&raw) {
                Some(StructuredAnswer {
                    answer,
                    found_in_context,
                }) => return Ok((answer.trim().to_string(), !found_in_context)),
                None => tracing::warn!("structured answer did not parse, using phrase detection"),
            }
        }

        let insufficient = prompt::is_not_found(&raw, self.settings.detection);
        Ok((raw.trim().to_string(), insufficient))
    }
}

fn validate_question(question: &str) -> RagResult<&str> {
    let q = question.trim();
    if q.is_empty() {
        return Err(RagError::InvalidInput("question must not be empty".to_string()));
    }
    Ok(q)
}

fn record(session: &mut Session, question: &str, answer: &Answer) {
    session.history.push(ChatTurn {
        question: question.to_string(),
        answer: answer.text.clone(),
        source: answer.source,
        asked_at: Utc::now(),
    });
    tracing::info!(
        session = %session.id,
        source = answer.source.as_str(),
        fell_back = answer.fell_back,
        turns = session.history.len(),
        "answered question"
    );
}
