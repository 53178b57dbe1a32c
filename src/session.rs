//! Sessions and the session store.
//!
//! A [`Session`] owns its sources, its own vector index, and its chat
//! history. Handles are `Arc<tokio::sync::Mutex<Session>>`. Every mutation
//! holds the session's lock; question turns lock only to search the index
//! and to append the turn, never across a model call. Different sessions
//! never contend.
//!
//! The store is a trait so it can be replaced; [`InMemorySessionStore`]
//! keeps everything in process memory and loses it on restart.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use docqa_core::index::memory::InMemoryIndex;
use docqa_core::index::{IndexedChunk, VectorIndex};
use docqa_core::models::{ChatTurn, Source};

use crate::error::{RagError, RagResult};

pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub sources: Vec<Source>,
    pub index: Box<dyn VectorIndex>,
    pub history: Vec<ChatTurn>,
    pub summary: Option<String>,
}

impl Session {
    /// Empty session with a fresh in-memory index.
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            sources: Vec::new(),
            index: Box::new(InMemoryIndex::default()),
            history: Vec::new(),
            summary: None,
        }
    }

    /// Attach an extracted source together with its embedded chunks.
    ///
    /// The index insert happens first; if it fails the session is left
    /// exactly as it was.
    pub fn add_source(&mut self, source: Source, entries: Vec<IndexedChunk>) -> RagResult<()> {
        self.index
            .insert(entries)
            .map_err(|e| RagError::Index(e.to_string()))?;
        self.sources.push(source);
        Ok(())
    }

    pub fn source(&self, id: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn total_characters(&self) -> usize {
        self.sources.iter().map(|s| s.char_count()).sum()
    }

    /// All source texts, separated by a blank line.
    pub fn combined_text(&self) -> String {
        self.sources
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Keyed collection of live sessions.
pub trait SessionStore: Send + Sync {
    /// Store a session and return its shared handle.
    fn insert(&self, session: Session) -> SessionHandle;
    fn get(&self, id: &str) -> RagResult<SessionHandle>;
    fn remove(&self, id: &str) -> RagResult<()>;
    /// Handles of every stored session, in no particular order.
    fn all(&self) -> Vec<SessionHandle>;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn insert(&self, session: Session) -> SessionHandle {
        let id = session.id.clone();
        let handle = Arc::new(tokio::sync::Mutex::new(session));
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, handle.clone());
        handle
    }

    fn get(&self, id: &str) -> RagResult<SessionHandle> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| RagError::SessionNotFound(id.to_string()))
    }

    fn remove(&self, id: &str) -> RagResult<()> {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RagError::SessionNotFound(id.to_string()))
    }

    fn all(&self) -> Vec<SessionHandle> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}
