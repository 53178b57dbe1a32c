//! # docqa
//!
//! Retrieval-augmented question answering over uploaded documents, with
//! live web search when the documents do not contain the answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐
//! │   Ingestor   │──▶│ Chunk+Embed  │──▶│ Session index │
//! │ PDF/img/URL  │   │              │   │  (in memory)  │
//! └──────────────┘   └──────────────┘   └───────┬───────┘
//!                                               │ top-k
//!                                               ▼
//!                    ┌──────────────┐   ┌───────────────┐
//!                    │  Web search  │◀──│   Composer    │
//!                    │  (fallback)  │   │  (generator)  │
//!                    └──────────────┘   └───────┬───────┘
//!                                     ┌─────────┴────────┐
//!                                     ▼                  ▼
//!                                ┌─────────┐       ┌──────────┐
//!                                │   CLI   │       │   HTTP   │
//!                                └─────────┘       └──────────┘
//! ```
//!
//! Pure pieces (chunking, the vector index, prompt templates) live in the
//! `docqa-core` crate; this crate adds I/O, providers, and the front-ends.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and credentials |
//! | [`error`] | Error taxonomy |
//! | [`extract`] | File type detection, PDF text |
//! | [`fetch`] | Web page download and text extraction |
//! | [`ingest`] | Inputs → sources |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Text generation providers |
//! | [`web_search`] | Web search providers |
//! | [`retrieve`] | Embedding write path and top-k retrieval |
//! | [`answer`] | Document answer with web fallback |
//! | [`session`] | Sessions and the session store |
//! | [`assistant`] | Façade used by CLI and server |
//! | [`server`] | HTTP API |
//! | [`chat`] | Terminal front-end |

pub mod answer;
pub mod assistant;
pub mod chat;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod generation;
mod http;
pub mod ingest;
pub mod logging;
pub mod retrieve;
pub mod server;
pub mod session;
pub mod web_search;
