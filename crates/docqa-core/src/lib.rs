//! # docqa core
//!
//! Pure logic shared by the docqa service: data models, the overlapping
//! chunker, the vector index abstraction with its in-memory
//! implementation, and the prompt protocol used by the answer composer.
//!
//! This crate contains no tokio, HTTP, or filesystem I/O.

pub mod chunk;
pub mod index;
pub mod models;
pub mod prompt;
pub mod similarity;
