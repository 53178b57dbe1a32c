//! Overlapping fixed-size text chunker.
//!
//! Splits a source's extracted text into [`Chunk`]s of at most
//! `chunk_size` characters, where each chunk repeats the last `overlap`
//! characters of its predecessor so that a sentence cut at a boundary is
//! still seen whole by at least one chunk.
//!
//! # Algorithm
//!
//! 1. Work in characters, not bytes, so multi-byte text never splits inside
//!    a code point and sizes match what a user would count.
//! 2. If the text fits in one chunk, return it unchanged as a single chunk.
//! 3. Otherwise take a window of `chunk_size` characters from the current
//!    start and cut it at the last `\n\n`, then `\n`, then space inside the
//!    window. A separator is only used if the cut lies beyond
//!    `start + overlap`, so the next chunk always advances; otherwise the
//!    window is cut hard at `chunk_size`.
//! 4. The next chunk starts `overlap` characters before the cut.
//!
//! Chunks cover the input without gaps and nothing is trimmed, so
//! [`reconstruct`] gives back the exact input.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::{chunk_text, reconstruct, ChunkParams};
//!
//! let params = ChunkParams { chunk_size: 16, overlap: 4 };
//! let text = "The sky is blue because of Rayleigh scattering.";
//! let chunks = chunk_text("src-1", text, params);
//! assert!(chunks.len() > 1);
//! assert_eq!(reconstruct(&chunks), text);
//! ```

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Default maximum chunk length, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default number of characters shared by consecutive chunks.
pub const DEFAULT_OVERLAP: usize = 200;

/// Preferred break points, strongest first.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// Chunk size and overlap, both measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkParams {
    /// Rejects parameters under which the chunker could not make progress.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.overlap >= self.chunk_size {
            bail!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.overlap,
                self.chunk_size
            );
        }
        Ok(())
    }
}

/// Split `text` into overlapping chunks.
///
/// # Guarantees
///
/// - Deterministic: the same input and params give the same chunks,
///   including chunk IDs.
/// - Every chunk has at most `chunk_size` characters.
/// - Chunk `i + 1` begins with the last `overlap` characters of chunk `i`.
/// - Text with at most `chunk_size` characters (including empty text)
///   yields exactly one chunk equal to the input.
///
/// Params that fail [`ChunkParams::validate`] are clamped rather than
/// rejected: a zero size is treated as 1 and the overlap is capped at
/// `chunk_size - 1`.
pub fn chunk_text(source_id: &str, text: &str, params: ChunkParams) -> Vec<Chunk> {
    let size = params.chunk_size.max(1);
    let overlap = params.overlap.min(size - 1);

    // Byte offset of every character, followed by the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = bounds.len() - 1;

    if total <= size {
        return vec![make_chunk(source_id, 0, text, 0, 0)];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut shared = 0;

    loop {
        let hard_end = (start + size).min(total);
        let end = if hard_end == total {
            total
        } else {
            find_break(text, &bounds, start, start + overlap + 1, hard_end).unwrap_or(hard_end)
        };

        let piece = &text[bounds[start]..bounds[end]];
        chunks.push(make_chunk(source_id, chunks.len(), piece, start, shared));

        if end == total {
            break;
        }
        start = end - overlap;
        shared = overlap;
    }

    chunks
}

/// Rebuild the original text from a chunk sequence by dropping the
/// overlapping prefix of every chunk.
pub fn reconstruct(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    for chunk in chunks {
        out.extend(chunk.text.chars().skip(chunk.overlap));
    }
    out
}

/// Find the strongest separator whose end lies in `[min_end, max_end]`,
/// returned as a character position.
fn find_break(
    text: &str,
    bounds: &[usize],
    start: usize,
    min_end: usize,
    max_end: usize,
) -> Option<usize> {
    let window_start = bounds[start];
    let window = &text[window_start..bounds[max_end]];

    for sep in SEPARATORS {
        // rfind gives the last match; any earlier match is further left,
        // so one check per separator is enough.
        if let Some(pos) = window.rfind(sep) {
            let end_byte = window_start + pos + sep.len();
            if let Ok(end) = bounds.binary_search(&end_byte) {
                if end >= min_end {
                    return Some(end);
                }
            }
        }
    }
    None
}

fn make_chunk(source_id: &str, index: usize, text: &str, start: usize, overlap: usize) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let id = Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}:{}", source_id, index).as_bytes(),
    );

    Chunk {
        id: id.to_string(),
        source_id: source_id.to_string(),
        index,
        text: text.to_string(),
        start,
        overlap,
        hash,
    }
}
