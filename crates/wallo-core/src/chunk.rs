//! Fixed-window text chunker with overlap.
//!
//! Splits extracted document text into overlapping windows suitable for
//! embedding. Sizes are measured in **characters** (Unicode scalar values),
//! so a window never ends inside a multi-byte code point. Reported
//! `offset_range`s are byte offsets into the input, so `&text[range]` is
//! always the chunk text.
//!
//! # Algorithm
//!
//! 1. Reject `target_size == 0` and `overlap >= target_size` (no progress).
//! 2. Emit `[start, start + target_size)` clamped to the text length.
//! 3. Advance `start` by `target_size - overlap` until a window reaches the end.
//!
//! For a text of `L` characters with `L > target_size` this yields exactly
//! `ceil((L - overlap) / (target_size - overlap))` chunks; shorter non-empty
//! texts yield one chunk and empty text yields none.
//!
//! # Example
//!
//! ```rust
//! use wallo_core::chunk::chunk_text;
//!
//! let spans = chunk_text("abcdefghij", 4, 1).unwrap();
//! let texts: Vec<&str> = spans.iter().map(|s| s.text.as_str()).collect();
//! assert_eq!(texts, ["abcd", "defg", "ghij"]);
//! ```

use std::ops::Range;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::DocumentChunk;

/// One window of a chunked text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    /// Byte range within the chunked text.
    pub offset_range: Range<usize>,
    pub text: String,
}

/// Split `text` into windows of `target_size` characters sharing `overlap`
/// characters with their predecessor. The final window may be shorter.
pub fn chunk_text(text: &str, target_size: usize, overlap: usize) -> Result<Vec<TextSpan>> {
    if target_size == 0 {
        return Err(Error::InvalidArgument(
            "chunk target_size must be > 0".to_string(),
        ));
    }
    if overlap >= target_size {
        return Err(Error::InvalidArgument(format!(
            "chunk overlap ({}) must be smaller than target_size ({})",
            overlap, target_size
        )));
    }
    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every char boundary, including the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = bounds.len() - 1;
    let step = target_size - overlap;

    let mut spans = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + target_size).min(total_chars);
        let range = bounds[start]..bounds[end];
        spans.push(TextSpan {
            text: text[range.clone()].to_string(),
            offset_range: range,
        });
        if end == total_chars {
            break;
        }
        start += step;
    }

    Ok(spans)
}

/// Rebuild the original text from in-order spans, dropping overlap regions.
pub fn reassemble(spans: &[TextSpan]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for span in spans {
        if span.offset_range.end <= covered {
            continue;
        }
        let skip = covered.saturating_sub(span.offset_range.start);
        out.push_str(&span.text[skip..]);
        covered = span.offset_range.end;
    }
    out
}

/// Deterministic chunk id: a short digest of the source path plus the
/// zero-padded chunk index, so ids sort by source and then by position.
pub fn chunk_id(source_path: &str, index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}-{:06}", &digest[..16], index)
}

/// Chunk a source's text into [`DocumentChunk`]s with empty embeddings.
pub fn chunk_source(
    source_path: &str,
    text: &str,
    target_size: usize,
    overlap: usize,
) -> Result<Vec<DocumentChunk>> {
    Ok(chunk_text(text, target_size, overlap)?
        .into_iter()
        .enumerate()
        .map(|(i, span)| DocumentChunk {
            chunk_id: chunk_id(source_path, i),
            source_path: source_path.to_string(),
            offset_range: span.offset_range,
            text: span.text,
            embedding: Vec::new(),
        })
        .collect())
}
