//! Vector utilities for the retrieval index.
//!
//! Pure helpers for encoding embedding vectors on disk and ranking indexed
//! chunks against a query vector. Computing embeddings is the job of an
//! embedding [`Backend`](crate::service::Backend).

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::models::{DocumentChunk, ScoredChunk};

/// Encode a float vector as little-endian f32 bytes.
///
/// ```rust
/// use wallo_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob).unwrap(), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode bytes produced by [`vec_to_blob`].
///
/// A length that is not a multiple of four means the bytes were damaged.
pub fn blob_to_vec(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(Error::IndexCorrupted(format!(
            "embedding blob of {} bytes is not a whole number of f32 values",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty, zero or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Rank `chunks` by cosine similarity to `query_vec` and keep the top `k`.
///
/// Ordered by descending score; equal scores fall back to ascending
/// `chunk_id` so results are reproducible. `k <= 0` is rejected.
pub fn rank_chunks<'a, I>(query_vec: &[f32], chunks: I, k: i64) -> Result<Vec<ScoredChunk>>
where
    I: IntoIterator<Item = &'a DocumentChunk>,
{
    if k <= 0 {
        return Err(Error::InvalidArgument(format!("k must be >= 1, got {}", k)));
    }

    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .map(|chunk| ScoredChunk {
            score: cosine_similarity(query_vec, &chunk.embedding),
            chunk: chunk.clone(),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
    });
    scored.truncate(k as usize);

    Ok(scored)
}
