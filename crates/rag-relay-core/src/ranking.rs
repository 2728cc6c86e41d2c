//! Post-processing of vector index matches.
//!
//! The retrieval pipeline deduplicates first and ranks second:
//!
//! 1. [`deduplicate_chunks`] keeps the first chunk seen for each
//!    `(doc_id, chunk_index)` pair.
//! 2. [`rank_chunks`] sorts by score, highest first. Chunks without a score
//!    rank as if they scored `0.0`. The sort is stable, so ties keep their
//!    index order.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::RetrievedChunk;

/// Sort chunks by descending score.
pub fn rank_chunks(mut chunks: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
    chunks.sort_by(|a, b| {
        let sa = a.score.unwrap_or(0.0);
        let sb = b.score.unwrap_or(0.0);
        sb.partial_cmp(&sa).unwrap_or(Ordering::Equal)
    });
    chunks
}

/// Drop chunks whose `(doc_id, chunk_index)` was already seen.
pub fn deduplicate_chunks(chunks: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
    let mut seen: HashSet<(String, u32)> = HashSet::new();
    chunks
        .into_iter()
        .filter(|c| seen.insert((c.doc_id.clone(), c.chunk_index)))
        .collect()
}
