//! Context assembly and citation building for answer synthesis.
//!
//! [`assemble_context`] packs retrieved chunks into a single prompt section
//! under a token budget. Chunks are considered in retrieval order; a chunk
//! that would overflow the budget is skipped, and later (possibly smaller)
//! chunks are still tried.

use crate::models::{Citation, RetrievedChunk};
use crate::text::estimate_tokens;

/// Default token budget for the assembled context.
pub const DEFAULT_CONTEXT_BUDGET_TOKENS: usize = 2000;

/// Characters of chunk text carried in a citation preview.
pub const CITATION_PREVIEW_CHARS: usize = 100;

const PART_SEPARATOR: &str = "\n\n---\n\n";

/// Join chunks into one context block, each headed by its source line.
///
/// ```rust
/// use rag_relay_core::context::assemble_context;
/// # use rag_relay_core::models::RetrievedChunk;
/// # let chunk = RetrievedChunk {
/// #     id: "c1".into(), text: "Rust has no GC.".into(), doc_id: "d1".into(),
/// #     source_url: "gs://docs/d1/rust.pdf".into(), page: Some(2), chunk_index: 0,
/// #     score: Some(0.9), metadata: Default::default(),
/// # };
/// let context = assemble_context(&[chunk], 2000);
/// assert_eq!(context, "[Source: gs://docs/d1/rust.pdf (page 2)]\nRust has no GC.");
/// ```
pub fn assemble_context(chunks: &[RetrievedChunk], budget_tokens: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut used = 0usize;

    for chunk in chunks {
        let tokens = estimate_tokens(&chunk.text);
        if used + tokens > budget_tokens {
            continue;
        }
        parts.push(format!("{}\n{}", source_line(chunk), chunk.text));
        used += tokens;
    }

    parts.join(PART_SEPARATOR)
}

fn source_line(chunk: &RetrievedChunk) -> String {
    match chunk.page {
        Some(page) if page > 0 => format!("[Source: {} (page {})]", chunk.source_url, page),
        _ => format!("[Source: {}]", chunk.source_url),
    }
}

/// One citation per retrieved chunk, in retrieval order.
pub fn build_citations(chunks: &[RetrievedChunk]) -> Vec<Citation> {
    chunks
        .iter()
        .map(|chunk| Citation {
            chunk_id: chunk.id.clone(),
            doc_id: chunk.doc_id.clone(),
            source_url: chunk.source_url.clone(),
            page: chunk.page,
            text_preview: Some(chunk.text.chars().take(CITATION_PREVIEW_CHARS).collect()),
        })
        .collect()
}
