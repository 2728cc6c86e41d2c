//! Fixed-window text chunker and text normalization helpers.
//!
//! Splits cleaned document text into overlapping windows of `chunk_size`
//! characters. Consecutive windows start `chunk_size - overlap` characters
//! apart, so each window shares `overlap` characters with its predecessor.
//!
//! All positions are **character** offsets, never byte offsets, so
//! multi-byte UTF-8 text is never split inside a code point.
//!
//! # Algorithm
//!
//! 1. Compute the stride `step = chunk_size - overlap` (must be > 0).
//! 2. For `start = 0, step, 2·step, …` while `start < len`, take
//!    `text[start .. min(start + chunk_size, len)]`.
//! 3. Drop windows whose trimmed text is [`MIN_CHUNK_CHARS`] characters or
//!    shorter (typically the tail end of the document).
//! 4. Number the surviving windows `0..N` and attach the page they start on
//!    (from `[Page N]` markers) and a SHA-256 content hash.
//!
//! # Example
//!
//! ```rust
//! use rag_relay_core::text::chunk_text;
//!
//! let text = "All work and no play makes Jack a dull boy. ".repeat(20);
//! let chunks = chunk_text(&text, 200, 50).unwrap();
//! assert_eq!(chunks[0].start, 0);
//! assert_eq!(chunks[1].start, 150);
//! ```

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};

/// Approximate characters-per-token ratio used for all token estimates.
pub const CHARS_PER_TOKEN: usize = 4;

/// Windows with this many trimmed characters or fewer are discarded.
pub const MIN_CHUNK_CHARS: usize = 50;

const PAGE_MARKER_PREFIX: &str = "[Page ";

/// One window of document text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// Position among the kept chunks, contiguous from 0.
    pub index: usize,
    pub text: String,
    /// Character offset of the first character.
    pub start: usize,
    /// Character offset one past the last character.
    pub end: usize,
    /// Page the window starts on, if the text carries page markers.
    pub page: Option<u32>,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// Split `text` into overlapping fixed-size windows.
///
/// # Errors
///
/// Returns an error when `chunk_size` is 0 or `overlap >= chunk_size`.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<TextChunk>> {
    if chunk_size == 0 {
        bail!("chunk_size must be > 0");
    }
    if overlap >= chunk_size {
        bail!(
            "overlap ({}) must be smaller than chunk_size ({})",
            overlap,
            chunk_size
        );
    }
    let step = chunk_size - overlap;

    // Byte offset of every char, plus the end of the string.
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = offsets.len() - 1;
    let markers = page_markers(text);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < char_len {
        let end = start.saturating_add(chunk_size).min(char_len);
        let window = &text[offsets[start]..offsets[end]];

        if window.trim().chars().count() > MIN_CHUNK_CHARS {
            chunks.push(TextChunk {
                index: chunks.len(),
                text: window.to_string(),
                start,
                end,
                page: page_at(&markers, start),
                hash: content_hash(window),
            });
        }

        start = start.saturating_add(step);
    }

    Ok(chunks)
}

/// Normalize extracted text.
///
/// Collapses every whitespace run to a single space, removes control
/// characters (code points below 32 other than `\n` and `\t`) and trims
/// the result.
pub fn clean_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .chars()
        .filter(|c| (*c as u32) >= 32 || *c == '\n' || *c == '\t')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Rough token count: one token per [`CHARS_PER_TOKEN`] characters, at least 1.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() / CHARS_PER_TOKEN).max(1)
}

/// SHA-256 of `text`, hex encoded.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Render the marker that extraction places at the top of each page.
pub fn page_marker(page: u32) -> String {
    format!("{}{}]", PAGE_MARKER_PREFIX, page)
}

/// Locate `[Page N]` markers, returning `(char_offset, page)` pairs in
/// document order. Malformed markers are ignored.
pub fn page_markers(text: &str) -> Vec<(usize, u32)> {
    let mut markers = Vec::new();
    let mut chars_before = 0;
    let mut last_byte = 0;

    for (byte_pos, _) in text.match_indices(PAGE_MARKER_PREFIX) {
        chars_before += text[last_byte..byte_pos].chars().count();
        last_byte = byte_pos;

        let rest = &text[byte_pos + PAGE_MARKER_PREFIX.len()..];
        let Some(close) = rest.find(']') else {
            continue;
        };
        if let Ok(page) = rest[..close].parse::<u32>() {
            markers.push((chars_before, page));
        }
    }

    markers
}

fn page_at(markers: &[(usize, u32)], offset: usize) -> Option<u32> {
    markers
        .iter()
        .take_while(|(pos, _)| *pos <= offset)
        .last()
        .map(|(_, page)| *page)
}
