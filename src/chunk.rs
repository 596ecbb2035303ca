//! Bounded, overlapping text chunker.
//!
//! Splits document body text into [`Chunk`]s no longer than a configurable
//! character budget. Splitting occurs on paragraph boundaries (`\n\n`) to
//! preserve semantic coherence; a configurable overlap carries the tail of
//! each chunk into the head of the next so retrieval does not lose context
//! at chunk seams.
//!
//! Each chunk receives a UUID, its order index, and a SHA-256 hash of its
//! text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Split text into chunks of roughly `chunk_size` characters with `overlap`
/// characters of carry-over between neighbors. Returns chunks with
/// contiguous indices starting at 0.
///
/// The budget check runs before the carried tail is prepended, so a flushed
/// chunk can reach `chunk_size + overlap + 2` characters (tail plus the
/// paragraph separator). Hard-split pieces of an oversized paragraph never
/// exceed `chunk_size`.
pub fn chunk_text(document_id: &str, text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    assert!(overlap < chunk_size, "overlap must be smaller than chunk_size");

    if text.trim().is_empty() {
        return vec![make_chunk(document_id, 0, text.trim())];
    }

    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut index: i64 = 0;

    let mut flush = |buf: &mut String, index: &mut i64, chunks: &mut Vec<Chunk>| {
        if buf.is_empty() {
            return;
        }
        chunks.push(make_chunk(document_id, *index, buf));
        *index += 1;
        let tail = overlap_tail(buf, overlap);
        buf.clear();
        buf.push_str(&tail);
    };

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if buf.is_empty() {
            trimmed.len()
        } else {
            buf.len() + 2 + trimmed.len() // +2 for the \n\n separator
        };

        if would_be > chunk_size && !buf.is_empty() {
            flush(&mut buf, &mut index, &mut chunks);
        }

        if trimmed.len() > chunk_size {
            // A single paragraph over budget: hard-split at newline/space
            // boundaries, stepping by chunk_size - overlap.
            flush(&mut buf, &mut index, &mut chunks);
            buf.clear();

            let mut remaining = trimmed;
            while !remaining.is_empty() {
                if remaining.len() <= chunk_size {
                    buf.push_str(remaining);
                    break;
                }
                let limit = floor_char_boundary(remaining, chunk_size);
                let split_at = remaining[..limit]
                    .rfind('\n')
                    .or_else(|| remaining[..limit].rfind(' '))
                    .map(|pos| pos + 1)
                    .unwrap_or(limit);
                let piece = remaining[..split_at].trim();
                chunks.push(make_chunk(document_id, index, piece));
                index += 1;

                let step = split_at.saturating_sub(overlap).max(1);
                let resume = ceil_char_boundary(remaining, step);
                remaining = remaining[resume..].trim_start();
            }
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(trimmed);
        }
    }

    if !buf.trim().is_empty() {
        chunks.push(make_chunk(document_id, index, buf.trim()));
    }

    if chunks.is_empty() {
        chunks.push(make_chunk(document_id, 0, text.trim()));
    }

    chunks
}

/// Last `overlap` characters of `text`, snapped to a char boundary.
fn overlap_tail(text: &str, overlap: usize) -> String {
    if overlap == 0 || text.len() <= overlap {
        return if overlap == 0 { String::new() } else { text.to_string() };
    }
    let start = ceil_char_boundary(text, text.len() - overlap);
    text[start..].to_string()
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_text("doc1", "Hello, world!", 1000, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn multiple_paragraphs_under_limit_stay_together() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text("doc1", text, 1000, 100);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("First paragraph."));
        assert!(chunks[0].text.contains("Third paragraph."));
    }

    #[test]
    fn chunk_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {} with a bit of padding text.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text("doc1", &text, 120, 20);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn chunks_respect_size_budget() {
        let text = (0..40)
            .map(|i| format!("Sentence {} of the running example document.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        // Budget plus carried overlap and the paragraph separator.
        for c in chunk_text("doc1", &text, 100, 10) {
            assert!(c.text.len() <= 112, "chunk too long: {}", c.text.len());
        }
    }

    #[test]
    fn neighbors_share_overlap() {
        let a = "alpha ".repeat(40);
        let b = "omega ".repeat(40);
        let text = format!("{}\n\n{}", a.trim(), b.trim());
        let chunks = chunk_text("doc1", &text, 250, 30);
        assert!(chunks.len() >= 2);
        let first_tail = overlap_tail(&chunks[0].text, 30);
        assert!(
            chunks[1].text.starts_with(first_tail.trim_start()),
            "second chunk should start with the first chunk's tail"
        );
    }

    #[test]
    fn oversized_paragraph_is_hard_split() {
        let text = "word ".repeat(200);
        let chunks = chunk_text("doc1", text.trim(), 100, 10);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn deterministic_text_and_hash() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = chunk_text("doc1", text, 12, 4);
        let c2 = chunk_text("doc1", text, 12, 4);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
            assert_eq!(a.chunk_index, b.chunk_index);
        }
    }

    #[test]
    fn multibyte_input_never_splits_a_char() {
        let text = "héllo wörld ".repeat(50);
        let chunks = chunk_text("doc1", text.trim(), 64, 8);
        // Reaching here without a panic means slicing stayed on boundaries.
        assert!(!chunks.is_empty());
    }
}
