//! Overlapping fixed-window text chunker.
//!
//! Splits document units into [`Chunk`]s of at most `chunk_size` characters.
//! Consecutive chunks of the same unit share exactly `chunk_overlap`
//! characters at their boundary; only the final chunk may be shorter.
//! Sizes are counted in Unicode scalar values, so multi-byte text is never
//! split inside a character.
//!
//! Each chunk receives a random UUID plus a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ChunkingError;
use crate::models::{Chunk, DocumentUnit, META_CHUNK_INDEX};

/// Validate a `(chunk_size, chunk_overlap)` pair: both positive, overlap
/// strictly smaller than size.
pub fn validate_params(chunk_size: usize, chunk_overlap: usize) -> Result<(), ChunkingError> {
    if chunk_overlap == 0 || chunk_overlap >= chunk_size {
        return Err(ChunkingError::InvalidParameters {
            size: chunk_size,
            overlap: chunk_overlap,
        });
    }
    Ok(())
}

/// Split a single text into overlapping windows.
///
/// Blank text yields no windows. Text no longer than `chunk_size` yields
/// exactly one window containing the whole text.
pub fn split_text(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    validate_params(chunk_size, chunk_overlap)?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let step = chunk_size - chunk_overlap;

    // Byte offsets are found by walking chars from each window start.
    let mut pieces = Vec::new();
    let mut start = 0usize;
    loop {
        let rest = &text[start..];
        let end = rest
            .char_indices()
            .nth(chunk_size)
            .map_or(text.len(), |(i, _)| start + i);
        pieces.push(text[start..end].to_string());
        if end == text.len() {
            break;
        }
        start += rest
            .char_indices()
            .nth(step)
            .map_or(rest.len(), |(i, _)| i);
    }

    Ok(pieces)
}

/// Split document units into chunks, preserving source order and then
/// intra-document order.
pub fn split_documents(
    units: &[DocumentUnit],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>, ChunkingError> {
    validate_params(chunk_size, chunk_overlap)?;

    let mut chunks = Vec::new();
    for unit in units {
        for (index, piece) in split_text(&unit.content, chunk_size, chunk_overlap)?
            .into_iter()
            .enumerate()
        {
            chunks.push(make_chunk(unit, index, piece));
        }
    }
    Ok(chunks)
}

fn make_chunk(unit: &DocumentUnit, index: usize, content: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let mut metadata = unit.metadata.clone();
    metadata.insert(META_CHUNK_INDEX.to_string(), index.to_string());

    Chunk {
        id: Uuid::new_v4().to_string(),
        content,
        source_path: unit.source_path.clone(),
        metadata,
        chunk_index: index,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exact_overlap(text: &str, size: usize, overlap: usize) {
        let pieces = split_text(text, size, overlap).unwrap();
        for pair in pieces.windows(2) {
            let prev: Vec<char> = pair[0].chars().collect();
            let next: Vec<char> = pair[1].chars().collect();
            assert_eq!(prev.len(), size, "only the final chunk may be short");
            let tail: String = prev[prev.len() - overlap..].iter().collect();
            let head: String = next[..overlap.min(next.len())].iter().collect();
            assert_eq!(tail, head, "size={} overlap={}", size, overlap);
        }
        let last = pieces.last().unwrap();
        assert!(last.chars().count() <= size);
        assert!(text.ends_with(last.as_str()));
    }

    #[test]
    fn test_small_text_single_chunk() {
        let pieces = split_text("Hello, world!", 100, 10).unwrap();
        assert_eq!(pieces, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_blank_text_no_chunks() {
        assert!(split_text("", 10, 2).unwrap().is_empty());
        assert!(split_text("  \n\t ", 10, 2).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert_eq!(
            split_text("abc", 0, 0).unwrap_err(),
            ChunkingError::InvalidParameters { size: 0, overlap: 0 }
        );
        assert!(split_text("abc", 5, 5).is_err());
        assert!(split_text("abc", 5, 9).is_err());
        assert_eq!(
            split_text("abc", 5, 0).unwrap_err(),
            ChunkingError::InvalidParameters { size: 5, overlap: 0 }
        );
    }

    #[test]
    fn test_overlap_is_exact_for_many_params() {
        let text = (0..200)
            .map(|i| format!("word{} ", i))
            .collect::<String>();
        for (size, overlap) in [(10, 1), (10, 9), (37, 5), (100, 30), (64, 1), (2, 1)] {
            assert_exact_overlap(&text, size, overlap);
        }
    }

    #[test]
    fn test_known_windows() {
        let pieces = split_text("abcdefghij", 4, 1).unwrap();
        assert_eq!(pieces, vec!["abcd", "defg", "ghij"]);

        let pieces = split_text("abcdefghijk", 4, 2).unwrap();
        assert_eq!(pieces, vec!["abcd", "cdef", "efgh", "ghij", "ijk"]);
    }

    #[test]
    fn test_multibyte_text_splits_on_char_boundaries() {
        let text = "收入增长了百分之十。".repeat(5);
        assert_exact_overlap(&text, 7, 3);
    }

    #[test]
    fn test_documents_keep_order_and_provenance() {
        let units = vec![
            DocumentUnit::new("a".repeat(25), "one.txt", 0),
            DocumentUnit::new("b".repeat(5), "two.txt", 0),
        ];
        let chunks = split_documents(&units, 10, 2).unwrap();
        assert_eq!(chunks.len(), 4);
        for (i, c) in chunks[..3].iter().enumerate() {
            assert_eq!(c.source_path.to_str().unwrap(), "one.txt");
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.metadata.get(META_CHUNK_INDEX).unwrap(), &i.to_string());
            assert_eq!(c.metadata.get("source").unwrap(), "one.txt");
        }
        assert_eq!(chunks[3].source_path.to_str().unwrap(), "two.txt");
        assert_eq!(chunks[3].chunk_index, 0);
    }

    #[test]
    fn test_window_ending_exactly_at_text_end() {
        let pieces = split_text("abcdefg", 4, 1).unwrap();
        assert_eq!(pieces, vec!["abcd", "defg"]);

        let text = "é".repeat(9);
        let pieces = split_text(&text, 5, 1).unwrap();
        assert_eq!(pieces, vec!["é".repeat(5), "é".repeat(5)]);
    }

    #[test]
    fn test_hash_deterministic() {
        let units = vec![DocumentUnit::new("Alpha Beta Gamma Delta", "x.md", 0)];
        let c1 = split_documents(&units, 8, 3).unwrap();
        let c2 = split_documents(&units, 8, 3).unwrap();
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.content, b.content);
            assert_eq!(a.hash, b.hash);
            assert_ne!(a.id, b.id);
        }
    }
}
