//! Sentence-aware, overlapping text chunker.
//!
//! Splits cleaned document text into [`ChunkPiece`]s of at most
//! `chunk_size` characters for retrieval indexing. Consecutive chunks share
//! roughly `overlap` characters so a sentence cut at one boundary still
//! appears whole in a neighbouring chunk.
//!
//! # Algorithm
//!
//! 1. Take the window `[start, start + chunk_size)`.
//! 2. If the window stops short of the end of the text and its last `.`,
//!    `!` or `?` lies past the middle of the window, end the chunk right
//!    after that mark.
//! 3. Emit the trimmed chunk (blank chunks are dropped) with the next index.
//! 4. Stop if the chunk reached the end of the text; otherwise advance by
//!    `chunk length - overlap`, or by [`MIN_FORCED_ADVANCE`] characters
//!    (capped at the chunk length) when that would not move forward.
//!
//! Offsets are counted in Unicode scalar values, never bytes, so multibyte
//! text is never split inside a character.
//!
//! # Example
//!
//! ```rust
//! use archive_core::chunk::split;
//!
//! let pieces = split("Short notice of hearing.", 1000, 200);
//! assert_eq!(pieces.len(), 1);
//! assert_eq!(pieces[0].index, 0);
//! ```

use sha2::{Digest, Sha256};

use crate::models::{ChunkPiece, DocumentChunk, DocumentType};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_OVERLAP: usize = 200;

/// Minimum advance applied when `overlap` would stall the splitter.
pub const MIN_FORCED_ADVANCE: usize = 100;

const SENTENCE_ENDS: [char; 3] = ['.', '!', '?'];

/// Split `text` into overlapping chunks. Pure and deterministic.
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Vec<ChunkPiece> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let chunk_size = chunk_size.max(1);

    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut index: i64 = 0;

    while start < len {
        let window_end = (start + chunk_size).min(len);
        let mut end = window_end;

        if window_end < len {
            let window = &chars[start..window_end];
            if let Some(pos) = window.iter().rposition(|c| SENTENCE_ENDS.contains(c)) {
                if pos as f64 > window.len() as f64 * 0.5 {
                    end = start + pos + 1;
                }
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            pieces.push(ChunkPiece {
                index,
                text: trimmed.to_string(),
                start,
                end,
            });
            index += 1;
        }

        if end >= len {
            break;
        }

        let chunk_len = end - start;
        let advance = if chunk_len > overlap {
            chunk_len - overlap
        } else {
            MIN_FORCED_ADVANCE.min(chunk_len)
        };
        start += advance.max(1);
    }

    pieces
}

/// Attach storage identity and a SHA-256 content hash to a split piece.
pub fn to_document_chunk(
    document_type: DocumentType,
    document_id: i64,
    piece: &ChunkPiece,
    metadata: serde_json::Value,
) -> DocumentChunk {
    DocumentChunk {
        document_type,
        document_id,
        chunk_index: piece.index,
        chunk_text: piece.text.clone(),
        hash: content_hash(&piece.text),
        metadata,
    }
}

/// Lowercase hex SHA-256 of a chunk's text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
