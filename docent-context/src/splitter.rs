//! Recursive, overlap-aware text splitting for retrieval.
//!
//! Documents are cut into chunks that are small enough to embed while keeping
//! sentences and paragraphs together whenever possible. The splitter works in
//! two passes:
//!
//! 1. **Recursive segmentation**: the text is split on the most significant
//!    separator first (paragraphs). Only pieces that are still longer than
//!    `chunk_size` are split again with the next, finer separator (lines,
//!    sentence endings, spaces), and finally per character. Separators are
//!    kept as pieces of their own, so the pieces always concatenate back to
//!    the original text.
//! 2. **Merging**: pieces are packed greedily into chunks of at most
//!    `chunk_size` characters. When a chunk is closed, its trailing pieces
//!    (up to `chunk_overlap` characters) are repeated at the start of the next
//!    chunk so that context crossing a boundary is retrievable from both sides.
//!
//! Lengths are measured in characters, not bytes.
//!
//! ```
//! use docent_context::splitter::TextSplitter;
//!
//! let splitter = TextSplitter::with_defaults(200, 20).unwrap();
//! let spans = splitter.split_text("Cats are mammals. Cats purr.");
//! assert_eq!(spans.len(), 1);
//! ```
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::ops::Range;
use std::path::Path;

/// Separators tried in priority order: paragraph, line, sentence end, space.
///
/// Text that is still too long after the last separator is split per character.
pub const DEFAULT_SEPARATORS: &[&str] = &[
    r"\n\n",     // Paragraphs
    r"\n",       // Line breaks
    r"[.!?]\s+", // Sentence endings
    r" ",        // Spaces
];

/// Markdown documents additionally break on headings and code fences first.
pub const MARKDOWN_SEPARATORS: &[&str] = &[
    r"(?m)^#{1,6} ", // Headings
    r"```",          // Code block fences
    r"\n\n",
    r"\n",
    r"[.!?]\s+",
    r" ",
];

/// Pick separators suited to the file type.
///
/// ```
/// use std::path::Path;
/// use docent_context::splitter::{separators_for_path, MARKDOWN_SEPARATORS};
///
/// assert_eq!(separators_for_path(Path::new("notes/readme.md")), MARKDOWN_SEPARATORS);
/// ```
pub fn separators_for_path(path: &Path) -> &'static [&'static str] {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("md") | Some("markdown") => MARKDOWN_SEPARATORS,
        _ => DEFAULT_SEPARATORS,
    }
}

/// Errors raised while configuring a [`TextSplitter`].
#[derive(Debug, thiserror::Error)]
pub enum SplitterError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    InvalidOverlap { overlap: usize, chunk_size: usize },

    #[error("invalid separator pattern {pattern:?}: {source}")]
    InvalidSeparator {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A unit of raw text produced by a document loader, before chunking.
///
/// Plain text files yield one segment; paginated documents may yield one
/// segment per page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSegment {
    pub text: String,
    /// Containing directory of the source file relative to the corpus root, `/`-joined.
    pub category: String,
    pub filename: String,
    pub source_path: String,
    /// 1-based page number when the segment is a single page.
    pub page: Option<usize>,
}

/// Provenance of a [`DocumentChunk`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub category: String,
    pub filename: String,
    pub source_path: String,
    /// Position of the chunk among all chunks of its source file.
    pub chunk_index: usize,
    pub page: Option<usize>,
    /// Byte offset of the chunk inside its segment text.
    pub start_offset: usize,
}

/// A bounded span of document text; the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Splits text into overlapping windows using content-aware separators.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    separators: Vec<Regex>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// Creates a splitter from separator regex patterns, most significant first.
    pub fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        separator_patterns: &[&str],
    ) -> Result<Self, SplitterError> {
        if chunk_size == 0 {
            return Err(SplitterError::ZeroChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(SplitterError::InvalidOverlap {
                overlap: chunk_overlap,
                chunk_size,
            });
        }

        let separators = separator_patterns
            .iter()
            .map(|&pattern| {
                Regex::new(pattern).map_err(|source| SplitterError::InvalidSeparator {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            separators,
            chunk_size,
            chunk_overlap,
        })
    }

    /// Creates a splitter using [`DEFAULT_SEPARATORS`].
    pub fn with_defaults(chunk_size: usize, chunk_overlap: usize) -> Result<Self, SplitterError> {
        Self::new(chunk_size, chunk_overlap, DEFAULT_SEPARATORS)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits `text` into chunk byte ranges, in document order.
    ///
    /// Consecutive ranges overlap by at most `chunk_overlap` characters. Every
    /// range spans at most `chunk_size` characters.
    pub fn split_text(&self, text: &str) -> Vec<Range<usize>> {
        let pieces = self.split_recursively_into_pieces(text, 0, 0);
        self.merge_pieces(text, pieces)
    }

    /// Chunks every segment and stamps each chunk with its provenance.
    ///
    /// `chunk_index` counts per source file across all of its segments, so a
    /// paginated document gets one contiguous index sequence. Whitespace-only
    /// chunks are dropped.
    pub fn split_segments(&self, segments: &[RawSegment]) -> Vec<DocumentChunk> {
        let mut next_index: HashMap<&str, usize> = HashMap::new();
        let mut chunks = Vec::new();

        for segment in segments {
            for range in self.split_text(&segment.text) {
                let text = &segment.text[range.clone()];
                if text.trim().is_empty() {
                    continue;
                }

                let counter = next_index.entry(segment.source_path.as_str()).or_insert(0);
                chunks.push(DocumentChunk {
                    text: text.to_string(),
                    metadata: ChunkMetadata {
                        category: segment.category.clone(),
                        filename: segment.filename.clone(),
                        source_path: segment.source_path.clone(),
                        chunk_index: *counter,
                        page: segment.page,
                        start_offset: range.start,
                    },
                });
                *counter += 1;
            }
        }

        chunks
    }

    // Returns contiguous byte ranges covering all of `text`. Each range is either
    // short enough to fit in a chunk, a separator match, or a per-character cut.
    fn split_recursively_into_pieces(
        &self,
        text: &str,
        separator_idx: usize,
        current_offset: usize,
    ) -> Vec<Range<usize>> {
        let mut pieces = Vec::new();

        if text.is_empty() {
            return pieces;
        }

        if char_len(text) <= self.chunk_size {
            pieces.push(current_offset..current_offset + text.len());
            return pieces;
        }

        // Out of separators: cut on character boundaries.
        if separator_idx >= self.separators.len() {
            let mut piece_start = 0;
            let mut chars_in_piece = 0;
            for (byte_idx, _) in text.char_indices() {
                if chars_in_piece == self.chunk_size {
                    pieces.push(current_offset + piece_start..current_offset + byte_idx);
                    piece_start = byte_idx;
                    chars_in_piece = 0;
                }
                chars_in_piece += 1;
            }
            pieces.push(current_offset + piece_start..current_offset + text.len());
            return pieces;
        }

        let separator = &self.separators[separator_idx];
        let mut local_start = 0;

        for mat in separator.find_iter(text) {
            if mat.start() == mat.end() {
                continue;
            }
            if mat.start() > local_start {
                pieces.extend(self.split_recursively_into_pieces(
                    &text[local_start..mat.start()],
                    separator_idx + 1,
                    current_offset + local_start,
                ));
            }
            if char_len(mat.as_str()) > self.chunk_size {
                pieces.extend(self.split_recursively_into_pieces(
                    mat.as_str(),
                    separator_idx + 1,
                    current_offset + mat.start(),
                ));
            } else {
                pieces.push(current_offset + mat.start()..current_offset + mat.end());
            }
            local_start = mat.end();
        }

        if local_start < text.len() {
            pieces.extend(self.split_recursively_into_pieces(
                &text[local_start..],
                separator_idx + 1,
                current_offset + local_start,
            ));
        }

        pieces
    }

    fn merge_pieces(&self, text: &str, pieces: Vec<Range<usize>>) -> Vec<Range<usize>> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut window_len = 0;

        for piece in pieces {
            let piece_len = char_len(&text[piece.clone()]);

            if window_len + piece_len > self.chunk_size && !window.is_empty() {
                chunks.push(window_range(&window));

                // Keep the tail of the closed chunk as overlap, as long as it
                // still leaves room for the incoming piece.
                while window_len > self.chunk_overlap
                    || (window_len + piece_len > self.chunk_size && window_len > 0)
                {
                    if let Some((_, len)) = window.pop_front() {
                        window_len -= len;
                    }
                }
            }

            window.push_back((piece, piece_len));
            window_len += piece_len;
        }

        if !window.is_empty() {
            chunks.push(window_range(&window));
        }

        chunks
    }
}

/// Rebuilds the original segment text from its chunks by dropping the overlap.
///
/// Chunks must belong to one segment and be in order. Every byte covered by
/// the chunks is emitted once.
pub fn reassemble(chunks: &[DocumentChunk]) -> String {
    let mut text = String::new();
    let mut covered_to = 0;

    for chunk in chunks {
        let start = chunk.metadata.start_offset;
        let end = start + chunk.text.len();
        if end <= covered_to {
            continue;
        }
        let skip = covered_to.saturating_sub(start);
        text.push_str(&chunk.text[skip..]);
        covered_to = end;
    }

    text
}

fn window_range(window: &VecDeque<(Range<usize>, usize)>) -> Range<usize> {
    let start = window.front().map(|(r, _)| r.start).unwrap_or(0);
    let end = window.back().map(|(r, _)| r.end).unwrap_or(start);
    start..end
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
