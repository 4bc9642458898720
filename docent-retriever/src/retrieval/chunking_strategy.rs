use crate::error::Result;
use docent_context::{
    DEFAULT_SEPARATORS, DocumentChunk, RawSegment, TextSplitter, separators_for_path,
};
use std::path::Path;

/// Configuration for chunking documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum size of each chunk in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            chunk_overlap: 20,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }
}

/// Strategy for chunking documents - delegates splitting to docent-context
#[derive(Debug, Clone)]
pub struct ChunkingStrategy {
    config: ChunkingConfig,
    plain: TextSplitter,
    markdown: TextSplitter,
}

impl ChunkingStrategy {
    /// Create a new chunking strategy; fails on an impossible size/overlap pair.
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        let plain = TextSplitter::new(config.chunk_size, config.chunk_overlap, DEFAULT_SEPARATORS)?;
        let markdown = TextSplitter::new(
            config.chunk_size,
            config.chunk_overlap,
            separators_for_path(Path::new("doc.md")),
        )?;
        Ok(Self {
            config,
            plain,
            markdown,
        })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Chunk segments in order, picking separators by source file type.
    ///
    /// A file's segments are contiguous in loader output, so each run is
    /// chunked in one call and keeps a single chunk index sequence.
    pub fn chunk_segments(&self, segments: &[RawSegment]) -> Vec<DocumentChunk> {
        let mut chunks = Vec::new();
        for run in segments.chunk_by(|a, b| a.source_path == b.source_path) {
            let splitter = self.splitter_for(Path::new(&run[0].source_path));
            chunks.extend(splitter.split_segments(run));
        }

        tracing::debug!(
            "Chunked {} segments into {} chunks (size: {}, overlap: {})",
            segments.len(),
            chunks.len(),
            self.config.chunk_size,
            self.config.chunk_overlap
        );
        chunks
    }

    fn splitter_for(&self, path: &Path) -> &TextSplitter {
        if separators_for_path(path) == DEFAULT_SEPARATORS {
            &self.plain
        } else {
            &self.markdown
        }
    }
}
