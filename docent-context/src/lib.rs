pub mod splitter;

// Re-export the splitter types used by loaders and indexers
pub use splitter::{
    ChunkMetadata, DEFAULT_SEPARATORS, DocumentChunk, MARKDOWN_SEPARATORS, RawSegment,
    SplitterError, TextSplitter, reassemble, separators_for_path,
};
