//! Turns source files into raw text segments.

use super::scanner::{SourceFile, SourceKind};
use crate::error::{Result, RetrieverError};
use crate::retrieval::worker_pool::WorkerPool;
use docent_context::RawSegment;
use futures::{FutureExt, StreamExt};
use std::path::Path;
use tracing::{debug, warn};

/// Outcome of loading a whole corpus.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub segments: Vec<RawSegment>,
    pub loaded_files: usize,
    /// Relative paths of files that failed to load and were left out
    pub skipped_files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentLoader {
    keep_whole_pdf: bool,
    pool: WorkerPool,
}

impl DocumentLoader {
    pub fn new(keep_whole_pdf: bool, load_concurrency: usize) -> Self {
        Self {
            keep_whole_pdf,
            pool: WorkerPool::new(load_concurrency),
        }
    }

    /// Load one file. Files without extractable text yield no segments.
    pub async fn load(&self, file: &SourceFile) -> Result<Vec<RawSegment>> {
        let texts: Vec<(Option<usize>, String)> = match file.kind {
            SourceKind::PlainText => {
                let bytes = tokio::fs::read(&file.absolute_path)
                    .await
                    .map_err(|e| RetrieverError::io(&file.absolute_path, e))?;
                vec![(None, String::from_utf8_lossy(&bytes).into_owned())]
            }
            SourceKind::Pdf => self.extract_pdf(&file.absolute_path).await?,
        };

        let segments: Vec<RawSegment> = texts
            .into_iter()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(page, text)| RawSegment {
                text,
                category: file.category.clone(),
                filename: file.filename().to_string(),
                source_path: file.relative_path.clone(),
                page,
            })
            .collect();

        debug!(
            "Loaded {} segments from {}",
            segments.len(),
            file.relative_path
        );
        Ok(segments)
    }

    async fn extract_pdf(&self, path: &Path) -> Result<Vec<(Option<usize>, String)>> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RetrieverError::io(path, e))?;
        let keep_whole = self.keep_whole_pdf;

        // Extraction is CPU-bound and may panic on malformed input.
        let extracted = tokio::task::spawn_blocking(move || {
            if keep_whole {
                pdf_extract::extract_text_from_mem(&bytes)
                    .map(|text| vec![(None, text)])
                    .map_err(|e| e.to_string())
            } else {
                pdf_extract::extract_text_from_mem_by_pages(&bytes)
                    .map(|pages| {
                        pages
                            .into_iter()
                            .enumerate()
                            .map(|(i, text)| (Some(i + 1), text))
                            .collect()
                    })
                    .map_err(|e| e.to_string())
            }
        })
        .await;

        match extracted {
            Ok(Ok(texts)) => Ok(texts),
            Ok(Err(message)) => Err(RetrieverError::Pdf {
                path: path.to_path_buf(),
                message,
            }),
            Err(join_err) => Err(RetrieverError::Pdf {
                path: path.to_path_buf(),
                message: format!("extractor aborted: {join_err}"),
            }),
        }
    }

    /// Load every file with bounded concurrency. Failed files are logged,
    /// counted and left out; they never fail the whole load.
    pub async fn load_all(&self, files: &[SourceFile]) -> LoadReport {
        let results = self
            .pool
            .stream(files.iter(), |file| async move { (file, self.load(file).await) }.boxed())
            .boxed()
            .collect::<Vec<_>>()
            .await;

        let mut report = LoadReport::default();
        for (file, result) in results {
            match result {
                Ok(segments) => {
                    report.loaded_files += 1;
                    report.segments.extend(segments);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", file.relative_path, e);
                    report.skipped_files.push(file.relative_path.clone());
                }
            }
        }
        report
    }
}
