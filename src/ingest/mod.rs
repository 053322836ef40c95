//! Offline ingestion: documents -> chunks -> embeddings -> persisted corpus
//!
//! Chunks and their embeddings are appended to the corpus together, batch by
//! batch, so the index and metadata can never drift apart even when some
//! files fail to extract.

mod chunker;
mod extract;

pub use chunker::{Chunk, ChunkError, Chunker};
pub use extract::{docx_xml_to_text, DocumentKind, SystemExtractor, TextExtractor};

use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::error::{LexragError, Result};
use crate::storage::{Corpus, IndexFiles};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A file that was recognized but contributed no chunks
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub file_name: String,
    pub reason: String,
}

/// Summary of one ingestion run
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Directory entries examined
    pub files_seen: usize,
    /// Files that produced at least one chunk
    pub files_indexed: usize,
    /// Entries with an unrecognized type
    pub files_skipped: usize,
    /// Recognized files whose extraction failed or was empty
    pub failures: Vec<FileFailure>,
    /// Total chunks embedded and stored
    pub chunks: usize,
    pub duration_ms: u64,
}

/// Result of [`IngestPipeline::ingest`]
#[derive(Debug)]
pub enum IngestOutcome {
    /// Artifacts written
    Indexed(IngestReport),
    /// The folder yielded no chunks; nothing was written
    NoContent(IngestReport),
}

impl IngestOutcome {
    pub fn report(&self) -> &IngestReport {
        match self {
            Self::Indexed(report) | Self::NoContent(report) => report,
        }
    }
}

/// Composes extraction, chunking, embedding and storage
pub struct IngestPipeline {
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Chunker,
    batch_size: usize,
}

impl IngestPipeline {
    /// Create a new ingestion pipeline
    ///
    /// # Arguments
    /// * `extractor` - Converts PDF/DOCX files to text
    /// * `embedder` - Embedding provider used for every chunk
    /// * `chunker` - Window policy
    /// * `batch_size` - Number of chunks embedded per call
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunker: Chunker,
        batch_size: usize,
    ) -> Self {
        Self {
            extractor,
            embedder,
            chunker,
            batch_size: batch_size.max(1),
        }
    }

    /// Build the corpus for `folder` and persist it to `files`
    pub fn ingest(&self, folder: &Path, files: &IndexFiles) -> Result<IngestOutcome> {
        let (corpus, report) = self.build(folder)?;

        match corpus {
            Some(mut corpus) => {
                files.save(&mut corpus)?;
                Ok(IngestOutcome::Indexed(report))
            }
            None => {
                warn!(
                    "No content found in {}; index not written",
                    folder.display()
                );
                Ok(IngestOutcome::NoContent(report))
            }
        }
    }

    /// Build the corpus in memory; `None` when no chunks were produced
    pub fn build(&self, folder: &Path) -> Result<(Option<Corpus>, IngestReport)> {
        let start = Instant::now();
        let mut report = IngestReport::default();

        info!("Scanning folder: {}", folder.display());
        let chunks = self.collect_chunks(folder, &mut report)?;

        if chunks.is_empty() {
            report.duration_ms = start.elapsed().as_millis() as u64;
            return Ok((None, report));
        }

        info!("Embedding {} chunks", chunks.len());
        let corpus = self.embed_chunks(chunks)?;
        report.chunks = corpus.len();
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Ingestion complete: {} files indexed, {} skipped, {} failed, {} chunks, {}ms",
            report.files_indexed,
            report.files_skipped,
            report.failures.len(),
            report.chunks,
            report.duration_ms
        );

        Ok((Some(corpus), report))
    }

    fn collect_chunks(&self, folder: &Path, report: &mut IngestReport) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();

        for path in list_files(folder)? {
            report.files_seen += 1;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let Some(kind) = DocumentKind::from_path(&path) else {
                debug!("Skipping unrecognized file: {}", file_name);
                report.files_skipped += 1;
                continue;
            };

            info!("Reading {}: {}", kind.as_str(), file_name);
            let text = match self.extractor.extract(&path, kind) {
                Ok(text) => text,
                Err(e) => {
                    warn!("{} read error: {}: {:#}", kind.as_str(), file_name, e);
                    report.failures.push(FileFailure {
                        file_name,
                        reason: format!("{:#}", e),
                    });
                    continue;
                }
            };

            let document_id = blake3::hash(text.as_bytes()).to_hex().to_string();
            let document_chunks = self.chunker.chunk(&document_id, &file_name, &text);
            if document_chunks.is_empty() {
                warn!("No text extracted from {}", file_name);
                report.failures.push(FileFailure {
                    file_name,
                    reason: "no text extracted".to_string(),
                });
                continue;
            }

            debug!("{} produced {} chunks", file_name, document_chunks.len());
            report.files_indexed += 1;
            chunks.extend(document_chunks);
        }

        Ok(chunks)
    }

    fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Corpus> {
        let mut corpus = Corpus::new(self.embedder.model_name(), self.embedder.dimension());
        let total = chunks.len();
        let mut remaining = chunks.into_iter();

        loop {
            let batch: Vec<Chunk> = remaining.by_ref().take(self.batch_size).collect();
            if batch.is_empty() {
                break;
            }

            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts)?;
            if embeddings.len() != batch.len() {
                return Err(LexragError::Embedding(EmbeddingError::GenerationError(
                    format!(
                        "Embedding count mismatch: expected {}, got {}",
                        batch.len(),
                        embeddings.len()
                    ),
                )));
            }

            for (chunk, embedding) in batch.into_iter().zip(embeddings.iter()) {
                corpus.append(chunk, embedding)?;
            }
            debug!("Embedded {}/{} chunks", corpus.len(), total);
        }

        Ok(corpus)
    }
}

/// Regular files directly inside `folder`, sorted by name
fn list_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(folder).map_err(|e| LexragError::Io {
        source: e,
        context: format!("Failed to read documents folder: {}", folder.display()),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| LexragError::Io {
            source: e,
            context: format!("Failed to list documents folder: {}", folder.display()),
        })?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Reads files as UTF-8; files whose content starts with "FAIL" error out
    struct PlainTextExtractor;

    impl TextExtractor for PlainTextExtractor {
        fn extract(&self, path: &Path, _kind: DocumentKind) -> anyhow::Result<String> {
            let text = std::fs::read_to_string(path)?;
            if text.starts_with("FAIL") {
                bail!("simulated extraction failure");
            }
            Ok(text)
        }
    }

    /// Embeds a text as [char count, first byte, batch call number]
    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    impl EmbeddingProvider for CountingEmbedder {
        fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            Ok(vec![text.chars().count() as f32, text.as_bytes()[0] as f32, 0.0])
        }

        fn embed_batch(
            &self,
            texts: &[String],
        ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as f32;
            Ok(texts
                .iter()
                .map(|t| vec![t.chars().count() as f32, t.as_bytes()[0] as f32, call])
                .collect())
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    fn pipeline(batch_size: usize) -> (IngestPipeline, Arc<CountingEmbedder>) {
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let pipeline = IngestPipeline::new(
            Arc::new(PlainTextExtractor),
            embedder.clone(),
            Chunker::new(10, 2).unwrap(),
            batch_size,
        );
        (pipeline, embedder)
    }

    #[test]
    fn test_build_mixed_folder() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.pdf"), "abcdefghijklmnopqrst").unwrap();
        std::fs::write(temp.path().join("b.docx"), "zyxwvu").unwrap();
        std::fs::write(temp.path().join("c.pdf"), "FAIL this one").unwrap();
        std::fs::write(temp.path().join("d.pdf"), "   ").unwrap();
        std::fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let (pipeline, embedder) = pipeline(2);
        let (corpus, report) = pipeline.build(temp.path()).unwrap();
        let corpus = corpus.unwrap();

        assert_eq!(report.files_seen, 5);
        assert_eq!(report.files_indexed, 2);
        assert_eq!(report.files_skipped, 1);
        let failed: Vec<&str> = report
            .failures
            .iter()
            .map(|f| f.file_name.as_str())
            .collect();
        assert_eq!(failed, vec!["c.pdf", "d.pdf"]);

        // a.pdf: starts 0, 8, 16 -> 3 chunks; b.docx: 1 chunk
        assert_eq!(report.chunks, 4);
        assert_eq!(corpus.len(), 4);
        assert_eq!(corpus.metadata().len(), 4);

        // Batches of 2 -> 2 embed calls
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);

        let expected = [
            ("a.pdf", 0, "abcdefghij"),
            ("a.pdf", 1, "ijklmnopqr"),
            ("a.pdf", 2, "qrst"),
            ("b.docx", 0, "zyxwvu"),
        ];
        for (i, (source, ordinal, text)) in expected.iter().enumerate() {
            let record = corpus.record(i).unwrap();
            assert_eq!(record.source_name, *source);
            assert_eq!(record.ordinal, *ordinal);
            assert_eq!(record.text, *text);

            let vector = corpus.index().get(i).unwrap();
            assert_eq!(vector[0], text.chars().count() as f32);
            assert_eq!(vector[1], text.as_bytes()[0] as f32);
        }
    }

    #[test]
    fn test_document_id_stable_per_document() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.pdf"), "abcdefghijklmnopqrst").unwrap();

        let (pipeline, _) = pipeline(8);
        let (corpus, _) = pipeline.build(temp.path()).unwrap();
        let corpus = corpus.unwrap();

        let ids: Vec<&str> = corpus
            .metadata()
            .records()
            .iter()
            .map(|r| r.document_id.as_str())
            .collect();
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(
            ids[0],
            blake3::hash(b"abcdefghijklmnopqrst").to_hex().as_str()
        );
    }

    #[test]
    fn test_empty_folder_writes_nothing() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("readme.md"), "not a document").unwrap();
        let files = IndexFiles::new(temp.path().join("index.lxvi"), temp.path().join("meta.json"));

        let (pipeline, _) = pipeline(4);
        let outcome = pipeline.ingest(temp.path(), &files).unwrap();

        assert!(matches!(outcome, IngestOutcome::NoContent(_)));
        assert_eq!(outcome.report().chunks, 0);
        assert!(!files.index_path.exists());
        assert!(!files.metadata_path.exists());
    }

    #[test]
    fn test_missing_folder_is_error() {
        let temp = TempDir::new().unwrap();
        let (pipeline, _) = pipeline(4);
        assert!(pipeline.build(&temp.path().join("absent")).is_err());
    }
}
