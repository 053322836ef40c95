//! Query-time retrieval: embed the question, search the index, join metadata

use crate::embedding::{EmbeddingError, EmbeddingProvider, VectorIndexError};
use crate::service::{Resource, ServiceContext};
use crate::storage::Corpus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Retrieval resources not loaded: {missing:?}")]
    ResourcesUnavailable { missing: Vec<Resource> },

    #[error("Query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector search failed: {0}")]
    Search(#[from] VectorIndexError),
}

/// A chunk returned for a query, most relevant first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub text: String,
    /// Source file name, or `doc_{ordinal}` when the record has none
    pub source: String,
    /// Index ordinal of the chunk
    pub ordinal: usize,
    /// Chunk position within its document
    pub chunk_ordinal: usize,
    /// Squared Euclidean distance to the query
    pub distance: f32,
}

/// Nearest-neighbour retriever over a loaded corpus
pub struct Retriever<'a> {
    embedder: &'a dyn EmbeddingProvider,
    corpus: &'a Corpus,
}

impl<'a> Retriever<'a> {
    pub fn new(embedder: &'a dyn EmbeddingProvider, corpus: &'a Corpus) -> Self {
        Self { embedder, corpus }
    }

    /// Borrow the loaded resources of a service context
    pub fn from_context(context: &'a ServiceContext) -> Result<Self, RetrievalError> {
        let resources = context
            .resources()
            .map_err(|missing| RetrievalError::ResourcesUnavailable { missing })?;
        Ok(Self::new(resources.embedder, resources.corpus))
    }

    /// Retrieve up to `k` passages ordered by ascending distance
    ///
    /// An empty corpus is a valid state and yields an empty result.
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        if self.corpus.is_empty() {
            tracing::warn!("Vector index is empty. No search performed.");
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query)?;
        let neighbors = self.corpus.index().search(&query_embedding, k)?;
        let metadata = self.corpus.metadata();

        let passages: Vec<RetrievedPassage> = neighbors
            .into_iter()
            .filter_map(|neighbor| {
                // Guard against any index/metadata disagreement
                let Some(record) = metadata.get(neighbor.ordinal) else {
                    tracing::warn!(
                        "Discarding ordinal {} outside metadata ({} records)",
                        neighbor.ordinal,
                        metadata.len()
                    );
                    return None;
                };
                Some(RetrievedPassage {
                    text: record.text.clone(),
                    source: metadata.source_label(neighbor.ordinal),
                    ordinal: neighbor.ordinal,
                    chunk_ordinal: record.ordinal,
                    distance: neighbor.distance,
                })
            })
            .collect();

        tracing::info!("Found {} top chunks", passages.len());
        Ok(passages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::Chunk;

    /// Maps a handful of keywords onto axes
    struct KeywordEmbedder;

    impl EmbeddingProvider for KeywordEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if text.is_empty() {
                return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
            }
            let text = text.to_lowercase();
            Ok(["lease", "appeal", "contract"]
                .iter()
                .map(|word| if text.contains(word) { 1.0 } else { 0.0 })
                .collect())
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "keywords"
        }
    }

    fn corpus() -> Corpus {
        let embedder = KeywordEmbedder;
        let mut corpus = Corpus::new("keywords", 3);
        let docs = [
            ("lease.pdf", 0, "The lease term is five years."),
            ("appeal.docx", 0, "The appeal was dismissed."),
            ("", 4, "A contract requires consideration."),
        ];
        for (source, ordinal, text) in docs {
            let vector = embedder.embed(text).unwrap();
            corpus
                .append(
                    Chunk {
                        document_id: "d".to_string(),
                        source_name: source.to_string(),
                        ordinal,
                        text: text.to_string(),
                    },
                    &vector,
                )
                .unwrap();
        }
        corpus
    }

    #[test]
    fn test_retrieve_ranks_by_distance() {
        let corpus = corpus();
        let embedder = KeywordEmbedder;
        let retriever = Retriever::new(&embedder, &corpus);

        let passages = retriever.retrieve("When does the appeal deadline run?", 2).unwrap();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].source, "appeal.docx");
        assert_eq!(passages[0].distance, 0.0);
        assert!(passages[0].distance <= passages[1].distance);
    }

    #[test]
    fn test_missing_source_falls_back() {
        let corpus = corpus();
        let embedder = KeywordEmbedder;
        let retriever = Retriever::new(&embedder, &corpus);

        let passages = retriever.retrieve("contract formation", 1).unwrap();
        assert_eq!(passages[0].source, "doc_2");
        assert_eq!(passages[0].ordinal, 2);
        assert_eq!(passages[0].chunk_ordinal, 4);
    }

    #[test]
    fn test_k_clamped_to_corpus() {
        let corpus = corpus();
        let embedder = KeywordEmbedder;
        let retriever = Retriever::new(&embedder, &corpus);

        assert_eq!(retriever.retrieve("lease", 50).unwrap().len(), 3);
    }

    #[test]
    fn test_empty_corpus_returns_nothing() {
        let corpus = Corpus::new("keywords", 3);
        let embedder = KeywordEmbedder;
        let retriever = Retriever::new(&embedder, &corpus);

        assert!(retriever.retrieve("anything", 5).unwrap().is_empty());
    }

    #[test]
    fn test_unloaded_context_is_unavailable() {
        let context = ServiceContext::from_parts(None, None, None);
        assert!(matches!(
            Retriever::from_context(&context),
            Err(RetrievalError::ResourcesUnavailable { .. })
        ));
    }

    #[test]
    fn test_embedding_failure_propagates() {
        let corpus = corpus();
        let embedder = KeywordEmbedder;
        let retriever = Retriever::new(&embedder, &corpus);

        assert!(matches!(
            retriever.retrieve("", 3),
            Err(RetrievalError::Embedding(_))
        ));
    }
}
