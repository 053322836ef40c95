//! Process-wide resources shared by query handling

use crate::config::{expand_path, Config};
use crate::embedding::{EmbeddingProvider, FastEmbedProvider, VectorIndex};
use crate::storage::{verify_checksum, Corpus, IndexFiles, MetadataStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// A resource a query needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Embedder,
    VectorIndex,
    MetadataStore,
}

/// Per-resource load state, suitable for a status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub embedder_loaded: bool,
    pub index_loaded: bool,
    pub metadata_loaded: bool,
    pub index_size: usize,
    pub metadata_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub problems: Vec<String>,
}

/// Borrowed view of a fully loaded context
pub struct Resources<'a> {
    pub embedder: &'a dyn EmbeddingProvider,
    pub corpus: &'a Corpus,
}

/// Embedder, index and metadata loaded once and then only read
///
/// Loading never fails as a whole. Each resource that could not be loaded is
/// recorded and reported through [`ServiceContext::readiness`]; query paths
/// refuse to run until all of them are present and consistent.
pub struct ServiceContext {
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    corpus: Option<Corpus>,
    index_size: Option<usize>,
    metadata_count: Option<usize>,
    problems: Vec<String>,
}

impl ServiceContext {
    /// Load every resource named by the config, logging each failure
    pub fn load(config: &Config) -> Self {
        let embedder = match FastEmbedProvider::new(&config.embedding.model) {
            Ok(provider) => {
                info!("Embedding model '{}' loaded", config.embedding.model);
                Some(Arc::new(provider) as Arc<dyn EmbeddingProvider>)
            }
            Err(e) => {
                error!("Failed to load embedding model: {}", e);
                None
            }
        };

        let files = expand_path(&config.corpus.index_path).and_then(|index_path| {
            Ok(IndexFiles::new(
                index_path,
                expand_path(&config.corpus.metadata_path)?,
            ))
        });

        match files {
            Ok(files) => Self::load_with(embedder, &files),
            Err(e) => {
                error!("Cannot resolve index paths: {}", e);
                let mut context = Self::from_parts(embedder, None, None);
                context.problems.push(e.to_string());
                context
            }
        }
    }

    /// Load the persisted corpus next to an already constructed embedder
    pub fn load_with(embedder: Option<Arc<dyn EmbeddingProvider>>, files: &IndexFiles) -> Self {
        let mut problems = Vec::new();

        let loaded = match files.load_index() {
            Ok(loaded) => {
                info!(
                    "Vector index loaded from {} ({} vectors)",
                    files.index_path.display(),
                    loaded.index.len()
                );
                Some(loaded)
            }
            Err(e) => {
                error!("Failed to load vector index: {}", e);
                problems.push(e.to_string());
                None
            }
        };

        let metadata = match files.load_metadata() {
            Ok(metadata) => {
                info!(
                    "Metadata loaded from {} ({} records)",
                    files.metadata_path.display(),
                    metadata.len()
                );
                Some(metadata)
            }
            Err(e) => {
                error!("Failed to load metadata: {}", e);
                problems.push(e.to_string());
                None
            }
        };

        let mut stale = false;
        if let (Some(loaded), Some(metadata)) = (&loaded, &metadata) {
            if let Err(e) = verify_checksum(metadata, &loaded.checksum) {
                error!("Index and metadata were not written together: {}", e);
                problems.push(e.to_string());
                stale = true;
            }
        }

        let mut context = Self::from_parts(embedder, loaded.map(|l| l.index), metadata);
        if stale {
            context.corpus = None;
        }
        context.problems.splice(0..0, problems);
        context
    }

    /// Assemble a context from already loaded parts
    ///
    /// Index and metadata are only usable together when their lengths agree and
    /// the index width matches the embedder.
    pub fn from_parts(
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        index: Option<VectorIndex>,
        metadata: Option<MetadataStore>,
    ) -> Self {
        let mut problems = Vec::new();
        let index_size = index.as_ref().map(VectorIndex::len);
        let metadata_count = metadata.as_ref().map(MetadataStore::len);

        let corpus = match (index, metadata) {
            (Some(index), Some(metadata)) => match Corpus::from_parts(index, metadata) {
                Ok(corpus) => Some(corpus),
                Err(e) => {
                    error!("Index and metadata are inconsistent: {}", e);
                    problems.push(e.to_string());
                    None
                }
            },
            _ => None,
        };

        let corpus = match (&embedder, corpus) {
            (Some(embedder), Some(corpus)) if embedder.dimension() != corpus.dimension() => {
                let message = format!(
                    "Embedder produces {}-dimensional vectors but the index holds {}",
                    embedder.dimension(),
                    corpus.dimension()
                );
                error!("{}", message);
                problems.push(message);
                None
            }
            (Some(embedder), Some(corpus)) => {
                if embedder.model_name() != corpus.model() {
                    warn!(
                        "Index was built with '{}' but queries use '{}'",
                        corpus.model(),
                        embedder.model_name()
                    );
                }
                Some(corpus)
            }
            (_, corpus) => corpus,
        };

        Self {
            embedder,
            corpus,
            index_size,
            metadata_count,
            problems,
        }
    }

    /// Context over an in-memory corpus
    pub fn with_corpus(embedder: Arc<dyn EmbeddingProvider>, corpus: Corpus) -> Self {
        let index_size = Some(corpus.len());
        let metadata_count = Some(corpus.metadata().len());
        Self {
            embedder: Some(embedder),
            corpus: Some(corpus),
            index_size,
            metadata_count,
            problems: Vec::new(),
        }
    }

    /// All resources, or the list of those that are missing
    pub fn resources(&self) -> Result<Resources<'_>, Vec<Resource>> {
        let mut missing = Vec::new();
        if self.embedder.is_none() {
            missing.push(Resource::Embedder);
        }
        if self.corpus.is_none() {
            // An inconsistent pair counts as both missing
            let both = self.index_size.is_some() && self.metadata_count.is_some();
            if both || self.index_size.is_none() {
                missing.push(Resource::VectorIndex);
            }
            if both || self.metadata_count.is_none() {
                missing.push(Resource::MetadataStore);
            }
        }

        match (&self.embedder, &self.corpus) {
            (Some(embedder), Some(corpus)) if missing.is_empty() => Ok(Resources {
                embedder: embedder.as_ref(),
                corpus,
            }),
            _ => Err(missing),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.resources().is_ok()
    }

    pub fn readiness(&self) -> ReadinessReport {
        ReadinessReport {
            ready: self.is_ready(),
            embedder_loaded: self.embedder.is_some(),
            index_loaded: self.index_size.is_some(),
            metadata_loaded: self.metadata_count.is_some(),
            index_size: self.index_size.unwrap_or(0),
            metadata_count: self.metadata_count.unwrap_or(0),
            problems: self.problems.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingError;
    use crate::ingest::Chunk;
    use tempfile::TempDir;

    struct FixedEmbedder(usize);

    impl EmbeddingProvider for FixedEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![0.5; self.0])
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            self.0
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn corpus(dimension: usize, size: usize) -> Corpus {
        let mut corpus = Corpus::new("fixed", dimension);
        for i in 0..size {
            corpus
                .append(
                    Chunk {
                        document_id: "d".to_string(),
                        source_name: "a.pdf".to_string(),
                        ordinal: i,
                        text: format!("chunk {}", i),
                    },
                    &vec![i as f32; dimension],
                )
                .unwrap();
        }
        corpus
    }

    #[test]
    fn test_nothing_loaded() {
        let context = ServiceContext::from_parts(None, None, None);
        let report = context.readiness();
        assert!(!report.ready);
        assert!(!report.embedder_loaded && !report.index_loaded && !report.metadata_loaded);
        assert_eq!(
            context.resources().err().unwrap(),
            vec![Resource::Embedder, Resource::VectorIndex, Resource::MetadataStore]
        );
    }

    #[test]
    fn test_only_metadata_missing() {
        let corpus = corpus(3, 2);
        let context = ServiceContext::from_parts(
            Some(Arc::new(FixedEmbedder(3))),
            Some(corpus.index().clone()),
            None,
        );
        assert_eq!(
            context.resources().err().unwrap(),
            vec![Resource::MetadataStore]
        );
        assert_eq!(context.readiness().index_size, 2);
    }

    #[test]
    fn test_length_mismatch_not_ready() {
        let corpus = corpus(3, 2);
        let mut index = corpus.index().clone();
        index.add(&[vec![9.0; 3]]).unwrap();

        let context = ServiceContext::from_parts(
            Some(Arc::new(FixedEmbedder(3))),
            Some(index),
            Some(corpus.metadata().clone()),
        );
        let report = context.readiness();
        assert!(!report.ready);
        assert!(report.index_loaded && report.metadata_loaded);
        assert_eq!(report.index_size, 3);
        assert_eq!(report.metadata_count, 2);
        assert_eq!(report.problems.len(), 1);
    }

    #[test]
    fn test_dimension_mismatch_not_ready() {
        let corpus = corpus(3, 2);
        let context = ServiceContext::from_parts(
            Some(Arc::new(FixedEmbedder(4))),
            Some(corpus.index().clone()),
            Some(corpus.metadata().clone()),
        );
        assert!(!context.is_ready());
    }

    #[test]
    fn test_empty_corpus_is_ready() {
        let context = ServiceContext::with_corpus(Arc::new(FixedEmbedder(3)), Corpus::new("fixed", 3));
        let report = context.readiness();
        assert!(report.ready);
        assert_eq!(report.index_size, 0);
    }

    #[test]
    fn test_load_with_persisted_corpus() {
        let temp = TempDir::new().unwrap();
        let files = IndexFiles::new(temp.path().join("index.lxvi"), temp.path().join("meta.json"));
        let mut corpus = corpus(3, 4);
        files.save(&mut corpus).unwrap();

        let context = ServiceContext::load_with(Some(Arc::new(FixedEmbedder(3))), &files);
        let report = context.readiness();
        assert!(report.ready, "{:?}", report.problems);
        assert_eq!(report.index_size, 4);
        assert_eq!(report.metadata_count, 4);
    }

    #[test]
    fn test_load_with_missing_files() {
        let temp = TempDir::new().unwrap();
        let files = IndexFiles::new(temp.path().join("index.lxvi"), temp.path().join("meta.json"));

        let context = ServiceContext::load_with(Some(Arc::new(FixedEmbedder(3))), &files);
        let report = context.readiness();
        assert!(!report.ready);
        assert!(report.embedder_loaded);
        assert!(!report.index_loaded);
        assert_eq!(report.problems.len(), 2);
    }

    #[test]
    fn test_readiness_json_shape() {
        let context = ServiceContext::with_corpus(Arc::new(FixedEmbedder(3)), corpus(3, 1));
        let json = serde_json::to_value(context.readiness()).unwrap();
        assert_eq!(json["ready"], true);
        assert_eq!(json["index_size"], 1);
        assert!(json.get("problems").is_none());
    }
}
