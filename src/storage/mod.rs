//! Storage layer for lexrag
//!
//! Owns the in-memory pairing of vector index and metadata (`Corpus`) and
//! the two persisted artifacts: a zstd-compressed index file and a JSON
//! metadata file that records the index file's BLAKE3 checksum.

pub mod metadata;

use crate::embedding::{VectorIndex, VectorIndexError};
use crate::ingest::Chunk;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use metadata::{MetadataRecord, MetadataStore, METADATA_SCHEMA_VERSION};

/// zstd level for the index file
const COMPRESSION_LEVEL: i32 = 3;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Metadata JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid artifact {path}: {message}")]
    Format { path: PathBuf, message: String },

    #[error("Index checksum mismatch: metadata expects {expected}, index file is {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Index has {index} vectors but metadata has {metadata} records")]
    LengthMismatch { index: usize, metadata: usize },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    VectorIndex(#[from] VectorIndexError),
}

/// Vector index and metadata held as one arena
///
/// Ordinal `i` of the index and record `i` of the metadata always describe the
/// same chunk: the only way to grow a corpus is [`Corpus::append`].
#[derive(Debug, Clone)]
pub struct Corpus {
    index: VectorIndex,
    metadata: MetadataStore,
}

impl Corpus {
    /// Create an empty corpus for the given embedding model
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            index: VectorIndex::new(dimension),
            metadata: MetadataStore::new(model, dimension),
        }
    }

    /// Join a separately loaded index and metadata store
    pub fn from_parts(index: VectorIndex, metadata: MetadataStore) -> Result<Self, StorageError> {
        if index.len() != metadata.len() {
            return Err(StorageError::LengthMismatch {
                index: index.len(),
                metadata: metadata.len(),
            });
        }
        if index.dimension() != metadata.dimension {
            return Err(StorageError::DimensionMismatch {
                expected: metadata.dimension,
                actual: index.dimension(),
            });
        }
        Ok(Self { index, metadata })
    }

    /// Add a chunk and its embedding, returning the shared ordinal
    pub fn append(&mut self, chunk: Chunk, vector: &[f32]) -> Result<usize, StorageError> {
        // The vector is validated first so a rejected append leaves both sides untouched
        let ordinal = self.index.add_one(vector)?;
        self.metadata.push(MetadataRecord::from_chunk(chunk));
        Ok(ordinal)
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn record(&self, ordinal: usize) -> Option<&MetadataRecord> {
        self.metadata.get(ordinal)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn model(&self) -> &str {
        &self.metadata.model
    }
}

/// A vector index read from disk together with its file checksum
#[derive(Debug)]
pub struct LoadedIndex {
    pub index: VectorIndex,
    pub checksum: String,
}

/// Locations of the persisted index and metadata artifacts
#[derive(Debug, Clone)]
pub struct IndexFiles {
    pub index_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl IndexFiles {
    pub fn new(index_path: impl Into<PathBuf>, metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            metadata_path: metadata_path.into(),
        }
    }

    /// Write both artifacts, index first so its checksum can go into the metadata
    pub fn save(&self, corpus: &mut Corpus) -> Result<(), StorageError> {
        let compressed = zstd::encode_all(&corpus.index.to_bytes()[..], COMPRESSION_LEVEL)
            .map_err(|e| io_error(&self.index_path, e))?;
        write_atomic(&self.index_path, &compressed)?;

        corpus.metadata.index_checksum = checksum(&compressed);
        let json = serde_json::to_vec_pretty(&corpus.metadata).map_err(|e| StorageError::Json {
            path: self.metadata_path.clone(),
            source: e,
        })?;
        write_atomic(&self.metadata_path, &json)?;

        tracing::info!(
            "Saved {} vectors to {} and {} records to {}",
            corpus.index.len(),
            self.index_path.display(),
            corpus.metadata.len(),
            self.metadata_path.display()
        );
        Ok(())
    }

    pub fn load_index(&self) -> Result<LoadedIndex, StorageError> {
        let compressed = fs::read(&self.index_path).map_err(|e| io_error(&self.index_path, e))?;
        let bytes = zstd::decode_all(&compressed[..]).map_err(|e| StorageError::Format {
            path: self.index_path.clone(),
            message: format!("zstd decode failed: {}", e),
        })?;
        let index = VectorIndex::from_bytes(&bytes).map_err(|e| StorageError::Format {
            path: self.index_path.clone(),
            message: e.to_string(),
        })?;

        Ok(LoadedIndex {
            index,
            checksum: checksum(&compressed),
        })
    }

    pub fn load_metadata(&self) -> Result<MetadataStore, StorageError> {
        let bytes =
            fs::read(&self.metadata_path).map_err(|e| io_error(&self.metadata_path, e))?;
        let store: MetadataStore =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::Json {
                path: self.metadata_path.clone(),
                source: e,
            })?;

        if store.schema_version != METADATA_SCHEMA_VERSION {
            return Err(StorageError::Format {
                path: self.metadata_path.clone(),
                message: format!("unsupported schema version {}", store.schema_version),
            });
        }
        Ok(store)
    }

    /// Load and join both artifacts
    pub fn load(&self) -> Result<Corpus, StorageError> {
        let loaded = self.load_index()?;
        let metadata = self.load_metadata()?;
        verify_checksum(&metadata, &loaded.checksum)?;
        Corpus::from_parts(loaded.index, metadata)
    }
}

/// Check that metadata was written for exactly this index file
pub fn verify_checksum(metadata: &MetadataStore, actual: &str) -> Result<(), StorageError> {
    if metadata.index_checksum != actual {
        return Err(StorageError::ChecksumMismatch {
            expected: metadata.index_checksum.clone(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

fn checksum(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write to a sibling temp file, then rename over the target
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    fs::write(&temp_path, data).map_err(|e| io_error(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| io_error(path, e))?;
    Ok(())
}
