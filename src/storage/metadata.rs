//! Metadata records kept parallel to the vector index

use crate::ingest::Chunk;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata file format version
pub const METADATA_SCHEMA_VERSION: u32 = 1;

/// Describes the chunk behind one index ordinal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Unique record identifier
    pub id: Uuid,
    /// Stable identifier of the originating document
    pub document_id: String,
    /// File name the chunk came from; may be empty in hand-built stores
    #[serde(default)]
    pub source_name: String,
    /// Chunk position within its document
    pub ordinal: usize,
    /// Chunk text
    pub text: String,
}

impl MetadataRecord {
    pub fn from_chunk(chunk: Chunk) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id: chunk.document_id,
            source_name: chunk.source_name,
            ordinal: chunk.ordinal,
            text: chunk.text,
        }
    }
}

/// Ordered metadata records plus the facts needed to check them against the index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataStore {
    pub schema_version: u32,
    /// Embedding model the index was built with
    pub model: String,
    /// Vector width of the index
    pub dimension: usize,
    pub created_at: DateTime<Utc>,
    /// BLAKE3 hex digest of the persisted index file
    #[serde(default)]
    pub index_checksum: String,
    records: Vec<MetadataRecord>,
}

impl MetadataStore {
    pub fn new(model: impl Into<String>, dimension: usize) -> Self {
        Self {
            schema_version: METADATA_SCHEMA_VERSION,
            model: model.into(),
            dimension,
            created_at: Utc::now(),
            index_checksum: String::new(),
            records: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, record: MetadataRecord) {
        self.records.push(record);
    }

    pub fn get(&self, ordinal: usize) -> Option<&MetadataRecord> {
        self.records.get(ordinal)
    }

    pub fn records(&self) -> &[MetadataRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Source label for an ordinal, falling back to `doc_{ordinal}`
    pub fn source_label(&self, ordinal: usize) -> String {
        match self.records.get(ordinal) {
            Some(record) if !record.source_name.is_empty() => record.source_name.clone(),
            _ => format!("doc_{}", ordinal),
        }
    }
}
