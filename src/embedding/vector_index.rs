//! Flat vector index for exact nearest-neighbour search
use std::cmp::Ordering;
use thiserror::Error;

/// Magic bytes opening the serialized index
const MAGIC: &[u8; 4] = b"LXVI";
/// Current serialization format
const FORMAT_VERSION: u32 = 1;
/// magic + version + dimension + count
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Invalid index data: {0}")]
    Format(String),
}

/// One search hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Squared Euclidean distance to the query (lower is closer)
    pub distance: f32,
    /// Position of the vector in insertion order
    pub ordinal: usize,
}

/// Exact k-NN index over squared Euclidean distance
///
/// Vectors are stored contiguously in insertion order, so the ordinal of a
/// vector is simply the number of vectors added before it.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Create an empty index for vectors of the given width
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Append vectors in call order
    ///
    /// Either every vector is added or none is: dimensions are checked before
    /// anything is written.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), VectorIndexError> {
        for vector in vectors {
            self.check_dimension(vector)?;
        }

        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Append a single vector, returning its ordinal
    pub fn add_one(&mut self, vector: &[f32]) -> Result<usize, VectorIndexError> {
        self.check_dimension(vector)?;
        let ordinal = self.len();
        self.data.extend_from_slice(vector);
        Ok(ordinal)
    }

    /// Search for the `k` nearest vectors
    ///
    /// Results are ordered by ascending distance, ties broken by lower ordinal.
    /// An empty index yields no results; `k` larger than the index is clamped.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, VectorIndexError> {
        self.check_dimension(query)?;

        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(ordinal, vector)| Neighbor {
                distance: squared_l2(query, vector),
                ordinal,
            })
            .collect();

        neighbors.sort_by(compare_neighbors);
        neighbors.truncate(k);

        Ok(neighbors)
    }

    /// Get a stored vector by ordinal
    pub fn get(&self, ordinal: usize) -> Option<&[f32]> {
        if ordinal >= self.len() {
            return None;
        }
        let start = ordinal * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    /// Get the number of vectors in the index
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Serialize to the uncompressed binary layout
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Deserialize from the layout produced by [`VectorIndex::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VectorIndexError> {
        if bytes.len() < HEADER_LEN {
            return Err(VectorIndexError::Format(format!(
                "truncated header ({} bytes)",
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC {
            return Err(VectorIndexError::Format("bad magic".to_string()));
        }

        let version = read_u32(&bytes[4..8]);
        if version != FORMAT_VERSION {
            return Err(VectorIndexError::Format(format!(
                "unsupported format version {}",
                version
            )));
        }

        let dimension = read_u32(&bytes[8..12]) as usize;
        let count = u64::from_le_bytes(bytes[12..20].try_into().unwrap_or([0; 8])) as usize;

        let body = &bytes[HEADER_LEN..];
        let expected = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| VectorIndexError::Format("size overflow".to_string()))?;
        if body.len() != expected {
            return Err(VectorIndexError::Format(format!(
                "expected {} bytes of vector data, found {}",
                expected,
                body.len()
            )));
        }
        if dimension == 0 && count > 0 {
            return Err(VectorIndexError::Format(
                "zero dimension with non-empty data".to_string(),
            ));
        }

        let data = body
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self { dimension, data })
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.ordinal.cmp(&b.ordinal))
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
