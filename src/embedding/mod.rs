//! Embedding and vector search
//!
//! - EmbeddingProvider trait so the encoder can be swapped or faked
//! - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
//! - VectorIndex: exact squared-Euclidean k-NN over an append-only vector set
mod provider;
mod vector_index;

pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use vector_index::{Neighbor, VectorIndex, VectorIndexError};
