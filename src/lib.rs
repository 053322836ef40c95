//! Lexrag - question answering over legal documents
//!
//! Ingests a folder of PDF and DOCX files into an exact vector index with
//! parallel chunk metadata, then answers questions by retrieving the closest
//! passages and asking a generative model for a JSON answer with citations.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod retrieval;
pub mod service;
pub mod storage;
pub mod synthesis;

pub use error::{LexragError, Result};
