//! Embedding generation and vector indexing
//!
//! - EmbeddingProvider trait for abstraction over backends
//! - FastEmbedProvider for local embedding generation
//! - HNSW index with a caller-supplied search effort parameter

mod provider;
mod vector_index;

pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use vector_index::{IndexHit, VectorIndex, VectorIndexError};
