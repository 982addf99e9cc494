//! Chunav - Natural-language query pipeline for election data
//!
//! Answers questions about election data by classifying each question,
//! routing it to exact computation or semantic retrieval, and decomposing
//! multi-step questions into simpler sub-questions, with layered caching,
//! adaptive search-effort tuning, and pooled access to the backing store.

pub mod analytics;
pub mod cache;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod llm;
pub mod pool;
pub mod retrieval;
pub mod router;
pub mod tuner;

pub use engine::QaEngine;
pub use error::{ChunavError, Result};
pub use router::Answer;
