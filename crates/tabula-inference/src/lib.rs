//! # tabula-inference
//!
//! Embedding and model-dispatch layer for tabula.
//!
//! This crate provides:
//! - The Ollama embedding backend (default)
//! - `ModelManager`, which resolves the configured default model per role
//!   into a live backend
//! - In-memory test doubles for registry and backend
//!
//! # Example
//!
//! ```rust,no_run
//! use tabula_inference::OllamaBackend;
//! use tabula_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OllamaBackend::from_env().unwrap();
//!     let texts = vec!["Hello".to_string()];
//!     let embeddings = backend.embed_texts(&texts).await.unwrap();
//!     assert_eq!(embeddings.len(), 1);
//! }
//! ```

pub mod manager;
pub mod mock;
pub mod ollama;

// Re-export core types
pub use tabula_core::*;

pub use manager::{ModelManager, ModelRole};
pub use mock::{InMemoryModelRegistry, MockEmbeddingBackend};
pub use ollama::OllamaBackend;
