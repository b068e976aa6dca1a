//! # tabula-jobs
//!
//! Background command queue for tabula.
//!
//! This crate provides:
//! - The submission-side `CommandService` with status reports
//! - Async command processing with concurrent workers
//! - Progress tracking and notifications via broadcast channels
//! - Built-in handlers for ingestion, embedding, and podcast generation
//!
//! ## Example
//!
//! ```ignore
//! use tabula_jobs::{WorkerBuilder, WorkerConfig, NoOpHandler};
//! use tabula_db::Database;
//! use std::sync::Arc;
//!
//! let db = Database::connect("postgres://...").await?;
//! let jobs = Arc::new(db.jobs.clone());
//!
//! // Create worker with handlers
//! let worker = WorkerBuilder::new(jobs)
//!     .with_config(WorkerConfig::default().with_poll_interval(1000))
//!     .with_handler(NoOpHandler::new("noop"))
//!     .build()
//!     .await;
//!
//! // Start worker and get handle
//! let handle = worker.start();
//!
//! // Listen for events
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! // Graceful shutdown
//! handle.shutdown().await?;
//! ```

pub mod embedding;
pub mod handler;
pub mod handlers;
pub mod service;
pub mod testing;
pub mod worker;

// Re-export core types
pub use tabula_core::*;

pub use embedding::{
    AutoEmbedder, Embedder, EmbeddingProvider, FixedEmbeddingProvider, ManagerEmbeddingProvider,
};
pub use handler::{JobContext, JobHandler, JobOutcome, NoOpHandler, ProgressCallback};
pub use handlers::{
    builtin_commands, EmbedItemHandler, GeneratePodcastHandler, ProcessSourceHandler,
    RebuildEmbeddingsHandler,
};
pub use service::CommandService;
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};
