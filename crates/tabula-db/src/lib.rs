//! # tabula-db
//!
//! PostgreSQL database layer for tabula.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for all core entities
//! - The persisted job queue with `SKIP LOCKED` claiming
//! - Vector storage with pgvector
//! - Text chunking strategies for embedding generation
//!
//! ## Example
//!
//! ```rust,ignore
//! use tabula_db::Database;
//! use tabula_core::{CreateNotebookRequest, NotebookRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/tabula").await?;
//!     db.migrate().await?;
//!
//!     let notebook = db.notebooks.create(CreateNotebookRequest {
//!         name: "Research".to_string(),
//!         description: String::new(),
//!     }).await?;
//!
//!     println!("Created notebook: {}", notebook.id);
//!     Ok(())
//! }
//! ```

pub mod chat_sessions;
pub mod chunking;
pub mod jobs;
pub mod model_registry;
pub mod notebooks;
pub mod notes;
pub mod podcasts;
pub mod pool;
pub mod sources;
pub mod transformations;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use tabula_core::*;

// Re-export chunking types
pub use chunking::{Chunk, Chunker, ChunkerConfig, ParagraphChunker, RecursiveChunker, SlidingWindowChunker};

// Re-export repository implementations
pub use chat_sessions::PgChatSessionRepository;
pub use jobs::PgJobRepository;
pub use model_registry::PgModelRegistry;
pub use notebooks::PgNotebookRepository;
pub use notes::PgNoteRepository;
pub use podcasts::PgPodcastRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use sources::PgSourceRepository;
pub use transformations::PgTransformationRepository;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Notebook repository.
    pub notebooks: PgNotebookRepository,
    /// Source repository (sources, embedded chunks, insights).
    pub sources: PgSourceRepository,
    /// Note repository.
    pub notes: PgNoteRepository,
    /// Chat session repository.
    pub chat_sessions: PgChatSessionRepository,
    /// Transformation repository.
    pub transformations: PgTransformationRepository,
    /// Model registry (configured models and role defaults).
    pub models: PgModelRegistry,
    /// Podcast episode and profile repository.
    pub podcasts: PgPodcastRepository,
    /// Job queue repository.
    pub jobs: PgJobRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            notebooks: PgNotebookRepository::new(pool.clone()),
            sources: PgSourceRepository::new(pool.clone()),
            notes: PgNoteRepository::new(pool.clone()),
            chat_sessions: PgChatSessionRepository::new(pool.clone()),
            transformations: PgTransformationRepository::new(pool.clone()),
            models: PgModelRegistry::new(pool.clone()),
            podcasts: PgPodcastRepository::new(pool.clone()),
            jobs: PgJobRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }

    /// Copy a source insight into its source's notebook as an AI note.
    ///
    /// The insight row stays untouched; the note is an independent copy
    /// titled after the insight type.
    pub async fn save_insight_as_note(&self, insight_id: uuid::Uuid) -> Result<Note> {
        let insight = self
            .sources
            .get_insight(insight_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("insight {}", insight_id)))?;
        let source = self
            .sources
            .get(insight.source_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("source {}", insight.source_id)))?;

        self.notes
            .create(
                CreateNoteRequest {
                    notebook_id: source.notebook_id,
                    title: Some(insight.insight_type.clone()),
                    content: Some(insight.content.clone()),
                    note_type: Some(NoteType::Ai),
                },
                None,
            )
            .await
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            notebooks: self.notebooks.clone(),
            sources: self.sources.clone(),
            notes: self.notes.clone(),
            chat_sessions: self.chat_sessions.clone(),
            transformations: self.transformations.clone(),
            models: self.models.clone(),
            podcasts: self.podcasts.clone(),
            // Shares the job notify handle so clones wake the same workers.
            jobs: self.jobs.clone(),
        }
    }
}
