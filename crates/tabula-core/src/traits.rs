//! Core traits for tabula abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// JOB REPOSITORY
// =============================================================================

/// Repository for the persisted job queue.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Persist a new job as Pending with progress 0 and return its id.
    async fn submit(&self, app_name: &str, command_name: &str, args: serde_json::Value)
        -> Result<Uuid>;

    /// Fetch a job row by id.
    async fn get(&self, id: Uuid) -> Result<Option<Job>>;

    /// Apply a partial update to a job row.
    ///
    /// Status changes out of a terminal state are refused; the row is left
    /// untouched and `Ok(false)` is returned. `updated_at` is always
    /// refreshed on a successful write.
    async fn update_status(&self, id: Uuid, update: StatusUpdate) -> Result<bool>;

    /// Convenience wrapper updating only the progress fraction.
    async fn update_progress(&self, id: Uuid, progress: f64) -> Result<bool>;

    /// List jobs matching the filter, newest first.
    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>>;

    /// Cancel a job: transition it to Cancelled with the standard message.
    ///
    /// Returns `false` when the job does not exist or is already terminal.
    async fn cancel(&self, id: Uuid) -> Result<bool>;

    /// Atomically claim the oldest Pending job whose command is in
    /// `commands` (any command when empty), transitioning it to InProgress.
    ///
    /// Uses row locking so concurrent claimants never receive the same job.
    async fn claim_next(&self, commands: &[String]) -> Result<Option<Job>>;

    /// Number of Pending jobs currently queued.
    async fn pending_count(&self) -> Result<i64>;
}

// =============================================================================
// NOTEBOOK REPOSITORY
// =============================================================================

/// Repository for notebook CRUD operations.
#[async_trait]
pub trait NotebookRepository: Send + Sync {
    async fn create(&self, req: CreateNotebookRequest) -> Result<Notebook>;

    async fn get(&self, id: Uuid) -> Result<Option<Notebook>>;

    /// List notebooks, optionally including archived ones.
    async fn list(&self, include_archived: bool) -> Result<Vec<Notebook>>;

    async fn update(&self, notebook: &Notebook) -> Result<()>;

    /// Set or clear the archived flag.
    async fn set_archived(&self, id: Uuid, archived: bool) -> Result<bool>;

    async fn delete(&self, id: Uuid) -> Result<bool>;
}

// =============================================================================
// SOURCE REPOSITORY
// =============================================================================

/// Repository for sources, their embedded chunks, and their insights.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    async fn create(&self, req: CreateSourceRequest) -> Result<Source>;

    async fn get(&self, id: Uuid) -> Result<Option<Source>>;

    async fn list_by_notebook(&self, notebook_id: Uuid) -> Result<Vec<Source>>;

    /// Update the mutable fields of a source (title, topics, full_text,
    /// processing_status). `updated_at` is refreshed.
    async fn update(&self, source: &Source) -> Result<()>;

    async fn set_processing_status(&self, id: Uuid, status: ProcessingStatus) -> Result<bool>;

    /// Delete a source along with its embeddings and insights.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Replace all embedded chunks for a source with a fresh set.
    async fn replace_embeddings(&self, source_id: Uuid, chunks: Vec<NewSourceEmbedding>)
        -> Result<usize>;

    /// Number of embedded chunks currently stored for a source.
    async fn embedded_chunk_count(&self, source_id: Uuid) -> Result<i64>;

    /// Ids of all sources that have non-empty full text.
    async fn ids_with_text(&self) -> Result<Vec<Uuid>>;

    /// Ids of sources that currently have at least one embedded chunk.
    async fn ids_with_embeddings(&self) -> Result<Vec<Uuid>>;

    // --- insights -----------------------------------------------------------

    async fn add_insight(
        &self,
        source_id: Uuid,
        insight_type: &str,
        content: &str,
    ) -> Result<SourceInsight>;

    async fn get_insight(&self, id: Uuid) -> Result<Option<SourceInsight>>;

    async fn list_insights(&self, source_id: Uuid) -> Result<Vec<SourceInsight>>;

    /// Ids of all insights across all sources.
    async fn insight_ids(&self) -> Result<Vec<Uuid>>;

    /// Ids of insights that already carry a vector.
    async fn insight_ids_with_embedding(&self) -> Result<Vec<Uuid>>;

    /// Write (or overwrite) the vector stored against an insight.
    async fn save_insight_embedding(&self, insight_id: Uuid, embedding: Vector) -> Result<bool>;
}

// =============================================================================
// NOTE REPOSITORY
// =============================================================================

/// Repository for note CRUD operations.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Insert a new note. When `embedding` is provided it is written in the
    /// same statement; `None` leaves the vector column NULL.
    async fn create(&self, req: CreateNoteRequest, embedding: Option<Vector>) -> Result<Note>;

    async fn get(&self, id: Uuid) -> Result<Option<Note>>;

    async fn list_by_notebook(&self, notebook_id: Uuid) -> Result<Vec<Note>>;

    /// Update title/content/type. When `embedding` is provided the stored
    /// vector is replaced; `None` leaves it untouched.
    async fn update(&self, note: &Note, embedding: Option<Vector>) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Ids of all notes, for bulk re-embedding.
    async fn all_ids(&self) -> Result<Vec<Uuid>>;

    /// Ids of notes that already carry a vector.
    async fn ids_with_embedding(&self) -> Result<Vec<Uuid>>;

    /// Write (or overwrite) only the vector stored against a note.
    async fn save_embedding(&self, note_id: Uuid, embedding: Vector) -> Result<bool>;
}

// =============================================================================
// CHAT SESSION REPOSITORY
// =============================================================================

/// Repository for chat session records. Message threads live in an external
/// conversation store keyed by session id; this repository only tracks the
/// session rows.
#[async_trait]
pub trait ChatSessionRepository: Send + Sync {
    async fn create(&self, req: CreateChatSessionRequest) -> Result<ChatSession>;

    async fn get(&self, id: Uuid) -> Result<Option<ChatSession>>;

    async fn list_by_notebook(&self, notebook_id: Uuid) -> Result<Vec<ChatSession>>;

    async fn list_by_source(&self, source_id: Uuid) -> Result<Vec<ChatSession>>;

    /// Update title and model override.
    async fn update(&self, session: &ChatSession) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<bool>;
}

// =============================================================================
// TRANSFORMATION REPOSITORY
// =============================================================================

/// Repository for transformation definitions.
#[async_trait]
pub trait TransformationRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Transformation>>;

    /// Look up a transformation by its unique name.
    async fn get_by_name(&self, name: &str) -> Result<Option<Transformation>>;

    async fn list(&self) -> Result<Vec<Transformation>>;

    /// Transformations flagged to run by default during ingestion.
    async fn list_defaults(&self) -> Result<Vec<Transformation>>;
}

// =============================================================================
// MODEL REGISTRY
// =============================================================================

/// Repository for configured AI models and the default-models row.
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Register a model. `(provider, name)` pairs are unique.
    async fn register(&self, name: &str, provider: ModelProvider, kind: ModelKind)
        -> Result<Model>;

    async fn get(&self, id: Uuid) -> Result<Option<Model>>;

    async fn list(&self, kind: Option<ModelKind>) -> Result<Vec<Model>>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Fetch the singleton default-models row, creating an empty one on
    /// first access.
    async fn get_defaults(&self) -> Result<DefaultModels>;

    /// Overwrite the singleton default-models row.
    async fn set_defaults(&self, defaults: &DefaultModels) -> Result<()>;
}

// =============================================================================
// PODCAST REPOSITORY
// =============================================================================

/// Repository for podcast episodes and their profiles.
#[async_trait]
pub trait PodcastRepository: Send + Sync {
    async fn create_episode(&self, req: CreateEpisodeRequest) -> Result<PodcastEpisode>;

    async fn get_episode(&self, id: Uuid) -> Result<Option<PodcastEpisode>>;

    async fn list_episodes(&self) -> Result<Vec<PodcastEpisode>>;

    /// Apply a partial update to an episode as generation progresses.
    async fn update_episode(&self, id: Uuid, update: EpisodeUpdate) -> Result<bool>;

    async fn get_episode_profile(&self, name: &str) -> Result<Option<EpisodeProfile>>;

    async fn get_speaker_profile(&self, name: &str) -> Result<Option<SpeakerProfile>>;
}

// =============================================================================
// INFERENCE BACKENDS
// =============================================================================

/// Backend for text embedding generation.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for a batch of texts.
    ///
    /// Returns one vector per input, in order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Vector dimension this backend produces.
    fn dimension(&self) -> usize;

    /// Model name used by this backend.
    fn model_name(&self) -> &str;
}

// =============================================================================
// EXTERNAL PIPELINES
// =============================================================================

/// Output of running the content ingestion workflow against a source.
#[derive(Debug, Clone, Default)]
pub struct IngestionOutput {
    pub title: Option<String>,
    pub full_text: Option<String>,
    /// `(insight_type, content)` pairs produced by applied transformations.
    pub insights: Vec<(String, String)>,
}

/// External content ingestion workflow (text extraction plus
/// transformation passes). Implementations wrap whatever engine actually
/// does the extraction.
#[async_trait]
pub trait IngestionPipeline: Send + Sync {
    async fn run(
        &self,
        source: &Source,
        transformations: &[Transformation],
    ) -> Result<IngestionOutput>;
}

/// Finished artifacts from podcast generation.
#[derive(Debug, Clone)]
pub struct PodcastArtifacts {
    pub audio_file: String,
    pub transcript: serde_json::Value,
    pub outline: serde_json::Value,
}

/// External podcast generation engine (outline, script, speech synthesis).
#[async_trait]
pub trait PodcastGenerator: Send + Sync {
    async fn generate(&self, episode: &PodcastEpisode) -> Result<PodcastArtifacts>;
}
