//! Core data models for tabula.
//!
//! These types are shared across all tabula crates and represent the core
//! domain entities: notebooks, sources, notes, chat sessions, configured AI
//! models, podcast episodes, and the persisted job record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub use pgvector::Vector;

use crate::defaults;

// =============================================================================
// JOB TYPES
// =============================================================================

/// Status of a job in the queue.
///
/// Lifecycle: `Pending -> InProgress -> {Completed, Failed}`, plus
/// `* -> Cancelled` (externally forced). Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// String form used in the database and over the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Whether this status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "in_progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("Invalid job status: {}", other)),
        }
    }
}

/// A persisted unit of requested background work.
///
/// `id` is immutable once assigned; `args` are immutable after submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub app_name: String,
    pub command_name: String,
    pub args: JsonValue,
    pub status: JobStatus,
    /// Completion fraction in `0.0..=1.0`.
    pub progress: f64,
    pub result: Option<JsonValue>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update applied to a job row.
///
/// Only populated fields are written; `updated_at` is always refreshed.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub status: Option<JobStatus>,
    pub result: Option<JsonValue>,
    pub error_message: Option<String>,
    pub progress: Option<f64>,
}

impl StatusUpdate {
    /// Start an update that transitions to `status`.
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_result(mut self, result: JsonValue) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Filter for listing jobs. Filters are conjunctive equality.
#[derive(Debug, Clone)]
pub struct JobFilter {
    pub app_name: Option<String>,
    pub command_name: Option<String>,
    pub status: Option<JobStatus>,
    pub limit: i64,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            app_name: None,
            command_name: None,
            status: None,
            limit: defaults::JOB_LIST_LIMIT,
        }
    }
}

/// Caller-facing view of a job's status.
///
/// A query for an unknown id yields a Failed-shaped report carrying a
/// "not found" message instead of an error; callers must inspect
/// `error_message` as well as `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: f64,
    pub result: Option<JsonValue>,
    pub error_message: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl JobStatusReport {
    /// Build a report from a persisted job row.
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            result: job.result.clone(),
            error_message: job.error_message.clone(),
            created_at: Some(job.created_at),
            updated_at: Some(job.updated_at),
        }
    }

    /// Failed-shaped report for an id with no backing row.
    pub fn not_found(job_id: Uuid) -> Self {
        Self {
            job_id,
            status: JobStatus::Failed,
            progress: 0.0,
            result: None,
            error_message: Some("Job not found".to_string()),
            created_at: None,
            updated_at: None,
        }
    }
}

// =============================================================================
// NOTEBOOK TYPES
// =============================================================================

/// A notebook grouping sources, notes, and chat sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notebook {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request for creating a new notebook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotebookRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

// =============================================================================
// SOURCE TYPES
// =============================================================================

/// Processing status tracked on a source while pipelines run against it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::InProgress => "in_progress",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "in_progress" => Ok(ProcessingStatus::InProgress),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(format!("Invalid processing status: {}", other)),
        }
    }
}

/// File or URL backing a source. Either field may be set; neither is
/// enforced exclusive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Asset {
    pub file_path: Option<String>,
    pub url: Option<String>,
}

/// A document entity owned by a notebook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub notebook_id: Uuid,
    pub asset: Option<Asset>,
    pub title: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub full_text: Option<String>,
    pub processing_status: ProcessingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Source {
    /// Sources never embed on save; chunk embedding happens only through
    /// the explicit vectorize path.
    pub fn needs_embedding(&self) -> bool {
        false
    }
}

/// Request for creating a new source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSourceRequest {
    pub notebook_id: Uuid,
    pub asset: Option<Asset>,
    pub title: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub full_text: Option<String>,
}

/// One embedded chunk of a source's text.
#[derive(Debug, Clone)]
pub struct SourceEmbedding {
    pub id: Uuid,
    pub source_id: Uuid,
    pub content: String,
    pub embedding: Vector,
}

/// Chunk content plus vector, ready for insertion.
#[derive(Debug, Clone)]
pub struct NewSourceEmbedding {
    pub content: String,
    pub embedding: Vector,
}

/// A derived text artifact extracted from a source via a transformation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInsight {
    pub id: Uuid,
    pub source_id: Uuid,
    pub insight_type: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SourceInsight {
    pub fn needs_embedding(&self) -> bool {
        true
    }

    pub fn embedding_content(&self) -> Option<&str> {
        let trimmed = self.content.trim();
        (!trimmed.is_empty()).then_some(self.content.as_str())
    }
}

// =============================================================================
// NOTE TYPES
// =============================================================================

/// Origin of a note's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteType {
    Human,
    Ai,
}

impl NoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteType::Human => "human",
            NoteType::Ai => "ai",
        }
    }
}

impl std::str::FromStr for NoteType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "human" => Ok(NoteType::Human),
            "ai" => Ok(NoteType::Ai),
            other => Err(format!("Invalid note type: {}", other)),
        }
    }
}

/// A note owned by a notebook. Notes auto-embed their content on save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub notebook_id: Uuid,
    pub title: Option<String>,
    pub content: Option<String>,
    pub note_type: Option<NoteType>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Notes always want an embedding; the save path decides whether a
    /// model is available to produce one.
    pub fn needs_embedding(&self) -> bool {
        true
    }

    pub fn embedding_content(&self) -> Option<&str> {
        self.content
            .as_deref()
            .filter(|c| !c.trim().is_empty())
    }
}

/// Request for creating a new note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNoteRequest {
    pub notebook_id: Uuid,
    pub title: Option<String>,
    pub content: Option<String>,
    pub note_type: Option<NoteType>,
}

// =============================================================================
// CHAT SESSION TYPES
// =============================================================================

/// A chat session attached to a notebook or a single source. The message
/// thread itself lives in an external conversation store keyed by session id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub notebook_id: Option<Uuid>,
    pub source_id: Option<Uuid>,
    pub title: Option<String>,
    pub model_override: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request for creating a new chat session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateChatSessionRequest {
    pub notebook_id: Option<Uuid>,
    pub source_id: Option<Uuid>,
    pub title: Option<String>,
    pub model_override: Option<String>,
}

// =============================================================================
// TRANSFORMATION TYPES
// =============================================================================

/// A named content-processing step applied during source ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transformation {
    pub id: Uuid,
    pub name: String,
    pub title: String,
    pub prompt: String,
    pub apply_default: bool,
}

// =============================================================================
// MODEL REGISTRY TYPES
// =============================================================================

/// Capability kind of a configured AI model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Language,
    Embedding,
    SpeechToText,
    TextToSpeech,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Language => "language",
            ModelKind::Embedding => "embedding",
            ModelKind::SpeechToText => "speech_to_text",
            ModelKind::TextToSpeech => "text_to_speech",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "language" => Ok(ModelKind::Language),
            "embedding" => Ok(ModelKind::Embedding),
            "speech_to_text" => Ok(ModelKind::SpeechToText),
            "text_to_speech" => Ok(ModelKind::TextToSpeech),
            other => Err(format!("Invalid model kind: {}", other)),
        }
    }
}

/// Provider hosting a configured model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    /// Local Ollama instance (default)
    #[default]
    Ollama,
    /// OpenAI-compatible API
    OpenAi,
}

impl std::fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelProvider::Ollama => f.write_str("ollama"),
            ModelProvider::OpenAi => f.write_str("openai"),
        }
    }
}

impl std::str::FromStr for ModelProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(ModelProvider::Ollama),
            "openai" => Ok(ModelProvider::OpenAi),
            other => Err(format!("Invalid model provider: {}", other)),
        }
    }
}

/// A configured AI model row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: Uuid,
    pub name: String,
    pub provider: ModelProvider,
    pub kind: ModelKind,
    pub created_at: DateTime<Utc>,
}

/// The single default-models configuration row.
///
/// Exactly one row exists (fixed key); each field selects the default model
/// id for one role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultModels {
    pub default_chat_model: Option<Uuid>,
    pub default_transformation_model: Option<Uuid>,
    pub large_context_model: Option<Uuid>,
    pub default_text_to_speech_model: Option<Uuid>,
    pub default_speech_to_text_model: Option<Uuid>,
    pub default_embedding_model: Option<Uuid>,
    pub default_tools_model: Option<Uuid>,
}

// =============================================================================
// PODCAST TYPES
// =============================================================================

/// Status of a podcast episode through generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    Starting,
    Generating,
    Completed,
    Failed,
}

impl EpisodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeStatus::Starting => "starting",
            EpisodeStatus::Generating => "generating",
            EpisodeStatus::Completed => "completed",
            EpisodeStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for EpisodeStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "starting" => Ok(EpisodeStatus::Starting),
            "generating" => Ok(EpisodeStatus::Generating),
            "completed" => Ok(EpisodeStatus::Completed),
            "failed" => Ok(EpisodeStatus::Failed),
            other => Err(format!("Invalid episode status: {}", other)),
        }
    }
}

/// Named episode template selecting format and speaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeProfile {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Name of the speaker profile this episode profile uses.
    pub speaker_profile: String,
    pub default_briefing: String,
    pub num_segments: i32,
}

/// Named text-to-speech voice configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerProfile {
    pub id: Uuid,
    pub name: String,
    pub tts_provider: String,
    pub tts_model: String,
    /// Speaker definitions (names, voices, personalities) as stored.
    pub speakers: JsonValue,
}

/// A generated (or in-flight) podcast episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodcastEpisode {
    pub id: Uuid,
    pub name: String,
    pub briefing: String,
    pub content: String,
    /// Snapshot of the episode profile at generation time.
    pub episode_profile: JsonValue,
    /// Snapshot of the speaker profile at generation time.
    pub speaker_profile: JsonValue,
    pub status: EpisodeStatus,
    pub audio_file: Option<String>,
    pub transcript: Option<JsonValue>,
    pub outline: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request for creating a new podcast episode record.
#[derive(Debug, Clone)]
pub struct CreateEpisodeRequest {
    pub name: String,
    pub briefing: String,
    pub content: String,
    pub episode_profile: JsonValue,
    pub speaker_profile: JsonValue,
}

/// Partial update applied to an episode as generation progresses.
#[derive(Debug, Clone, Default)]
pub struct EpisodeUpdate {
    pub status: Option<EpisodeStatus>,
    pub audio_file: Option<String>,
    pub transcript: Option<JsonValue>,
    pub outline: Option<JsonValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::InProgress,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_job_status_unknown_string() {
        assert!(JobStatus::from_str("unknown").is_err());
        assert!(JobStatus::from_str("PENDING").is_err());
    }

    #[test]
    fn test_processing_status_round_trip() {
        for status in [
            ProcessingStatus::Pending,
            ProcessingStatus::InProgress,
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
        ] {
            assert_eq!(
                ProcessingStatus::from_str(status.as_str()).unwrap(),
                status
            );
        }
    }

    #[test]
    fn test_status_update_builder() {
        let update = StatusUpdate::status(JobStatus::Completed)
            .with_result(serde_json::json!({"n": 3}))
            .with_progress(1.0);
        assert_eq!(update.status, Some(JobStatus::Completed));
        assert_eq!(update.progress, Some(1.0));
        assert!(update.error_message.is_none());
    }

    #[test]
    fn test_job_filter_default_limit() {
        let filter = JobFilter::default();
        assert_eq!(filter.limit, crate::defaults::JOB_LIST_LIMIT);
        assert!(filter.app_name.is_none());
    }

    #[test]
    fn test_status_report_not_found_is_failed_shaped() {
        let id = Uuid::now_v7();
        let report = JobStatusReport::not_found(id);
        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.error_message.as_deref(), Some("Job not found"));
        assert!(report.created_at.is_none());
    }

    #[test]
    fn test_note_embedding_hooks() {
        let note = Note {
            id: Uuid::now_v7(),
            notebook_id: Uuid::now_v7(),
            title: None,
            content: Some("hello".to_string()),
            note_type: Some(NoteType::Human),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(note.needs_embedding());
        assert_eq!(note.embedding_content(), Some("hello"));
    }

    #[test]
    fn test_note_blank_content_has_no_embedding_content() {
        let note = Note {
            id: Uuid::now_v7(),
            notebook_id: Uuid::now_v7(),
            title: None,
            content: Some("   ".to_string()),
            note_type: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(note.needs_embedding());
        assert_eq!(note.embedding_content(), None);
    }

    #[test]
    fn test_model_kind_round_trip() {
        for kind in [
            ModelKind::Language,
            ModelKind::Embedding,
            ModelKind::SpeechToText,
            ModelKind::TextToSpeech,
        ] {
            assert_eq!(ModelKind::from_str(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn test_model_provider_case_insensitive() {
        assert_eq!(
            ModelProvider::from_str("OLLAMA").unwrap(),
            ModelProvider::Ollama
        );
        assert!(ModelProvider::from_str("esperanto").is_err());
    }

    #[test]
    fn test_episode_status_round_trip() {
        for status in [
            EpisodeStatus::Starting,
            EpisodeStatus::Generating,
            EpisodeStatus::Completed,
            EpisodeStatus::Failed,
        ] {
            assert_eq!(EpisodeStatus::from_str(status.as_str()).unwrap(), status);
        }
    }
}
