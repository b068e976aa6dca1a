//! In-memory repository fakes for handler, service, and worker tests.
//!
//! These mirror the PostgreSQL repositories' observable semantics (claim
//! ordering, terminal-state refusal, cascade deletes) without a database.
//! Always compiled so integration tests in tests/ can use them.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use tabula_core::{
    defaults, new_v7, CreateEpisodeRequest, CreateNoteRequest, CreateSourceRequest,
    EpisodeProfile, EpisodeStatus, EpisodeUpdate, Error, IngestionOutput, IngestionPipeline, Job,
    JobFilter, JobRepository, JobStatus, NewSourceEmbedding, Note, NoteRepository,
    PodcastArtifacts, PodcastEpisode, PodcastGenerator, PodcastRepository, ProcessingStatus,
    Result, Source, SourceInsight, SourceRepository, SpeakerProfile, StatusUpdate,
    Transformation, TransformationRepository, Vector,
};

/// Build an unclaimed job row for direct handler tests.
pub fn make_job(command_name: &str, args: JsonValue) -> Job {
    let now = Utc::now();
    Job {
        id: new_v7(),
        app_name: "tabula".to_string(),
        command_name: command_name.to_string(),
        args,
        status: JobStatus::InProgress,
        progress: 0.0,
        result: None,
        error_message: None,
        created_at: now,
        updated_at: now,
    }
}

// =============================================================================
// JOB REPOSITORY
// =============================================================================

/// Job queue fake preserving submission order and terminal-state refusal.
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: Mutex<Vec<Job>>,
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn submit(
        &self,
        app_name: &str,
        command_name: &str,
        args: JsonValue,
    ) -> Result<Uuid> {
        let now = Utc::now();
        let job = Job {
            id: new_v7(),
            app_name: app_name.to_string(),
            command_name: command_name.to_string(),
            args,
            status: JobStatus::Pending,
            progress: 0.0,
            result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        let id = job.id;
        self.jobs.lock().expect("jobs lock poisoned").push(job);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self
            .jobs
            .lock()
            .expect("jobs lock poisoned")
            .iter()
            .find(|j| j.id == id)
            .cloned())
    }

    async fn update_status(&self, id: Uuid, update: StatusUpdate) -> Result<bool> {
        let mut jobs = self.jobs.lock().expect("jobs lock poisoned");
        let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
            return Ok(false);
        };
        if job.status.is_terminal() {
            return Ok(false);
        }
        if let Some(status) = update.status {
            job.status = status;
        }
        if let Some(result) = update.result {
            job.result = Some(result);
        }
        if let Some(error) = update.error_message {
            job.error_message = Some(error);
        }
        if let Some(progress) = update.progress {
            job.progress = progress;
        }
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn update_progress(&self, id: Uuid, progress: f64) -> Result<bool> {
        self.update_status(
            id,
            StatusUpdate {
                progress: Some(progress.clamp(0.0, 1.0)),
                ..Default::default()
            },
        )
        .await
    }

    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>> {
        let jobs = self.jobs.lock().expect("jobs lock poisoned");
        let mut out: Vec<Job> = jobs
            .iter()
            .filter(|j| {
                filter.app_name.as_deref().is_none_or(|a| j.app_name == a)
                    && filter
                        .command_name
                        .as_deref()
                        .is_none_or(|c| j.command_name == c)
                    && filter.status.is_none_or(|s| j.status == s)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out.truncate(filter.limit.max(0) as usize);
        Ok(out)
    }

    async fn cancel(&self, id: Uuid) -> Result<bool> {
        self.update_status(
            id,
            StatusUpdate::status(JobStatus::Cancelled)
                .with_error(defaults::JOB_CANCELLED_MESSAGE),
        )
        .await
    }

    async fn claim_next(&self, commands: &[String]) -> Result<Option<Job>> {
        let mut jobs = self.jobs.lock().expect("jobs lock poisoned");
        // Oldest first, id as tiebreak, matching the SQL claim ordering.
        let next = jobs
            .iter_mut()
            .filter(|j| {
                j.status == JobStatus::Pending
                    && (commands.is_empty() || commands.iter().any(|c| c == &j.command_name))
            })
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(next.map(|job| {
            job.status = JobStatus::InProgress;
            job.updated_at = Utc::now();
            job.clone()
        }))
    }

    async fn pending_count(&self) -> Result<i64> {
        Ok(self
            .jobs
            .lock()
            .expect("jobs lock poisoned")
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .count() as i64)
    }
}

// =============================================================================
// SOURCE REPOSITORY
// =============================================================================

#[derive(Default)]
struct SourceState {
    sources: HashMap<Uuid, Source>,
    embeddings: HashMap<Uuid, Vec<NewSourceEmbedding>>,
    insights: HashMap<Uuid, SourceInsight>,
    insight_vectors: HashMap<Uuid, Vector>,
    poisoned_gets: Vec<Uuid>,
}

/// Source repository fake with chunk and insight storage.
#[derive(Default)]
pub struct InMemorySourceRepository {
    state: Mutex<SourceState>,
}

impl InMemorySourceRepository {
    /// Make `get` fail for one source id, for batch error-path tests.
    pub fn poison_get(&self, source_id: Uuid) {
        self.state
            .lock()
            .expect("source lock poisoned")
            .poisoned_gets
            .push(source_id);
    }

    /// Vector stored against an insight, if any.
    pub fn insight_vector(&self, insight_id: Uuid) -> Option<Vector> {
        self.state
            .lock()
            .expect("source lock poisoned")
            .insight_vectors
            .get(&insight_id)
            .cloned()
    }

    /// Stored chunk contents for a source, in insertion order.
    pub fn chunk_contents(&self, source_id: Uuid) -> Vec<String> {
        self.state
            .lock()
            .expect("source lock poisoned")
            .embeddings
            .get(&source_id)
            .map(|chunks| chunks.iter().map(|c| c.content.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SourceRepository for InMemorySourceRepository {
    async fn create(&self, req: CreateSourceRequest) -> Result<Source> {
        let now = Utc::now();
        let source = Source {
            id: new_v7(),
            notebook_id: req.notebook_id,
            asset: req.asset,
            title: req.title,
            topics: req.topics,
            full_text: req.full_text,
            processing_status: ProcessingStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.state
            .lock()
            .expect("source lock poisoned")
            .sources
            .insert(source.id, source.clone());
        Ok(source)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Source>> {
        let state = self.state.lock().expect("source lock poisoned");
        if state.poisoned_gets.contains(&id) {
            return Err(Error::Internal(format!("source {} failed to load", id)));
        }
        Ok(state.sources.get(&id).cloned())
    }

    async fn list_by_notebook(&self, notebook_id: Uuid) -> Result<Vec<Source>> {
        let state = self.state.lock().expect("source lock poisoned");
        Ok(state
            .sources
            .values()
            .filter(|s| s.notebook_id == notebook_id)
            .cloned()
            .collect())
    }

    async fn update(&self, source: &Source) -> Result<()> {
        let mut state = self.state.lock().expect("source lock poisoned");
        let entry = state
            .sources
            .get_mut(&source.id)
            .ok_or_else(|| Error::NotFound(format!("source {}", source.id)))?;
        *entry = Source {
            updated_at: Utc::now(),
            ..source.clone()
        };
        Ok(())
    }

    async fn set_processing_status(&self, id: Uuid, status: ProcessingStatus) -> Result<bool> {
        let mut state = self.state.lock().expect("source lock poisoned");
        Ok(state
            .sources
            .get_mut(&id)
            .map(|s| {
                s.processing_status = status;
                s.updated_at = Utc::now();
            })
            .is_some())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().expect("source lock poisoned");
        let existed = state.sources.remove(&id).is_some();
        state.embeddings.remove(&id);
        state.insights.retain(|_, i| i.source_id != id);
        Ok(existed)
    }

    async fn replace_embeddings(
        &self,
        source_id: Uuid,
        chunks: Vec<NewSourceEmbedding>,
    ) -> Result<usize> {
        let count = chunks.len();
        self.state
            .lock()
            .expect("source lock poisoned")
            .embeddings
            .insert(source_id, chunks);
        Ok(count)
    }

    async fn embedded_chunk_count(&self, source_id: Uuid) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .expect("source lock poisoned")
            .embeddings
            .get(&source_id)
            .map_or(0, |c| c.len() as i64))
    }

    async fn ids_with_text(&self) -> Result<Vec<Uuid>> {
        let state = self.state.lock().expect("source lock poisoned");
        let mut ids: Vec<Uuid> = state
            .sources
            .values()
            .filter(|s| s.full_text.as_deref().is_some_and(|t| !t.trim().is_empty()))
            .map(|s| s.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn ids_with_embeddings(&self) -> Result<Vec<Uuid>> {
        let state = self.state.lock().expect("source lock poisoned");
        let mut ids: Vec<Uuid> = state
            .embeddings
            .iter()
            .filter(|(_, chunks)| !chunks.is_empty())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn add_insight(
        &self,
        source_id: Uuid,
        insight_type: &str,
        content: &str,
    ) -> Result<SourceInsight> {
        let now = Utc::now();
        let insight = SourceInsight {
            id: new_v7(),
            source_id,
            insight_type: insight_type.to_string(),
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.state
            .lock()
            .expect("source lock poisoned")
            .insights
            .insert(insight.id, insight.clone());
        Ok(insight)
    }

    async fn get_insight(&self, id: Uuid) -> Result<Option<SourceInsight>> {
        Ok(self
            .state
            .lock()
            .expect("source lock poisoned")
            .insights
            .get(&id)
            .cloned())
    }

    async fn list_insights(&self, source_id: Uuid) -> Result<Vec<SourceInsight>> {
        let state = self.state.lock().expect("source lock poisoned");
        let mut out: Vec<SourceInsight> = state
            .insights
            .values()
            .filter(|i| i.source_id == source_id)
            .cloned()
            .collect();
        out.sort_by_key(|i| i.id);
        Ok(out)
    }

    async fn insight_ids(&self) -> Result<Vec<Uuid>> {
        let state = self.state.lock().expect("source lock poisoned");
        let mut ids: Vec<Uuid> = state.insights.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn insight_ids_with_embedding(&self) -> Result<Vec<Uuid>> {
        let state = self.state.lock().expect("source lock poisoned");
        let mut ids: Vec<Uuid> = state.insight_vectors.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn save_insight_embedding(&self, insight_id: Uuid, embedding: Vector) -> Result<bool> {
        let mut state = self.state.lock().expect("source lock poisoned");
        if !state.insights.contains_key(&insight_id) {
            return Ok(false);
        }
        state.insight_vectors.insert(insight_id, embedding);
        Ok(true)
    }
}

// =============================================================================
// NOTE REPOSITORY
// =============================================================================

#[derive(Default)]
struct NoteState {
    notes: HashMap<Uuid, Note>,
    vectors: HashMap<Uuid, Vector>,
}

/// Note repository fake tracking stored vectors separately for assertions.
#[derive(Default)]
pub struct InMemoryNoteRepository {
    state: Mutex<NoteState>,
}

impl InMemoryNoteRepository {
    /// Vector stored against a note, if any.
    pub fn note_vector(&self, note_id: Uuid) -> Option<Vector> {
        self.state
            .lock()
            .expect("note lock poisoned")
            .vectors
            .get(&note_id)
            .cloned()
    }
}

#[async_trait]
impl NoteRepository for InMemoryNoteRepository {
    async fn create(&self, req: CreateNoteRequest, embedding: Option<Vector>) -> Result<Note> {
        let now = Utc::now();
        let note = Note {
            id: new_v7(),
            notebook_id: req.notebook_id,
            title: req.title,
            content: req.content,
            note_type: req.note_type,
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.lock().expect("note lock poisoned");
        if let Some(vector) = embedding {
            state.vectors.insert(note.id, vector);
        }
        state.notes.insert(note.id, note.clone());
        Ok(note)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Note>> {
        Ok(self
            .state
            .lock()
            .expect("note lock poisoned")
            .notes
            .get(&id)
            .cloned())
    }

    async fn list_by_notebook(&self, notebook_id: Uuid) -> Result<Vec<Note>> {
        let state = self.state.lock().expect("note lock poisoned");
        Ok(state
            .notes
            .values()
            .filter(|n| n.notebook_id == notebook_id)
            .cloned()
            .collect())
    }

    async fn update(&self, note: &Note, embedding: Option<Vector>) -> Result<()> {
        let mut state = self.state.lock().expect("note lock poisoned");
        if !state.notes.contains_key(&note.id) {
            return Err(Error::NotFound(format!("note {}", note.id)));
        }
        if let Some(vector) = embedding {
            state.vectors.insert(note.id, vector);
        }
        state.notes.insert(
            note.id,
            Note {
                updated_at: Utc::now(),
                ..note.clone()
            },
        );
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().expect("note lock poisoned");
        state.vectors.remove(&id);
        Ok(state.notes.remove(&id).is_some())
    }

    async fn all_ids(&self) -> Result<Vec<Uuid>> {
        let state = self.state.lock().expect("note lock poisoned");
        let mut ids: Vec<Uuid> = state.notes.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn ids_with_embedding(&self) -> Result<Vec<Uuid>> {
        let state = self.state.lock().expect("note lock poisoned");
        let mut ids: Vec<Uuid> = state.vectors.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn save_embedding(&self, note_id: Uuid, embedding: Vector) -> Result<bool> {
        let mut state = self.state.lock().expect("note lock poisoned");
        if !state.notes.contains_key(&note_id) {
            return Ok(false);
        }
        state.vectors.insert(note_id, embedding);
        Ok(true)
    }
}

// =============================================================================
// TRANSFORMATION REPOSITORY
// =============================================================================

/// Transformation repository fake seeded via [`InMemoryTransformationRepository::add`].
#[derive(Default)]
pub struct InMemoryTransformationRepository {
    transformations: Mutex<Vec<Transformation>>,
}

impl InMemoryTransformationRepository {
    pub fn add(&self, name: &str, apply_default: bool) -> Transformation {
        let transformation = Transformation {
            id: new_v7(),
            name: name.to_string(),
            title: name.to_string(),
            prompt: format!("Apply {} to the text", name),
            apply_default,
        };
        self.transformations
            .lock()
            .expect("transformation lock poisoned")
            .push(transformation.clone());
        transformation
    }
}

#[async_trait]
impl TransformationRepository for InMemoryTransformationRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Transformation>> {
        Ok(self
            .transformations
            .lock()
            .expect("transformation lock poisoned")
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Transformation>> {
        Ok(self
            .transformations
            .lock()
            .expect("transformation lock poisoned")
            .iter()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Transformation>> {
        Ok(self
            .transformations
            .lock()
            .expect("transformation lock poisoned")
            .clone())
    }

    async fn list_defaults(&self) -> Result<Vec<Transformation>> {
        Ok(self
            .transformations
            .lock()
            .expect("transformation lock poisoned")
            .iter()
            .filter(|t| t.apply_default)
            .cloned()
            .collect())
    }
}

// =============================================================================
// PODCAST REPOSITORY
// =============================================================================

#[derive(Default)]
struct PodcastState {
    episodes: HashMap<Uuid, PodcastEpisode>,
    episode_profiles: HashMap<String, EpisodeProfile>,
    speaker_profiles: HashMap<String, SpeakerProfile>,
}

/// Podcast repository fake with profile seeding helpers.
#[derive(Default)]
pub struct InMemoryPodcastRepository {
    state: Mutex<PodcastState>,
}

impl InMemoryPodcastRepository {
    pub fn add_episode_profile(&self, name: &str, speaker_profile: &str) {
        let profile = EpisodeProfile {
            id: new_v7(),
            name: name.to_string(),
            description: String::new(),
            speaker_profile: speaker_profile.to_string(),
            default_briefing: "Discuss the provided material".to_string(),
            num_segments: 5,
        };
        self.state
            .lock()
            .expect("podcast lock poisoned")
            .episode_profiles
            .insert(name.to_string(), profile);
    }

    pub fn add_speaker_profile(&self, name: &str) {
        let profile = SpeakerProfile {
            id: new_v7(),
            name: name.to_string(),
            tts_provider: "ollama".to_string(),
            tts_model: "tts-1".to_string(),
            speakers: serde_json::json!([{"name": "Host", "voice": "alloy"}]),
        };
        self.state
            .lock()
            .expect("podcast lock poisoned")
            .speaker_profiles
            .insert(name.to_string(), profile);
    }
}

#[async_trait]
impl PodcastRepository for InMemoryPodcastRepository {
    async fn create_episode(&self, req: CreateEpisodeRequest) -> Result<PodcastEpisode> {
        let now = Utc::now();
        let episode = PodcastEpisode {
            id: new_v7(),
            name: req.name,
            briefing: req.briefing,
            content: req.content,
            episode_profile: req.episode_profile,
            speaker_profile: req.speaker_profile,
            status: EpisodeStatus::Starting,
            audio_file: None,
            transcript: None,
            outline: None,
            created_at: now,
            updated_at: now,
        };
        self.state
            .lock()
            .expect("podcast lock poisoned")
            .episodes
            .insert(episode.id, episode.clone());
        Ok(episode)
    }

    async fn get_episode(&self, id: Uuid) -> Result<Option<PodcastEpisode>> {
        Ok(self
            .state
            .lock()
            .expect("podcast lock poisoned")
            .episodes
            .get(&id)
            .cloned())
    }

    async fn list_episodes(&self) -> Result<Vec<PodcastEpisode>> {
        Ok(self
            .state
            .lock()
            .expect("podcast lock poisoned")
            .episodes
            .values()
            .cloned()
            .collect())
    }

    async fn update_episode(&self, id: Uuid, update: EpisodeUpdate) -> Result<bool> {
        let mut state = self.state.lock().expect("podcast lock poisoned");
        let Some(episode) = state.episodes.get_mut(&id) else {
            return Ok(false);
        };
        if let Some(status) = update.status {
            episode.status = status;
        }
        if let Some(audio_file) = update.audio_file {
            episode.audio_file = Some(audio_file);
        }
        if let Some(transcript) = update.transcript {
            episode.transcript = Some(transcript);
        }
        if let Some(outline) = update.outline {
            episode.outline = Some(outline);
        }
        episode.updated_at = Utc::now();
        Ok(true)
    }

    async fn get_episode_profile(&self, name: &str) -> Result<Option<EpisodeProfile>> {
        Ok(self
            .state
            .lock()
            .expect("podcast lock poisoned")
            .episode_profiles
            .get(name)
            .cloned())
    }

    async fn get_speaker_profile(&self, name: &str) -> Result<Option<SpeakerProfile>> {
        Ok(self
            .state
            .lock()
            .expect("podcast lock poisoned")
            .speaker_profiles
            .get(name)
            .cloned())
    }
}

// =============================================================================
// EXTERNAL PIPELINE STUBS
// =============================================================================

/// Ingestion pipeline stub returning a fixed output or failure.
pub struct StubIngestionPipeline {
    pub output: IngestionOutput,
    pub fail_with: Option<String>,
}

impl StubIngestionPipeline {
    pub fn succeeding(full_text: &str) -> Self {
        Self {
            output: IngestionOutput {
                title: Some("Extracted title".to_string()),
                full_text: Some(full_text.to_string()),
                insights: vec![],
            },
            fail_with: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            output: IngestionOutput::default(),
            fail_with: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl IngestionPipeline for StubIngestionPipeline {
    async fn run(
        &self,
        _source: &Source,
        transformations: &[Transformation],
    ) -> Result<IngestionOutput> {
        if let Some(message) = &self.fail_with {
            return Err(Error::Pipeline(message.clone()));
        }
        let mut output = self.output.clone();
        for transformation in transformations {
            output
                .insights
                .push((transformation.name.clone(), format!("{} output", transformation.name)));
        }
        Ok(output)
    }
}

/// Podcast generator stub returning fixed artifacts or failure.
pub struct StubPodcastGenerator {
    pub fail_with: Option<String>,
}

impl StubPodcastGenerator {
    pub fn succeeding() -> Self {
        Self { fail_with: None }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl PodcastGenerator for StubPodcastGenerator {
    async fn generate(&self, episode: &PodcastEpisode) -> Result<PodcastArtifacts> {
        if let Some(message) = &self.fail_with {
            return Err(Error::Pipeline(message.clone()));
        }
        Ok(PodcastArtifacts {
            audio_file: format!("data/podcasts/{}.mp3", episode.id),
            transcript: serde_json::json!({"segments": []}),
            outline: serde_json::json!({"sections": []}),
        })
    }
}
