//! Embedding helpers shared by the command handlers.
//!
//! Handlers do not talk to a backend directly. They go through an
//! [`EmbeddingProvider`], which resolves the currently configured default
//! embedding model on every call so a registry change takes effect without
//! restarting the worker.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use tabula_core::{
    CreateNoteRequest, EmbeddingBackend, Error, NewSourceEmbedding, Note, NoteRepository,
    ProcessingStatus, Result, SourceInsight, SourceRepository, Vector,
};
use tabula_db::{Chunker, ChunkerConfig, RecursiveChunker};
use tabula_inference::ModelManager;

/// Resolves the embedding backend to use for a piece of work.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn backend(&self) -> Result<Arc<dyn EmbeddingBackend>>;
}

/// Provider backed by the model registry's configured default.
pub struct ManagerEmbeddingProvider {
    manager: Arc<ModelManager>,
}

impl ManagerEmbeddingProvider {
    pub fn new(manager: Arc<ModelManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl EmbeddingProvider for ManagerEmbeddingProvider {
    async fn backend(&self) -> Result<Arc<dyn EmbeddingBackend>> {
        self.manager.embedding_backend().await
    }
}

/// Provider pinned to a single backend. Used in tests and in deployments
/// that bypass the registry.
pub struct FixedEmbeddingProvider {
    backend: Arc<dyn EmbeddingBackend>,
}

impl FixedEmbeddingProvider {
    pub fn new(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbeddingProvider {
    async fn backend(&self) -> Result<Arc<dyn EmbeddingBackend>> {
        Ok(self.backend.clone())
    }
}

/// Embedding front end used by the handlers: single items, batches, and
/// chunked source documents.
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    chunker: RecursiveChunker,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            chunker: RecursiveChunker::new(ChunkerConfig::default()),
        }
    }

    /// Override the chunker configuration used by [`Embedder::vectorize`].
    pub fn with_chunker_config(mut self, config: ChunkerConfig) -> Self {
        self.chunker = RecursiveChunker::new(config);
        self
    }

    /// Check that an embedding backend is currently resolvable.
    ///
    /// Used by batch jobs to fail fast before collecting work, instead of
    /// failing every item individually.
    pub async fn ensure_backend(&self) -> Result<()> {
        self.provider.backend().await.map(|_| ())
    }

    /// Embed a single text.
    pub async fn embed_one(&self, text: &str) -> Result<Vector> {
        let backend = self.provider.backend().await?;
        let mut vectors = backend.embed_texts(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            tabula_core::Error::Embedding("Backend returned no embedding".to_string())
        })
    }

    /// Embed a batch of texts, preserving order.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let backend = self.provider.backend().await?;
        backend.embed_texts(texts).await
    }

    /// Chunk a source document and embed every chunk.
    ///
    /// Blank input yields no rows. Chunk order is preserved so callers can
    /// hand the result straight to `replace_embeddings`.
    pub async fn vectorize(&self, full_text: &str) -> Result<Vec<NewSourceEmbedding>> {
        let chunks = self.chunker.chunk(full_text);
        if chunks.is_empty() {
            return Ok(vec![]);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embed_batch(&texts).await?;
        debug!(
            chunks = chunks.len(),
            "Embedded source chunks"
        );

        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| NewSourceEmbedding {
                content: chunk.text,
                embedding,
            })
            .collect())
    }
}

/// Entity-level auto-embedding.
///
/// Save paths attach a vector when an embedding model is configured and the
/// entity has content. A missing model is non-fatal for saves (the row is
/// written without a vector); a failure inside the embedding call itself
/// fails the save.
pub struct AutoEmbedder {
    embedder: Arc<Embedder>,
    notes: Arc<dyn NoteRepository>,
    sources: Arc<dyn SourceRepository>,
}

impl AutoEmbedder {
    pub fn new(
        embedder: Arc<Embedder>,
        notes: Arc<dyn NoteRepository>,
        sources: Arc<dyn SourceRepository>,
    ) -> Self {
        Self {
            embedder,
            notes,
            sources,
        }
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    /// Embed `text` unless no model is configured, which degrades to `None`.
    async fn try_embed(&self, text: &str) -> Result<Option<Vector>> {
        match self.embedder.embed_one(text).await {
            Ok(vector) => Ok(Some(vector)),
            Err(Error::ModelUnavailable(msg)) => {
                warn!(%msg, "No embedding model configured, saving without vector");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Create a note, attaching a vector when possible.
    pub async fn save_note(&self, req: CreateNoteRequest) -> Result<Note> {
        let embedding = match req.content.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => self.try_embed(text).await?,
            _ => None,
        };
        self.notes.create(req, embedding).await
    }

    /// Update a note, recomputing its vector when possible.
    pub async fn update_note(&self, note: &Note) -> Result<()> {
        let embedding = match note.embedding_content() {
            Some(text) => self.try_embed(text).await?,
            None => None,
        };
        self.notes.update(note, embedding).await
    }

    /// Create an insight, attaching a vector when possible.
    pub async fn save_insight(
        &self,
        source_id: Uuid,
        insight_type: &str,
        content: &str,
    ) -> Result<SourceInsight> {
        let insight = self
            .sources
            .add_insight(source_id, insight_type, content)
            .await?;
        if let Some(text) = insight.embedding_content() {
            if let Some(vector) = self.try_embed(text).await? {
                self.sources
                    .save_insight_embedding(insight.id, vector)
                    .await?;
            }
        }
        Ok(insight)
    }

    /// Re-embed an existing note. Returns whether a vector was written.
    pub async fn embed_note(&self, id: Uuid) -> Result<bool> {
        let note = self
            .notes
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("note {}", id)))?;
        let Some(text) = note.embedding_content().map(String::from) else {
            return Ok(false);
        };
        let vector = self.embedder.embed_one(&text).await?;
        self.notes.save_embedding(id, vector).await
    }

    /// Re-embed an existing insight. Returns whether a vector was written.
    pub async fn embed_insight(&self, id: Uuid) -> Result<bool> {
        let insight = self
            .sources
            .get_insight(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("insight {}", id)))?;
        let Some(text) = insight.embedding_content().map(String::from) else {
            return Ok(false);
        };
        let vector = self.embedder.embed_one(&text).await?;
        self.sources.save_insight_embedding(id, vector).await
    }

    /// Chunk and embed a source's full text, replacing its stored chunks.
    ///
    /// Walks the source's processing status: in_progress while running,
    /// completed on success, failed on any error including empty text.
    pub async fn vectorize_source(&self, id: Uuid) -> Result<usize> {
        let source = self
            .sources
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("source {}", id)))?;

        self.sources
            .set_processing_status(id, ProcessingStatus::InProgress)
            .await?;

        let full_text = source.full_text.as_deref().unwrap_or("").trim();
        if full_text.is_empty() {
            self.sources
                .set_processing_status(id, ProcessingStatus::Failed)
                .await?;
            return Err(Error::InvalidInput(format!(
                "Source {} has no full text to vectorize",
                id
            )));
        }

        let rows = match self.embedder.vectorize(full_text).await {
            Ok(rows) => rows,
            Err(e) => {
                self.sources
                    .set_processing_status(id, ProcessingStatus::Failed)
                    .await?;
                return Err(e);
            }
        };
        let count = match self.sources.replace_embeddings(id, rows).await {
            Ok(count) => count,
            Err(e) => {
                self.sources
                    .set_processing_status(id, ProcessingStatus::Failed)
                    .await?;
                return Err(e);
            }
        };

        self.sources
            .set_processing_status(id, ProcessingStatus::Completed)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_inference::MockEmbeddingBackend;

    fn embedder(dimension: usize) -> Embedder {
        let backend: Arc<dyn EmbeddingBackend> = Arc::new(MockEmbeddingBackend::new(dimension));
        Embedder::new(Arc::new(FixedEmbeddingProvider::new(backend)))
    }

    #[tokio::test]
    async fn test_embed_one_dimension() {
        let embedder = embedder(8);
        let vector = embedder.embed_one("hello world").await.unwrap();
        assert_eq!(vector.as_slice().len(), 8);
    }

    #[tokio::test]
    async fn test_embed_batch_preserves_order_and_count() {
        let embedder = embedder(4);
        let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let vectors = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 3);
    }

    #[tokio::test]
    async fn test_embed_batch_empty_is_noop() {
        let embedder = embedder(4);
        let vectors = embedder.embed_batch(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn test_vectorize_blank_text_yields_no_rows() {
        let embedder = embedder(4);
        let rows = embedder.vectorize("   \n\n  ").await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_vectorize_splits_long_text() {
        let embedder = embedder(4).with_chunker_config(ChunkerConfig {
            max_chunk_size: 50,
            min_chunk_size: 10,
            overlap: 0,
        });

        let text = "First paragraph with enough text to stand alone here.\n\n\
                    Second paragraph, also long enough to be its own chunk.";
        let rows = embedder.vectorize(text).await.unwrap();

        assert!(rows.len() >= 2);
        assert!(rows.iter().all(|r| !r.content.trim().is_empty()));
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let backend: Arc<dyn EmbeddingBackend> =
            Arc::new(MockEmbeddingBackend::failing("model not loaded"));
        let embedder = Embedder::new(Arc::new(FixedEmbeddingProvider::new(backend)));

        let err = embedder.embed_one("text").await.unwrap_err();
        assert!(err.to_string().contains("model not loaded"));
    }

    mod auto {
        use super::*;
        use crate::testing::{InMemoryNoteRepository, InMemorySourceRepository};
        use tabula_core::CreateSourceRequest;
        use tabula_inference::{InMemoryModelRegistry, ModelManager};

        fn auto_with_backend(
            notes: Arc<InMemoryNoteRepository>,
            sources: Arc<InMemorySourceRepository>,
        ) -> AutoEmbedder {
            let backend: Arc<dyn EmbeddingBackend> = Arc::new(MockEmbeddingBackend::new(8));
            let embedder = Arc::new(Embedder::new(Arc::new(FixedEmbeddingProvider::new(backend))));
            AutoEmbedder::new(embedder, notes, sources)
        }

        /// AutoEmbedder resolving through an empty registry, so every embed
        /// attempt sees ModelUnavailable.
        fn auto_without_model(
            notes: Arc<InMemoryNoteRepository>,
            sources: Arc<InMemorySourceRepository>,
        ) -> AutoEmbedder {
            let manager = Arc::new(ModelManager::new(Arc::new(
                InMemoryModelRegistry::default(),
            )));
            let embedder = Arc::new(Embedder::new(Arc::new(ManagerEmbeddingProvider::new(
                manager,
            ))));
            AutoEmbedder::new(embedder, notes, sources)
        }

        fn note_request(content: &str) -> CreateNoteRequest {
            CreateNoteRequest {
                notebook_id: Uuid::now_v7(),
                title: None,
                content: Some(content.to_string()),
                note_type: None,
            }
        }

        #[tokio::test]
        async fn test_save_note_attaches_vector_when_model_configured() {
            let notes = Arc::new(InMemoryNoteRepository::default());
            let sources = Arc::new(InMemorySourceRepository::default());
            let auto = auto_with_backend(notes.clone(), sources);

            let note = auto.save_note(note_request("hello")).await.unwrap();
            assert!(notes.note_vector(note.id).is_some());
        }

        #[tokio::test]
        async fn test_save_note_without_model_saves_without_vector() {
            let notes = Arc::new(InMemoryNoteRepository::default());
            let sources = Arc::new(InMemorySourceRepository::default());
            let auto = auto_without_model(notes.clone(), sources);

            let note = auto.save_note(note_request("hello")).await.unwrap();
            assert!(notes.note_vector(note.id).is_none());
        }

        #[tokio::test]
        async fn test_save_note_embed_failure_fails_save() {
            let notes = Arc::new(InMemoryNoteRepository::default());
            let sources = Arc::new(InMemorySourceRepository::default());
            let backend: Arc<dyn EmbeddingBackend> =
                Arc::new(MockEmbeddingBackend::failing("backend down"));
            let embedder = Arc::new(Embedder::new(Arc::new(FixedEmbeddingProvider::new(backend))));
            let auto = AutoEmbedder::new(embedder, notes.clone(), sources);

            let err = auto.save_note(note_request("hello")).await.unwrap_err();
            assert!(err.to_string().contains("backend down"));
            assert!(notes.all_ids().await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_save_insight_attaches_vector() {
            let notes = Arc::new(InMemoryNoteRepository::default());
            let sources = Arc::new(InMemorySourceRepository::default());
            let source = sources
                .create(CreateSourceRequest {
                    notebook_id: Uuid::now_v7(),
                    asset: None,
                    title: None,
                    topics: vec![],
                    full_text: None,
                })
                .await
                .unwrap();
            let auto = auto_with_backend(notes, sources.clone());

            let insight = auto
                .save_insight(source.id, "summary", "An insight.")
                .await
                .unwrap();
            assert!(sources.insight_vector(insight.id).is_some());
        }

        #[tokio::test]
        async fn test_vectorize_source_walks_status() {
            let notes = Arc::new(InMemoryNoteRepository::default());
            let sources = Arc::new(InMemorySourceRepository::default());
            let source = sources
                .create(CreateSourceRequest {
                    notebook_id: Uuid::now_v7(),
                    asset: None,
                    title: None,
                    topics: vec![],
                    full_text: Some("Document text to chunk and embed.".to_string()),
                })
                .await
                .unwrap();
            let auto = auto_with_backend(notes, sources.clone());

            let count = auto.vectorize_source(source.id).await.unwrap();
            assert_eq!(count, 1);
            let source = sources.get(source.id).await.unwrap().unwrap();
            assert_eq!(source.processing_status, ProcessingStatus::Completed);
        }

        #[tokio::test]
        async fn test_vectorize_source_empty_text_fails_and_marks_failed() {
            let notes = Arc::new(InMemoryNoteRepository::default());
            let sources = Arc::new(InMemorySourceRepository::default());
            let source = sources
                .create(CreateSourceRequest {
                    notebook_id: Uuid::now_v7(),
                    asset: None,
                    title: None,
                    topics: vec![],
                    full_text: Some("   ".to_string()),
                })
                .await
                .unwrap();
            let auto = auto_with_backend(notes, sources.clone());

            let err = auto.vectorize_source(source.id).await.unwrap_err();
            assert!(err.to_string().contains("no full text"));
            let source = sources.get(source.id).await.unwrap().unwrap();
            assert_eq!(source.processing_status, ProcessingStatus::Failed);
        }
    }
}
