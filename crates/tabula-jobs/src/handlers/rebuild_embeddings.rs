//! Full embedding rebuild handler.
//!
//! Walks notes, insights, and sources and re-embeds them, typically after
//! switching the default embedding model. Partial failure is an expected
//! outcome: individual item failures are counted and skipped, never abort
//! the batch, and the job still reports success. The handler checks for
//! external cancellation between items.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use tabula_core::{defaults, NoteRepository, SourceRepository};

use crate::embedding::AutoEmbedder;
use crate::handler::{JobContext, JobHandler, JobOutcome};

/// Which items a rebuild run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RebuildMode {
    /// Only items that already carry a vector.
    Existing,
    /// Every item with embeddable content.
    #[default]
    All,
}

#[derive(Debug, Default, Deserialize)]
struct RebuildArgs {
    #[serde(default)]
    mode: RebuildMode,
    #[serde(default = "default_true")]
    include_sources: bool,
    #[serde(default = "default_true")]
    include_notes: bool,
    #[serde(default = "default_true")]
    include_insights: bool,
}

fn default_true() -> bool {
    true
}

/// Handler for the `rebuild_embeddings` command.
pub struct RebuildEmbeddingsHandler {
    sources: Arc<dyn SourceRepository>,
    notes: Arc<dyn NoteRepository>,
    auto: Arc<AutoEmbedder>,
}

enum Item {
    Note(Uuid),
    Insight(Uuid),
    Source(Uuid),
}

impl RebuildEmbeddingsHandler {
    pub fn new(
        sources: Arc<dyn SourceRepository>,
        notes: Arc<dyn NoteRepository>,
        auto: Arc<AutoEmbedder>,
    ) -> Self {
        Self {
            sources,
            notes,
            auto,
        }
    }

    /// Candidate ids per category, honoring mode and include flags.
    async fn collect_items(&self, args: &RebuildArgs) -> Result<Vec<Item>, tabula_core::Error> {
        let mut items = Vec::new();

        if args.include_notes {
            let ids = match args.mode {
                RebuildMode::Existing => self.notes.ids_with_embedding().await?,
                RebuildMode::All => self.notes.all_ids().await?,
            };
            items.extend(ids.into_iter().map(Item::Note));
        }
        if args.include_insights {
            let ids = match args.mode {
                RebuildMode::Existing => self.sources.insight_ids_with_embedding().await?,
                RebuildMode::All => self.sources.insight_ids().await?,
            };
            items.extend(ids.into_iter().map(Item::Insight));
        }
        if args.include_sources {
            let ids = match args.mode {
                RebuildMode::Existing => self.sources.ids_with_embeddings().await?,
                RebuildMode::All => self.sources.ids_with_text().await?,
            };
            items.extend(ids.into_iter().map(Item::Source));
        }

        Ok(items)
    }
}

#[async_trait]
impl JobHandler for RebuildEmbeddingsHandler {
    fn command_name(&self) -> &'static str {
        "rebuild_embeddings"
    }

    async fn execute(&self, ctx: JobContext) -> JobOutcome {
        let start = Instant::now();

        let args: RebuildArgs = if ctx.args().is_null() {
            RebuildArgs::default()
        } else {
            match ctx.parse_args() {
                Ok(args) => args,
                Err(e) => return JobOutcome::from_error(&e),
            }
        };

        // A rebuild without a model would fail every item; bail up front.
        if let Err(e) = self.auto.embedder().ensure_backend().await {
            return JobOutcome::from_error(&e);
        }

        let items = match self.collect_items(&args).await {
            Ok(items) => items,
            Err(e) => return JobOutcome::from_error(&e),
        };
        let total_items = items.len();
        info!(total_items, mode = ?args.mode, "Rebuilding embeddings");

        let mut processed_items = 0usize;
        let mut failed_items = 0usize;

        for (position, item) in items.iter().enumerate() {
            if ctx.is_cancelled().await {
                return JobOutcome::Failed(defaults::JOB_CANCELLED_MESSAGE.to_string());
            }

            let result = match item {
                Item::Note(id) => self.auto.embed_note(*id).await.map(|_| ()),
                Item::Insight(id) => self.auto.embed_insight(*id).await.map(|_| ()),
                Item::Source(id) => self.auto.vectorize_source(*id).await.map(|_| ()),
            };
            match result {
                Ok(()) => processed_items += 1,
                Err(e) => {
                    warn!(error = %e, "Skipping item during embedding rebuild");
                    failed_items += 1;
                }
            }

            if total_items > 0 {
                ctx.report_progress((position + 1) as f64 / total_items as f64, None)
                    .await;
            }
        }

        info!(
            total_items,
            processed_items,
            failed_items,
            duration_ms = start.elapsed().as_millis() as u64,
            "Embedding rebuild finished"
        );

        JobOutcome::Success(json!({
            "success": true,
            "total_items": total_items,
            "processed_items": processed_items,
            "failed_items": failed_items,
            "processing_time_ms": start.elapsed().as_millis() as u64,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{Embedder, FixedEmbeddingProvider, ManagerEmbeddingProvider};
    use crate::testing::{
        make_job, InMemoryJobRepository, InMemoryNoteRepository, InMemorySourceRepository,
    };
    use serde_json::json;
    use tabula_core::{
        CreateNoteRequest, CreateSourceRequest, EmbeddingBackend, JobRepository, NoteType,
    };
    use tabula_inference::{InMemoryModelRegistry, MockEmbeddingBackend, ModelManager};

    fn auto(
        sources: Arc<InMemorySourceRepository>,
        notes: Arc<InMemoryNoteRepository>,
    ) -> Arc<AutoEmbedder> {
        let backend: Arc<dyn EmbeddingBackend> = Arc::new(MockEmbeddingBackend::new(8));
        let embedder = Arc::new(Embedder::new(Arc::new(FixedEmbeddingProvider::new(backend))));
        Arc::new(AutoEmbedder::new(embedder, notes, sources))
    }

    async fn seed_note(notes: &InMemoryNoteRepository, content: &str) -> Uuid {
        notes
            .create(
                CreateNoteRequest {
                    notebook_id: Uuid::now_v7(),
                    title: None,
                    content: Some(content.to_string()),
                    note_type: Some(NoteType::Ai),
                },
                None,
            )
            .await
            .unwrap()
            .id
    }

    async fn seed_source_with_text(sources: &InMemorySourceRepository, text: &str) -> Uuid {
        sources
            .create(CreateSourceRequest {
                notebook_id: Uuid::now_v7(),
                asset: None,
                title: None,
                topics: vec![],
                full_text: Some(text.to_string()),
            })
            .await
            .unwrap()
            .id
    }

    fn jobs() -> Arc<dyn JobRepository> {
        Arc::new(InMemoryJobRepository::default())
    }

    #[tokio::test]
    async fn test_rebuild_covers_notes_insights_and_sources() {
        let sources = Arc::new(InMemorySourceRepository::default());
        let notes = Arc::new(InMemoryNoteRepository::default());

        let note_id = seed_note(&notes, "A note about indexing.").await;
        let source_id = seed_source_with_text(&sources, "Document body text.").await;
        let insight = sources
            .add_insight(source_id, "summary", "A summary insight.")
            .await
            .unwrap();

        let handler = RebuildEmbeddingsHandler::new(
            sources.clone(),
            notes.clone(),
            auto(sources.clone(), notes.clone()),
        );
        let job = make_job("rebuild_embeddings", json!({}));
        let outcome = handler.execute(JobContext::new(job, jobs())).await;

        let JobOutcome::Success(result) = outcome else {
            panic!("Expected success");
        };
        assert_eq!(result["total_items"], 3);
        assert_eq!(result["processed_items"], 3);
        assert_eq!(result["failed_items"], 0);

        assert!(notes.note_vector(note_id).is_some());
        assert!(sources.insight_vector(insight.id).is_some());
        assert_eq!(sources.embedded_chunk_count(source_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rebuild_one_failing_source_of_five() {
        let sources = Arc::new(InMemorySourceRepository::default());
        let notes = Arc::new(InMemoryNoteRepository::default());

        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(seed_source_with_text(&sources, &format!("Body {}", i)).await);
        }
        sources.poison_get(ids[2]);

        let handler = RebuildEmbeddingsHandler::new(
            sources.clone(),
            notes.clone(),
            auto(sources.clone(), notes),
        );
        let job = make_job(
            "rebuild_embeddings",
            json!({ "include_notes": false, "include_insights": false }),
        );
        let outcome = handler.execute(JobContext::new(job, jobs())).await;

        let JobOutcome::Success(result) = outcome else {
            panic!("Expected success despite a failing item");
        };
        assert_eq!(result["total_items"], 5);
        assert_eq!(result["failed_items"], 1);
        assert_eq!(result["processed_items"], 4);
    }

    #[tokio::test]
    async fn test_rebuild_existing_mode_skips_unembedded() {
        let sources = Arc::new(InMemorySourceRepository::default());
        let notes = Arc::new(InMemoryNoteRepository::default());

        let embedded = seed_note(&notes, "Already embedded.").await;
        seed_note(&notes, "Never embedded.").await;
        notes
            .save_embedding(embedded, tabula_core::Vector::from(vec![0.0; 8]))
            .await
            .unwrap();

        let handler = RebuildEmbeddingsHandler::new(
            sources.clone(),
            notes.clone(),
            auto(sources, notes),
        );
        let job = make_job(
            "rebuild_embeddings",
            json!({ "mode": "existing", "include_sources": false, "include_insights": false }),
        );
        let outcome = handler.execute(JobContext::new(job, jobs())).await;

        let JobOutcome::Success(result) = outcome else {
            panic!("Expected success");
        };
        assert_eq!(result["total_items"], 1);
        assert_eq!(result["processed_items"], 1);
    }

    #[tokio::test]
    async fn test_rebuild_fails_fast_without_model() {
        let sources = Arc::new(InMemorySourceRepository::default());
        let notes = Arc::new(InMemoryNoteRepository::default());
        seed_note(&notes, "A note.").await;

        let manager = Arc::new(ModelManager::new(Arc::new(
            InMemoryModelRegistry::default(),
        )));
        let embedder = Arc::new(Embedder::new(Arc::new(ManagerEmbeddingProvider::new(
            manager,
        ))));
        let auto = Arc::new(AutoEmbedder::new(embedder, notes.clone(), sources.clone()));

        let handler = RebuildEmbeddingsHandler::new(sources, notes, auto);
        let job = make_job("rebuild_embeddings", json!({}));
        let outcome = handler.execute(JobContext::new(job, jobs())).await;

        let JobOutcome::Failed(message) = outcome else {
            panic!("Expected fail-fast failure");
        };
        assert!(message.contains("Model unavailable"));
    }

    #[tokio::test]
    async fn test_rebuild_stops_when_cancelled() {
        let sources = Arc::new(InMemorySourceRepository::default());
        let notes = Arc::new(InMemoryNoteRepository::default());
        seed_note(&notes, "A note.").await;

        let repo = Arc::new(InMemoryJobRepository::default());
        let job_id = repo
            .submit("tabula", "rebuild_embeddings", json!({}))
            .await
            .unwrap();
        repo.claim_next(&[]).await.unwrap();
        repo.cancel(job_id).await.unwrap();
        let job = repo.get(job_id).await.unwrap().unwrap();

        let handler = RebuildEmbeddingsHandler::new(
            sources.clone(),
            notes.clone(),
            auto(sources, notes),
        );
        let outcome = handler.execute(JobContext::new(job, repo.clone())).await;

        let JobOutcome::Failed(message) = outcome else {
            panic!("Expected failure");
        };
        assert_eq!(message, defaults::JOB_CANCELLED_MESSAGE);
    }
}
