//! Source ingestion handler.
//!
//! Runs the content ingestion workflow against a source: text extraction,
//! transformation passes producing insights, and optional chunked
//! vectorization of the full text.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use tabula_core::{
    Error, IngestionPipeline, ProcessingStatus, SourceRepository, Transformation,
    TransformationRepository,
};

use crate::embedding::Embedder;
use crate::handler::{JobContext, JobHandler, JobOutcome};

#[derive(Debug, Deserialize)]
struct ProcessSourceArgs {
    source_id: Uuid,
    /// Transformation names to apply. Empty means the configured defaults.
    #[serde(default)]
    transformations: Vec<String>,
    /// Whether to chunk and embed the extracted full text.
    #[serde(default)]
    vectorize: bool,
}

/// Handler for the `process_source` command.
pub struct ProcessSourceHandler {
    sources: Arc<dyn SourceRepository>,
    transformations: Arc<dyn TransformationRepository>,
    pipeline: Arc<dyn IngestionPipeline>,
    embedder: Arc<Embedder>,
}

impl ProcessSourceHandler {
    pub fn new(
        sources: Arc<dyn SourceRepository>,
        transformations: Arc<dyn TransformationRepository>,
        pipeline: Arc<dyn IngestionPipeline>,
        embedder: Arc<Embedder>,
    ) -> Self {
        Self {
            sources,
            transformations,
            pipeline,
            embedder,
        }
    }

    /// Resolve the transformation list for a run.
    ///
    /// Named transformations are resolved strictly: a name without a row is
    /// an error so a typo fails the job instead of silently skipping a pass.
    async fn resolve_transformations(
        &self,
        names: &[String],
    ) -> Result<Vec<Transformation>, Error> {
        if names.is_empty() {
            return self.transformations.list_defaults().await;
        }

        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            match self.transformations.get_by_name(name).await? {
                Some(t) => resolved.push(t),
                None => {
                    return Err(Error::NotFound(format!("transformation '{}'", name)));
                }
            }
        }
        Ok(resolved)
    }

    async fn mark_failed(&self, source_id: Uuid) {
        if let Err(e) = self
            .sources
            .set_processing_status(source_id, ProcessingStatus::Failed)
            .await
        {
            warn!(error = ?e, %source_id, "Failed to mark source as failed");
        }
    }
}

#[async_trait]
impl JobHandler for ProcessSourceHandler {
    fn command_name(&self) -> &'static str {
        "process_source"
    }

    async fn execute(&self, ctx: JobContext) -> JobOutcome {
        let start = Instant::now();

        let args: ProcessSourceArgs = match ctx.parse_args() {
            Ok(args) => args,
            Err(e) => return JobOutcome::from_error(&e),
        };
        let source_id = args.source_id;

        let source = match self.sources.get(source_id).await {
            Ok(Some(source)) => source,
            Ok(None) => {
                return JobOutcome::Failed(format!("Source not found: {}", source_id));
            }
            Err(e) => return JobOutcome::from_error(&e),
        };

        if let Err(e) = self
            .sources
            .set_processing_status(source_id, ProcessingStatus::InProgress)
            .await
        {
            return JobOutcome::from_error(&e);
        }
        ctx.report_progress(0.1, Some("Resolving transformations")).await;

        let transformations = match self.resolve_transformations(&args.transformations).await {
            Ok(transformations) => transformations,
            Err(e) => {
                self.mark_failed(source_id).await;
                return JobOutcome::from_error(&e);
            }
        };

        ctx.report_progress(0.2, Some("Running ingestion")).await;
        let output = match self.pipeline.run(&source, &transformations).await {
            Ok(output) => output,
            Err(e) => {
                self.mark_failed(source_id).await;
                return JobOutcome::from_error(&e);
            }
        };

        // Fold extraction results back into the source row.
        let mut updated = source.clone();
        if let Some(title) = output.title {
            updated.title = Some(title);
        }
        if let Some(full_text) = output.full_text {
            updated.full_text = Some(full_text);
        }
        if let Err(e) = self.sources.update(&updated).await {
            self.mark_failed(source_id).await;
            return JobOutcome::from_error(&e);
        }

        ctx.report_progress(0.5, Some("Storing insights")).await;
        let mut insight_count = 0usize;
        for (insight_type, content) in &output.insights {
            let insight = match self.sources.add_insight(source_id, insight_type, content).await {
                Ok(insight) => insight,
                Err(e) => {
                    self.mark_failed(source_id).await;
                    return JobOutcome::from_error(&e);
                }
            };
            insight_count += 1;

            // Insight embeddings are best-effort. A missing embedding model
            // must not fail ingestion.
            if let Some(text) = insight.embedding_content() {
                match self.embedder.embed_one(text).await {
                    Ok(vector) => {
                        if let Err(e) = self
                            .sources
                            .save_insight_embedding(insight.id, vector)
                            .await
                        {
                            warn!(error = ?e, insight_id = %insight.id, "Failed to save insight embedding");
                        }
                    }
                    Err(e) => {
                        warn!(error = ?e, insight_id = %insight.id, "Skipping insight embedding");
                    }
                }
            }
        }

        let mut embedded_chunks = 0usize;
        if args.vectorize {
            ctx.report_progress(0.7, Some("Embedding chunks")).await;
            let full_text = updated.full_text.as_deref().unwrap_or("");
            match self.embedder.vectorize(full_text).await {
                Ok(rows) => match self.sources.replace_embeddings(source_id, rows).await {
                    Ok(count) => embedded_chunks = count,
                    Err(e) => {
                        self.mark_failed(source_id).await;
                        return JobOutcome::from_error(&e);
                    }
                },
                Err(e) => {
                    self.mark_failed(source_id).await;
                    return JobOutcome::from_error(&e);
                }
            }
        }

        if let Err(e) = self
            .sources
            .set_processing_status(source_id, ProcessingStatus::Completed)
            .await
        {
            return JobOutcome::from_error(&e);
        }
        ctx.report_progress(1.0, Some("Done")).await;

        let applied: Vec<&str> = transformations.iter().map(|t| t.name.as_str()).collect();
        info!(
            %source_id,
            transformations = applied.len(),
            insight_count,
            embedded_chunks,
            duration_ms = start.elapsed().as_millis() as u64,
            "Source processed"
        );

        JobOutcome::Success(json!({
            "success": true,
            "source_id": source_id,
            "applied_transformations": applied,
            "insight_count": insight_count,
            "embedded_chunks": embedded_chunks,
            "processing_time_ms": start.elapsed().as_millis() as u64,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::FixedEmbeddingProvider;
    use crate::testing::{
        make_job, InMemorySourceRepository, InMemoryTransformationRepository,
        StubIngestionPipeline,
    };
    use serde_json::json;
    use std::sync::Arc;
    use tabula_core::{CreateSourceRequest, EmbeddingBackend, JobRepository};
    use tabula_inference::MockEmbeddingBackend;

    fn embedder() -> Arc<Embedder> {
        let backend: Arc<dyn EmbeddingBackend> = Arc::new(MockEmbeddingBackend::new(8));
        Arc::new(Embedder::new(Arc::new(FixedEmbeddingProvider::new(backend))))
    }

    async fn seed_source(sources: &InMemorySourceRepository) -> Uuid {
        sources
            .create(CreateSourceRequest {
                notebook_id: uuid::Uuid::now_v7(),
                asset: None,
                title: None,
                topics: vec![],
                full_text: None,
            })
            .await
            .unwrap()
            .id
    }

    fn jobs() -> Arc<dyn JobRepository> {
        Arc::new(crate::testing::InMemoryJobRepository::default())
    }

    #[tokio::test]
    async fn test_process_source_applies_defaults_and_completes() {
        let sources = Arc::new(InMemorySourceRepository::default());
        let transformations = Arc::new(InMemoryTransformationRepository::default());
        transformations.add("summary", true);
        transformations.add("key_points", true);
        transformations.add("manual_only", false);

        let source_id = seed_source(&sources).await;
        let handler = ProcessSourceHandler::new(
            sources.clone(),
            transformations,
            Arc::new(StubIngestionPipeline::succeeding("Extracted body text.")),
            embedder(),
        );

        let job = make_job("process_source", json!({ "source_id": source_id }));
        let outcome = handler.execute(JobContext::new(job, jobs())).await;

        let JobOutcome::Success(result) = outcome else {
            panic!("Expected success");
        };
        assert_eq!(result["insight_count"], 2);
        assert_eq!(result["embedded_chunks"], 0);

        let source = sources.get(source_id).await.unwrap().unwrap();
        assert_eq!(source.processing_status, ProcessingStatus::Completed);
        assert_eq!(source.full_text.as_deref(), Some("Extracted body text."));
        assert_eq!(sources.list_insights(source_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_process_source_vectorize_stores_chunks() {
        let sources = Arc::new(InMemorySourceRepository::default());
        let transformations = Arc::new(InMemoryTransformationRepository::default());
        let source_id = seed_source(&sources).await;

        let handler = ProcessSourceHandler::new(
            sources.clone(),
            transformations,
            Arc::new(StubIngestionPipeline::succeeding("Short body.")),
            embedder(),
        );

        let job = make_job(
            "process_source",
            json!({ "source_id": source_id, "vectorize": true }),
        );
        let outcome = handler.execute(JobContext::new(job, jobs())).await;

        let JobOutcome::Success(result) = outcome else {
            panic!("Expected success");
        };
        assert_eq!(result["embedded_chunks"], 1);
        assert_eq!(
            sources.embedded_chunk_count(source_id).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_process_source_unknown_transformation_fails_source() {
        let sources = Arc::new(InMemorySourceRepository::default());
        let transformations = Arc::new(InMemoryTransformationRepository::default());
        let source_id = seed_source(&sources).await;

        let handler = ProcessSourceHandler::new(
            sources.clone(),
            transformations,
            Arc::new(StubIngestionPipeline::succeeding("text")),
            embedder(),
        );

        let job = make_job(
            "process_source",
            json!({ "source_id": source_id, "transformations": ["no_such"] }),
        );
        let outcome = handler.execute(JobContext::new(job, jobs())).await;

        assert!(matches!(outcome, JobOutcome::Failed(_)));
        let source = sources.get(source_id).await.unwrap().unwrap();
        assert_eq!(source.processing_status, ProcessingStatus::Failed);
    }

    #[tokio::test]
    async fn test_process_source_missing_source_fails() {
        let handler = ProcessSourceHandler::new(
            Arc::new(InMemorySourceRepository::default()),
            Arc::new(InMemoryTransformationRepository::default()),
            Arc::new(StubIngestionPipeline::succeeding("text")),
            embedder(),
        );

        let job = make_job("process_source", json!({ "source_id": uuid::Uuid::now_v7() }));
        let outcome = handler.execute(JobContext::new(job, jobs())).await;

        let JobOutcome::Failed(message) = outcome else {
            panic!("Expected failure");
        };
        assert!(message.contains("Source not found"));
    }

    #[tokio::test]
    async fn test_process_source_pipeline_failure_marks_source() {
        let sources = Arc::new(InMemorySourceRepository::default());
        let source_id = seed_source(&sources).await;

        let handler = ProcessSourceHandler::new(
            sources.clone(),
            Arc::new(InMemoryTransformationRepository::default()),
            Arc::new(StubIngestionPipeline::failing("extraction crashed")),
            embedder(),
        );

        let job = make_job("process_source", json!({ "source_id": source_id }));
        let outcome = handler.execute(JobContext::new(job, jobs())).await;

        let JobOutcome::Failed(message) = outcome else {
            panic!("Expected failure");
        };
        assert!(message.contains("extraction crashed"));
        let source = sources.get(source_id).await.unwrap().unwrap();
        assert_eq!(source.processing_status, ProcessingStatus::Failed);
    }

    #[tokio::test]
    async fn test_process_source_missing_embedding_model_does_not_fail_job() {
        let sources = Arc::new(InMemorySourceRepository::default());
        let transformations = Arc::new(InMemoryTransformationRepository::default());
        transformations.add("summary", true);
        let source_id = seed_source(&sources).await;

        let backend: Arc<dyn EmbeddingBackend> =
            Arc::new(MockEmbeddingBackend::failing("no embedding model"));
        let embedder = Arc::new(Embedder::new(Arc::new(FixedEmbeddingProvider::new(backend))));

        let handler = ProcessSourceHandler::new(
            sources.clone(),
            transformations,
            Arc::new(StubIngestionPipeline::succeeding("body")),
            embedder,
        );

        let job = make_job("process_source", json!({ "source_id": source_id }));
        let outcome = handler.execute(JobContext::new(job, jobs())).await;

        assert!(matches!(outcome, JobOutcome::Success(_)));
        let insights = sources.list_insights(source_id).await.unwrap();
        assert_eq!(insights.len(), 1);
        assert!(sources.insight_vector(insights[0].id).is_none());
    }
}
