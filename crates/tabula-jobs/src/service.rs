//! Command service: the submission-side API of the job queue.
//!
//! Callers submit named commands with JSON arguments and poll status
//! reports. Execution happens asynchronously in the worker pool.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

use tabula_core::{Error, JobFilter, JobRepository, JobStatusReport, Result};

/// Submission-side facade over the job queue.
pub struct CommandService {
    jobs: Arc<dyn JobRepository>,
    app_name: String,
    known_commands: HashSet<String>,
}

impl CommandService {
    /// Create a service accepting the given command names.
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        app_name: impl Into<String>,
        commands: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            jobs,
            app_name: app_name.into(),
            known_commands: commands.into_iter().collect(),
        }
    }

    /// Submit a command for background execution.
    ///
    /// Unknown command names are rejected up front so a typo surfaces at
    /// submission instead of as a permanently pending job.
    pub async fn submit(&self, command_name: &str, args: JsonValue) -> Result<Uuid> {
        if !self.known_commands.contains(command_name) {
            return Err(Error::InvalidInput(format!(
                "Unknown command: {}",
                command_name
            )));
        }

        let job_id = self.jobs.submit(&self.app_name, command_name, args).await?;

        info!(
            subsystem = "jobs",
            component = "service",
            op = "submit",
            job_id = %job_id,
            command = command_name,
            "Command submitted"
        );

        Ok(job_id)
    }

    /// Get the status report for a job.
    ///
    /// An unknown id yields a Failed-shaped report with a "not found"
    /// message rather than an error; callers must check `error_message`.
    pub async fn status(&self, job_id: Uuid) -> Result<JobStatusReport> {
        Ok(match self.jobs.get(job_id).await? {
            Some(job) => JobStatusReport::from_job(&job),
            None => JobStatusReport::not_found(job_id),
        })
    }

    /// List job status reports matching the filter, newest first.
    pub async fn list(&self, filter: JobFilter) -> Result<Vec<JobStatusReport>> {
        let jobs = self.jobs.list(filter).await?;
        Ok(jobs.iter().map(JobStatusReport::from_job).collect())
    }

    /// Request cancellation of a job and return its resulting report.
    ///
    /// Cancelling a job that is already terminal leaves it unchanged.
    pub async fn cancel(&self, job_id: Uuid) -> Result<JobStatusReport> {
        let cancelled = self.jobs.cancel(job_id).await?;
        if cancelled {
            info!(
                subsystem = "jobs",
                component = "service",
                op = "cancel",
                job_id = %job_id,
                "Job cancelled"
            );
        }
        self.status(job_id).await
    }

    /// Command names this service accepts.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.known_commands.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryJobRepository;
    use serde_json::json;
    use tabula_core::{defaults, JobStatus};

    fn service(repo: Arc<InMemoryJobRepository>) -> CommandService {
        CommandService::new(
            repo,
            "tabula",
            ["process_source", "embed_item"].map(String::from),
        )
    }

    #[tokio::test]
    async fn test_submit_known_command() {
        let repo = Arc::new(InMemoryJobRepository::default());
        let svc = service(repo.clone());

        let id = svc.submit("embed_item", json!({"item_id": 1})).await.unwrap();
        let report = svc.status(id).await.unwrap();

        assert_eq!(report.status, JobStatus::Pending);
        assert_eq!(report.progress, 0.0);
        assert!(report.error_message.is_none());
    }

    #[tokio::test]
    async fn test_submit_unknown_command_rejected() {
        let repo = Arc::new(InMemoryJobRepository::default());
        let svc = service(repo);

        let err = svc.submit("reticulate_splines", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_status_unknown_job_is_failed_shaped() {
        let repo = Arc::new(InMemoryJobRepository::default());
        let svc = service(repo);

        let report = svc.status(Uuid::now_v7()).await.unwrap();
        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.error_message.as_deref(), Some("Job not found"));
        assert!(report.created_at.is_none());
    }

    #[tokio::test]
    async fn test_cancel_pending_job() {
        let repo = Arc::new(InMemoryJobRepository::default());
        let svc = service(repo);

        let id = svc.submit("embed_item", json!({})).await.unwrap();
        let report = svc.cancel(id).await.unwrap();

        assert_eq!(report.status, JobStatus::Cancelled);
        assert_eq!(
            report.error_message.as_deref(),
            Some(defaults::JOB_CANCELLED_MESSAGE)
        );
    }

    #[tokio::test]
    async fn test_cancel_completed_job_is_noop() {
        let repo = Arc::new(InMemoryJobRepository::default());
        let svc = service(repo.clone());

        let id = svc.submit("embed_item", json!({})).await.unwrap();
        repo.claim_next(&[]).await.unwrap();
        repo.update_status(
            id,
            tabula_core::StatusUpdate::status(JobStatus::Completed)
                .with_result(json!({"ok": true})),
        )
        .await
        .unwrap();

        let report = svc.cancel(id).await.unwrap();
        assert_eq!(report.status, JobStatus::Completed);
        assert!(report.error_message.is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let repo = Arc::new(InMemoryJobRepository::default());
        let svc = service(repo);

        let first = svc.submit("embed_item", json!({})).await.unwrap();
        let second = svc.submit("process_source", json!({})).await.unwrap();

        let reports = svc.list(JobFilter::default()).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].job_id, second);
        assert_eq!(reports[1].job_id, first);
    }
}
