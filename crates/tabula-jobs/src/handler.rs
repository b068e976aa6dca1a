//! Command handler abstraction.
//!
//! Each background command registers one [`JobHandler`]. Handlers receive a
//! [`JobContext`] carrying the claimed job row, a progress callback wired to
//! the worker's event bus, and a cooperative cancellation check.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use tabula_core::{Error, Job, JobRepository, JobStatus, Result};

/// Progress callback type for job handlers. The fraction is in `0.0..=1.0`.
pub type ProgressCallback = Box<dyn Fn(f64, Option<&str>) + Send + Sync>;

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
    jobs: Arc<dyn JobRepository>,
    progress_callback: Option<ProgressCallback>,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(job: Job, jobs: Arc<dyn JobRepository>) -> Self {
        Self {
            job,
            jobs,
            progress_callback: None,
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(f64, Option<&str>) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Report progress: persists the fraction and notifies the callback.
    ///
    /// Persistence failures are swallowed; losing a progress tick must not
    /// fail the job.
    pub async fn report_progress(&self, fraction: f64, message: Option<&str>) {
        let fraction = fraction.clamp(0.0, 1.0);
        let _ = self.jobs.update_progress(self.job.id, fraction).await;
        if let Some(ref callback) = self.progress_callback {
            callback(fraction, message);
        }
    }

    /// Whether the job has been cancelled externally.
    ///
    /// Long-running handlers call this between work items and stop early
    /// when it returns true.
    pub async fn is_cancelled(&self) -> bool {
        matches!(
            self.jobs.get(self.job.id).await,
            Ok(Some(job)) if job.status == JobStatus::Cancelled
        )
    }

    /// Get the job id.
    pub fn job_id(&self) -> Uuid {
        self.job.id
    }

    /// Get the raw job arguments.
    pub fn args(&self) -> &JsonValue {
        &self.job.args
    }

    /// Deserialize the job arguments into a typed struct.
    pub fn parse_args<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.job.args.clone())
            .map_err(|e| Error::InvalidInput(format!("Invalid job arguments: {}", e)))
    }
}

/// Result of handler execution.
#[derive(Debug)]
pub enum JobOutcome {
    /// Command completed; the payload is stored as the job result.
    Success(JsonValue),
    /// Command failed with an error message.
    Failed(String),
}

impl JobOutcome {
    /// Build a failure outcome from any error.
    pub fn from_error(e: &Error) -> Self {
        JobOutcome::Failed(e.to_string())
    }
}

/// Trait for command handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The command name this handler processes.
    fn command_name(&self) -> &'static str;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobOutcome;
}

/// No-op handler for testing and wiring checks.
pub struct NoOpHandler {
    command_name: &'static str,
}

impl NoOpHandler {
    /// Create a new no-op handler for the given command name.
    pub fn new(command_name: &'static str) -> Self {
        Self { command_name }
    }
}

#[async_trait]
impl JobHandler for NoOpHandler {
    fn command_name(&self) -> &'static str {
        self.command_name
    }

    async fn execute(&self, ctx: JobContext) -> JobOutcome {
        ctx.report_progress(0.5, Some("Processing...")).await;
        ctx.report_progress(1.0, Some("Done")).await;
        JobOutcome::Success(serde_json::json!({ "success": true }))
    }
}
