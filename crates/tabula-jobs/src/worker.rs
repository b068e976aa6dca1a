//! Job worker and runner for processing background commands.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, Notify, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use tabula_core::{defaults, Job, JobRepository, JobStatus, Result, StatusUpdate};

use crate::handler::{JobContext, JobHandler, JobOutcome};

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrent jobs.
    pub max_concurrent_jobs: usize,
    /// Whether to enable job processing.
    pub enabled: bool,
    /// Per-job execution timeout in seconds.
    pub job_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::JOB_POLL_INTERVAL_MS,
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            enabled: true,
            job_timeout_secs: defaults::JOB_TIMEOUT_SECS,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_MAX_CONCURRENT` | `4` | Max concurrent jobs |
    /// | `JOB_POLL_INTERVAL_MS` | `500` | Polling interval when queue is empty |
    /// | `JOB_TIMEOUT_SECS` | `600` | Per-job execution timeout |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_jobs = std::env::var("JOB_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::JOB_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_POLL_INTERVAL_MS);

        let job_timeout_secs = std::env::var("JOB_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_TIMEOUT_SECS)
            .max(1);

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            enabled,
            job_timeout_secs,
        }
    }

    /// Create a new config with custom poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set maximum concurrent jobs.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the per-job timeout.
    pub fn with_job_timeout(mut self, secs: u64) -> Self {
        self.job_timeout_secs = secs;
        self
    }
}

/// Event emitted by the job worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A job was started.
    JobStarted { job_id: Uuid, command: String },
    /// Job progress was updated.
    JobProgress {
        job_id: Uuid,
        fraction: f64,
        message: Option<String>,
    },
    /// A job completed successfully.
    JobCompleted { job_id: Uuid, command: String },
    /// A job failed.
    JobFailed {
        job_id: Uuid,
        command: String,
        error: String,
    },
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| tabula_core::Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Job worker that processes commands from the queue.
pub struct JobWorker {
    jobs: Arc<dyn JobRepository>,
    config: WorkerConfig,
    handlers: Arc<RwLock<HashMap<String, Arc<dyn JobHandler>>>>,
    event_tx: broadcast::Sender<WorkerEvent>,
    wake: Option<Arc<Notify>>,
}

impl JobWorker {
    /// Create a new job worker.
    pub fn new(jobs: Arc<dyn JobRepository>, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            jobs,
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            wake: None,
        }
    }

    /// Attach a submission wake handle so the worker reacts to new jobs
    /// without waiting out the poll interval.
    pub fn with_wake(mut self, wake: Arc<Notify>) -> Self {
        self.wake = Some(wake);
        self
    }

    /// Register a handler for a command name.
    pub async fn register_handler<H: JobHandler + 'static>(&self, handler: H) {
        let command = handler.command_name();
        let mut handlers = self.handlers.write().await;
        handlers.insert(command.to_string(), Arc::new(handler));
        debug!(command, "Registered command handler");
    }

    /// Command names with a registered handler.
    pub async fn registered_commands(&self) -> Vec<String> {
        let handlers = self.handlers.read().await;
        handlers.keys().cloned().collect()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let worker = Arc::new(self);
        let worker_clone = worker.clone();

        tokio::spawn(async move {
            worker_clone.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Run the worker loop with concurrent job processing.
    ///
    /// Claims up to `max_concurrent_jobs` at a time and processes them
    /// concurrently. Only sleeps when the queue is empty.
    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            job_timeout_secs = self.config.job_timeout_secs,
            "Job worker started"
        );

        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let max_concurrent = self.config.max_concurrent_jobs;

        loop {
            // Check for shutdown before claiming jobs
            if shutdown_rx.try_recv().is_ok() {
                info!("Job worker received shutdown signal");
                break;
            }

            // Claim up to max_concurrent jobs
            let mut claimed = 0;
            let mut tasks = tokio::task::JoinSet::new();

            for _ in 0..max_concurrent {
                match self.claim_job().await {
                    Some(job) => {
                        claimed += 1;
                        let worker = self.clone_refs();
                        tasks.spawn(async move {
                            worker.execute_job(job).await;
                        });
                    }
                    None => break,
                }
            }

            if claimed == 0 {
                // Queue empty: wait for a submission wake, the poll
                // interval, or shutdown, whichever comes first.
                if let Some(ref wake) = self.wake {
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            info!("Job worker received shutdown signal");
                            break;
                        }
                        _ = wake.notified() => {}
                        _ = sleep(poll_interval) => {}
                    }
                } else {
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            info!("Job worker received shutdown signal");
                            break;
                        }
                        _ = sleep(poll_interval) => {}
                    }
                }
            } else {
                debug!(claimed, "Processing concurrent job batch");
                // Wait for all claimed jobs to complete
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "Job task panicked");
                    }
                }
                // No sleep: immediately try to claim more jobs
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Job worker stopped");
    }

    /// Claim the next available job without processing it.
    ///
    /// Only jobs whose command has a registered handler are claimed;
    /// other workers may serve the rest.
    async fn claim_job(&self) -> Option<Job> {
        let commands: Vec<String> = {
            let handlers = self.handlers.read().await;
            handlers.keys().cloned().collect()
        };
        if commands.is_empty() {
            return None;
        }

        match self.jobs.claim_next(&commands).await {
            Ok(Some(job)) => Some(job),
            Ok(None) => None,
            Err(e) => {
                error!(error = ?e, "Failed to claim job");
                None
            }
        }
    }

    /// Clone references needed for spawned job tasks.
    fn clone_refs(&self) -> JobWorkerRef {
        JobWorkerRef {
            jobs: self.jobs.clone(),
            handlers: self.handlers.clone(),
            event_tx: self.event_tx.clone(),
            job_timeout_secs: self.config.job_timeout_secs,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Get the pending job count.
    pub async fn pending_count(&self) -> Result<i64> {
        self.jobs.pending_count().await
    }
}

/// Lightweight reference bundle for executing a single job in a spawned task.
struct JobWorkerRef {
    jobs: Arc<dyn JobRepository>,
    handlers: Arc<RwLock<HashMap<String, Arc<dyn JobHandler>>>>,
    event_tx: broadcast::Sender<WorkerEvent>,
    job_timeout_secs: u64,
}

impl JobWorkerRef {
    /// Execute a single claimed job.
    async fn execute_job(self, job: Job) {
        let start = Instant::now();
        let job_id = job.id;
        let command = job.command_name.clone();

        info!(%job_id, command, "Processing job");

        let _ = self.event_tx.send(WorkerEvent::JobStarted {
            job_id,
            command: command.clone(),
        });

        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&command).cloned()
        };

        let outcome = match handler {
            Some(handler) => {
                let event_tx = self.event_tx.clone();
                let ctx = JobContext::new(job, self.jobs.clone()).with_progress_callback(
                    move |fraction, message| {
                        let _ = event_tx.send(WorkerEvent::JobProgress {
                            job_id,
                            fraction,
                            message: message.map(String::from),
                        });
                    },
                );

                let job_timeout = Duration::from_secs(self.job_timeout_secs);
                match tokio::time::timeout(job_timeout, handler.execute(ctx)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(
                            %job_id,
                            command,
                            "Job exceeded timeout of {}s",
                            self.job_timeout_secs
                        );
                        JobOutcome::Failed(format!(
                            "Job exceeded timeout of {}s",
                            self.job_timeout_secs
                        ))
                    }
                }
            }
            None => {
                warn!(command, "No handler registered for command");
                JobOutcome::Failed(format!("No handler for command: {}", command))
            }
        };

        match outcome {
            JobOutcome::Success(result_data) => {
                let update = StatusUpdate::status(JobStatus::Completed)
                    .with_result(result_data)
                    .with_progress(1.0);
                match self.jobs.update_status(job_id, update).await {
                    Err(e) => {
                        error!(error = ?e, %job_id, "Failed to mark job as completed");
                    }
                    Ok(false) => {
                        // The job reached a terminal state while running,
                        // almost always an external cancel. The late result
                        // is dropped.
                        info!(%job_id, command, "Job finished after external cancellation");
                    }
                    Ok(true) => {
                        info!(
                            %job_id,
                            command,
                            duration_ms = start.elapsed().as_millis() as u64,
                            "Job completed successfully"
                        );
                        let _ = self
                            .event_tx
                            .send(WorkerEvent::JobCompleted { job_id, command });
                    }
                }
            }
            JobOutcome::Failed(error) => {
                let update =
                    StatusUpdate::status(JobStatus::Failed).with_error(error.clone());
                match self.jobs.update_status(job_id, update).await {
                    Err(e) => {
                        error!(error = ?e, %job_id, "Failed to mark job as failed");
                    }
                    Ok(false) => {
                        info!(%job_id, command, "Job failed after external cancellation");
                    }
                    Ok(true) => {
                        warn!(
                            %job_id,
                            command,
                            %error,
                            duration_ms = start.elapsed().as_millis() as u64,
                            "Job failed"
                        );
                        let _ = self.event_tx.send(WorkerEvent::JobFailed {
                            job_id,
                            command,
                            error,
                        });
                    }
                }
            }
        }
    }
}

/// Builder for creating a job worker with handlers.
pub struct WorkerBuilder {
    jobs: Arc<dyn JobRepository>,
    config: WorkerConfig,
    handlers: Vec<Box<dyn JobHandler>>,
    wake: Option<Arc<Notify>>,
}

impl WorkerBuilder {
    /// Create a new worker builder.
    pub fn new(jobs: Arc<dyn JobRepository>) -> Self {
        Self {
            jobs,
            config: WorkerConfig::default(),
            handlers: Vec::new(),
            wake: None,
        }
    }

    /// Set the worker configuration.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a handler.
    pub fn with_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Attach a submission wake handle.
    pub fn with_wake(mut self, wake: Arc<Notify>) -> Self {
        self.wake = Some(wake);
        self
    }

    /// Build and return the worker.
    pub async fn build(self) -> JobWorker {
        let mut worker = JobWorker::new(self.jobs, self.config);
        if let Some(wake) = self.wake {
            worker = worker.with_wake(wake);
        }

        for handler in self.handlers {
            let command = handler.command_name();
            let mut handlers = worker.handlers.write().await;
            handlers.insert(command.to_string(), Arc::from(handler));
        }

        worker
    }
}
