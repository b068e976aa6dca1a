//! Job queue repository implementation.
//!
//! Jobs are plain rows in the `job` table. Claiming uses `FOR UPDATE SKIP
//! LOCKED` so any number of workers can poll the same queue without handing
//! out a job twice.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use tabula_core::{
    defaults, new_v7, Error, Job, JobFilter, JobRepository, JobStatus, Result, StatusUpdate,
};

/// PostgreSQL implementation of JobRepository.
pub struct PgJobRepository {
    pool: Pool<Postgres>,
    /// Notify handle for event-driven worker wake.
    notify: Arc<Notify>,
}

impl PgJobRepository {
    /// Create a new PgJobRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Create a new PgJobRepository sharing an existing notify handle.
    pub fn with_notify(pool: Pool<Postgres>, notify: Arc<Notify>) -> Self {
        Self { pool, notify }
    }

    /// Get the job notification handle for event-driven waking.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Parse a job row into a Job struct.
    fn parse_job_row(row: sqlx::postgres::PgRow) -> Job {
        let status: String = row.get("status");
        Job {
            id: row.get("id"),
            app_name: row.get("app_name"),
            command_name: row.get("command_name"),
            args: row.get("args"),
            status: status.parse().unwrap_or(JobStatus::Pending),
            progress: row.get("progress"),
            result: row.get("result"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

impl Clone for PgJobRepository {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            notify: self.notify.clone(),
        }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn submit(
        &self,
        app_name: &str,
        command_name: &str,
        args: JsonValue,
    ) -> Result<Uuid> {
        let job_id = new_v7();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO job (id, app_name, command_name, args, status, progress, created_at, updated_at)
             VALUES ($1, $2, $3, $4, 'pending', 0.0, $5, $5)",
        )
        .bind(job_id)
        .bind(app_name)
        .bind(command_name)
        .bind(&args)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "jobs",
            op = "submit",
            job_id = %job_id,
            command = command_name,
            "Job submitted"
        );

        self.notify.notify_waiters();
        Ok(job_id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query("SELECT * FROM job WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }

    async fn update_status(&self, id: Uuid, update: StatusUpdate) -> Result<bool> {
        // Rows in a terminal state are never touched, so a late handler
        // write cannot resurrect a cancelled job.
        let result = sqlx::query(
            "UPDATE job SET
                 status = COALESCE($2, status),
                 result = COALESCE($3, result),
                 error_message = COALESCE($4, error_message),
                 progress = COALESCE($5, progress),
                 updated_at = $6
             WHERE id = $1
               AND status NOT IN ('completed', 'failed', 'cancelled')",
        )
        .bind(id)
        .bind(update.status.map(|s| s.as_str()))
        .bind(&update.result)
        .bind(&update.error_message)
        .bind(update.progress)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
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
        let mut qb = sqlx::QueryBuilder::<Postgres>::new("SELECT * FROM job WHERE TRUE");

        if let Some(app_name) = &filter.app_name {
            qb.push(" AND app_name = ").push_bind(app_name);
        }
        if let Some(command_name) = &filter.command_name {
            qb.push(" AND command_name = ").push_bind(command_name);
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }

        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_job_row).collect())
    }

    async fn cancel(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE job SET
                 status = 'cancelled',
                 error_message = $2,
                 updated_at = $3
             WHERE id = $1
               AND status NOT IN ('completed', 'failed', 'cancelled')",
        )
        .bind(id)
        .bind(defaults::JOB_CANCELLED_MESSAGE)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn claim_next(&self, commands: &[String]) -> Result<Option<Job>> {
        // Oldest pending job first; SKIP LOCKED prevents double-claims when
        // multiple workers poll concurrently. An empty command list claims
        // any command.
        let row = sqlx::query(
            "UPDATE job SET status = 'in_progress', updated_at = $1
             WHERE id = (
                 SELECT id FROM job
                 WHERE status = 'pending'
                   AND (cardinality($2::text[]) = 0 OR command_name = ANY($2))
                 ORDER BY created_at ASC, id ASC
                 FOR UPDATE SKIP LOCKED
                 LIMIT 1
             )
             RETURNING *",
        )
        .bind(Utc::now())
        .bind(commands)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(count)
    }
}
