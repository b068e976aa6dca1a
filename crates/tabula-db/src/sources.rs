//! Source repository implementation.
//!
//! Sources own two kinds of derived rows: embedded chunks in
//! `source_embedding` and transformation outputs in `source_insight`. Both
//! are deleted along with their source.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use tabula_core::{
    defaults, new_v7, Asset, CreateSourceRequest, Error, NewSourceEmbedding, ProcessingStatus,
    Result, Source, SourceInsight, SourceRepository,
};

/// Resolve a stored asset path to a filesystem location.
///
/// Absolute paths are used as-is; relative paths live under the data
/// directory (`TABULA_DATA_DIR`, falling back to the built-in default).
fn asset_path(file_path: &str) -> PathBuf {
    let path = Path::new(file_path);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let data_dir = std::env::var("TABULA_DATA_DIR")
        .unwrap_or_else(|_| defaults::DATA_DIR.to_string());
    Path::new(&data_dir).join(path)
}

/// Remove a source's uploaded file, best effort.
///
/// The database row is already gone by the time this runs; a failure here
/// leaves a stray file, never a broken source.
async fn remove_asset_file(source_id: Uuid, file_path: &str) {
    let path = asset_path(file_path);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => debug!(
            subsystem = "db",
            component = "sources",
            op = "delete",
            source_id = %source_id,
            path = %path.display(),
            "Removed uploaded asset file"
        ),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            subsystem = "db",
            component = "sources",
            op = "delete",
            source_id = %source_id,
            path = %path.display(),
            error = %e,
            "Failed to remove uploaded asset file"
        ),
    }
}

/// PostgreSQL implementation of SourceRepository.
#[derive(Clone)]
pub struct PgSourceRepository {
    pool: Pool<Postgres>,
}

impl PgSourceRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Source {
        let status: String = row.get("processing_status");
        let file_path: Option<String> = row.get("asset_file_path");
        let url: Option<String> = row.get("asset_url");
        let asset = if file_path.is_some() || url.is_some() {
            Some(Asset { file_path, url })
        } else {
            None
        };

        Source {
            id: row.get("id"),
            notebook_id: row.get("notebook_id"),
            asset,
            title: row.get("title"),
            topics: row.get("topics"),
            full_text: row.get("full_text"),
            processing_status: status.parse().unwrap_or(ProcessingStatus::Pending),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    fn parse_insight_row(row: sqlx::postgres::PgRow) -> SourceInsight {
        SourceInsight {
            id: row.get("id"),
            source_id: row.get("source_id"),
            insight_type: row.get("insight_type"),
            content: row.get("content"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl SourceRepository for PgSourceRepository {
    async fn create(&self, req: CreateSourceRequest) -> Result<Source> {
        let id = new_v7();
        let now = Utc::now();
        let asset = req.asset.unwrap_or_default();

        let row = sqlx::query(
            "INSERT INTO source
                 (id, notebook_id, asset_file_path, asset_url, title, topics, full_text,
                  processing_status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $8)
             RETURNING *",
        )
        .bind(id)
        .bind(req.notebook_id)
        .bind(&asset.file_path)
        .bind(&asset.url)
        .bind(&req.title)
        .bind(&req.topics)
        .bind(&req.full_text)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_row(row))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Source>> {
        let row = sqlx::query("SELECT * FROM source WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    async fn list_by_notebook(&self, notebook_id: Uuid) -> Result<Vec<Source>> {
        let rows = sqlx::query(
            "SELECT * FROM source WHERE notebook_id = $1 ORDER BY created_at DESC",
        )
        .bind(notebook_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    async fn update(&self, source: &Source) -> Result<()> {
        let asset = source.asset.clone().unwrap_or_default();

        let result = sqlx::query(
            "UPDATE source SET
                 asset_file_path = $2,
                 asset_url = $3,
                 title = $4,
                 topics = $5,
                 full_text = $6,
                 processing_status = $7,
                 updated_at = $8
             WHERE id = $1",
        )
        .bind(source.id)
        .bind(&asset.file_path)
        .bind(&asset.url)
        .bind(&source.title)
        .bind(&source.topics)
        .bind(&source.full_text)
        .bind(source.processing_status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("source {}", source.id)));
        }
        Ok(())
    }

    async fn set_processing_status(&self, id: Uuid, status: ProcessingStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE source SET processing_status = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let file_path: Option<String> =
            sqlx::query_scalar("SELECT asset_file_path FROM source WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?
                .flatten();

        // Derived rows go first so a crash mid-delete never leaves orphans
        // pointing at a missing source.
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("DELETE FROM source_embedding WHERE source_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        sqlx::query("DELETE FROM source_insight WHERE source_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let result = sqlx::query("DELETE FROM source WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            if let Some(ref file_path) = file_path {
                remove_asset_file(id, file_path).await;
            }
        }

        Ok(deleted)
    }

    async fn replace_embeddings(
        &self,
        source_id: Uuid,
        chunks: Vec<NewSourceEmbedding>,
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("DELETE FROM source_embedding WHERE source_id = $1")
            .bind(source_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let count = chunks.len();
        for chunk in chunks {
            sqlx::query(
                "INSERT INTO source_embedding (id, source_id, content, embedding)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(new_v7())
            .bind(source_id)
            .bind(&chunk.content)
            .bind(&chunk.embedding)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "sources",
            op = "replace_embeddings",
            source_id = %source_id,
            chunk_count = count,
            "Replaced source embeddings"
        );

        Ok(count)
    }

    async fn embedded_chunk_count(&self, source_id: Uuid) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM source_embedding WHERE source_id = $1")
                .bind(source_id)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;

        Ok(count)
    }

    async fn ids_with_text(&self) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM source
             WHERE full_text IS NOT NULL AND length(trim(full_text)) > 0
             ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(ids)
    }

    async fn ids_with_embeddings(&self) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT DISTINCT source_id FROM source_embedding ORDER BY source_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(ids)
    }

    async fn add_insight(
        &self,
        source_id: Uuid,
        insight_type: &str,
        content: &str,
    ) -> Result<SourceInsight> {
        let id = new_v7();
        let now = Utc::now();

        let row = sqlx::query(
            "INSERT INTO source_insight (id, source_id, insight_type, content, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             RETURNING id, source_id, insight_type, content, created_at, updated_at",
        )
        .bind(id)
        .bind(source_id)
        .bind(insight_type)
        .bind(content)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_insight_row(row))
    }

    async fn get_insight(&self, id: Uuid) -> Result<Option<SourceInsight>> {
        let row = sqlx::query(
            "SELECT id, source_id, insight_type, content, created_at, updated_at
             FROM source_insight WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_insight_row))
    }

    async fn list_insights(&self, source_id: Uuid) -> Result<Vec<SourceInsight>> {
        let rows = sqlx::query(
            "SELECT id, source_id, insight_type, content, created_at, updated_at
             FROM source_insight WHERE source_id = $1 ORDER BY created_at ASC",
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_insight_row).collect())
    }

    async fn insight_ids(&self) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM source_insight ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(ids)
    }

    async fn insight_ids_with_embedding(&self) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM source_insight WHERE embedding IS NOT NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(ids)
    }

    async fn save_insight_embedding(&self, insight_id: Uuid, embedding: Vector) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE source_insight SET embedding = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(insight_id)
        .bind(&embedding)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
