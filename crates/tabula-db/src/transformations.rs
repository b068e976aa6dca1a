//! Transformation repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use tabula_core::{Error, Result, Transformation, TransformationRepository};

/// PostgreSQL implementation of TransformationRepository.
#[derive(Clone)]
pub struct PgTransformationRepository {
    pool: Pool<Postgres>,
}

impl PgTransformationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Transformation {
        Transformation {
            id: row.get("id"),
            name: row.get("name"),
            title: row.get("title"),
            prompt: row.get("prompt"),
            apply_default: row.get("apply_default"),
        }
    }
}

#[async_trait]
impl TransformationRepository for PgTransformationRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Transformation>> {
        let row = sqlx::query("SELECT * FROM transformation WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Transformation>> {
        let row = sqlx::query("SELECT * FROM transformation WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    async fn list(&self) -> Result<Vec<Transformation>> {
        let rows = sqlx::query("SELECT * FROM transformation ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    async fn list_defaults(&self) -> Result<Vec<Transformation>> {
        let rows = sqlx::query(
            "SELECT * FROM transformation WHERE apply_default ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }
}
