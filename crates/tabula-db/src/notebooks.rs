//! Notebook repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use tabula_core::{
    new_v7, CreateNotebookRequest, Error, Notebook, NotebookRepository, Result,
};

/// PostgreSQL implementation of NotebookRepository.
#[derive(Clone)]
pub struct PgNotebookRepository {
    pool: Pool<Postgres>,
}

impl PgNotebookRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Notebook {
        Notebook {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            archived: row.get("archived"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl NotebookRepository for PgNotebookRepository {
    async fn create(&self, req: CreateNotebookRequest) -> Result<Notebook> {
        if req.name.trim().is_empty() {
            return Err(Error::InvalidInput("Notebook name cannot be empty".into()));
        }

        let id = new_v7();
        let now = Utc::now();

        let row = sqlx::query(
            "INSERT INTO notebook (id, name, description, archived, created_at, updated_at)
             VALUES ($1, $2, $3, FALSE, $4, $4)
             RETURNING *",
        )
        .bind(id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_row(row))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Notebook>> {
        let row = sqlx::query("SELECT * FROM notebook WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    async fn list(&self, include_archived: bool) -> Result<Vec<Notebook>> {
        let rows = sqlx::query(
            "SELECT * FROM notebook
             WHERE ($1 OR NOT archived)
             ORDER BY updated_at DESC",
        )
        .bind(include_archived)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    async fn update(&self, notebook: &Notebook) -> Result<()> {
        let result = sqlx::query(
            "UPDATE notebook SET name = $2, description = $3, archived = $4, updated_at = $5
             WHERE id = $1",
        )
        .bind(notebook.id)
        .bind(&notebook.name)
        .bind(&notebook.description)
        .bind(notebook.archived)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("notebook {}", notebook.id)));
        }
        Ok(())
    }

    async fn set_archived(&self, id: Uuid, archived: bool) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notebook SET archived = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(archived)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notebook WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
