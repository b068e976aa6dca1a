//! Note repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use tabula_core::{
    new_v7, CreateNoteRequest, Error, Note, NoteRepository, NoteType, Result,
};

/// PostgreSQL implementation of NoteRepository.
#[derive(Clone)]
pub struct PgNoteRepository {
    pool: Pool<Postgres>,
}

impl PgNoteRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Note {
        let note_type: Option<String> = row.get("note_type");
        Note {
            id: row.get("id"),
            notebook_id: row.get("notebook_id"),
            title: row.get("title"),
            content: row.get("content"),
            note_type: note_type.and_then(|t| t.parse::<NoteType>().ok()),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    async fn create(&self, req: CreateNoteRequest, embedding: Option<Vector>) -> Result<Note> {
        let id = new_v7();
        let now = Utc::now();

        let row = sqlx::query(
            "INSERT INTO note (id, notebook_id, title, content, note_type, embedding, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
             RETURNING id, notebook_id, title, content, note_type, created_at, updated_at",
        )
        .bind(id)
        .bind(req.notebook_id)
        .bind(&req.title)
        .bind(&req.content)
        .bind(req.note_type.map(|t| t.as_str()))
        .bind(&embedding)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_row(row))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Note>> {
        let row = sqlx::query(
            "SELECT id, notebook_id, title, content, note_type, created_at, updated_at
             FROM note WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    async fn list_by_notebook(&self, notebook_id: Uuid) -> Result<Vec<Note>> {
        let rows = sqlx::query(
            "SELECT id, notebook_id, title, content, note_type, created_at, updated_at
             FROM note WHERE notebook_id = $1 ORDER BY updated_at DESC",
        )
        .bind(notebook_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    async fn update(&self, note: &Note, embedding: Option<Vector>) -> Result<()> {
        // The vector column is only written when a fresh embedding is
        // supplied; updates without one keep the stored vector.
        let result = sqlx::query(
            "UPDATE note SET
                 title = $2,
                 content = $3,
                 note_type = $4,
                 embedding = COALESCE($5, embedding),
                 updated_at = $6
             WHERE id = $1",
        )
        .bind(note.id)
        .bind(&note.title)
        .bind(&note.content)
        .bind(note.note_type.map(|t| t.as_str()))
        .bind(&embedding)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("note {}", note.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM note WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn all_ids(&self) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM note ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(ids)
    }

    async fn ids_with_embedding(&self) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM note WHERE embedding IS NOT NULL ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;

        Ok(ids)
    }

    async fn save_embedding(&self, note_id: Uuid, embedding: Vector) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE note SET embedding = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(note_id)
        .bind(&embedding)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
