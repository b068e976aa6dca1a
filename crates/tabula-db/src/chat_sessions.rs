//! Chat session repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use tabula_core::{
    new_v7, ChatSession, ChatSessionRepository, CreateChatSessionRequest, Error, Result,
};

/// PostgreSQL implementation of ChatSessionRepository.
#[derive(Clone)]
pub struct PgChatSessionRepository {
    pool: Pool<Postgres>,
}

impl PgChatSessionRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> ChatSession {
        ChatSession {
            id: row.get("id"),
            notebook_id: row.get("notebook_id"),
            source_id: row.get("source_id"),
            title: row.get("title"),
            model_override: row.get("model_override"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl ChatSessionRepository for PgChatSessionRepository {
    async fn create(&self, req: CreateChatSessionRequest) -> Result<ChatSession> {
        if req.notebook_id.is_none() && req.source_id.is_none() {
            return Err(Error::InvalidInput(
                "Chat session requires a notebook or a source".into(),
            ));
        }

        let id = new_v7();
        let now = Utc::now();

        let row = sqlx::query(
            "INSERT INTO chat_session (id, notebook_id, source_id, title, model_override, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6)
             RETURNING *",
        )
        .bind(id)
        .bind(req.notebook_id)
        .bind(req.source_id)
        .bind(&req.title)
        .bind(&req.model_override)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_row(row))
    }

    async fn get(&self, id: Uuid) -> Result<Option<ChatSession>> {
        let row = sqlx::query("SELECT * FROM chat_session WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    async fn list_by_notebook(&self, notebook_id: Uuid) -> Result<Vec<ChatSession>> {
        let rows = sqlx::query(
            "SELECT * FROM chat_session WHERE notebook_id = $1 ORDER BY updated_at DESC",
        )
        .bind(notebook_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    async fn list_by_source(&self, source_id: Uuid) -> Result<Vec<ChatSession>> {
        let rows = sqlx::query(
            "SELECT * FROM chat_session WHERE source_id = $1 ORDER BY updated_at DESC",
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    async fn update(&self, session: &ChatSession) -> Result<()> {
        let result = sqlx::query(
            "UPDATE chat_session SET title = $2, model_override = $3, updated_at = $4
             WHERE id = $1",
        )
        .bind(session.id)
        .bind(&session.title)
        .bind(&session.model_override)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("chat session {}", session.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chat_session WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
