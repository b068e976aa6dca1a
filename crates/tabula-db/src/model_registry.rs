//! Model registry repository implementation.
//!
//! Tracks configured AI models and the singleton default-models row that
//! assigns a model to each role (chat, embedding, speech, tools).

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use tabula_core::{
    new_v7, DefaultModels, Error, Model, ModelKind, ModelProvider, ModelRegistry, Result,
};

/// PostgreSQL implementation of ModelRegistry.
#[derive(Clone)]
pub struct PgModelRegistry {
    pool: Pool<Postgres>,
}

impl PgModelRegistry {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Result<Model> {
        let provider: String = row.get("provider");
        let kind: String = row.get("kind");
        Ok(Model {
            id: row.get("id"),
            name: row.get("name"),
            provider: provider
                .parse()
                .map_err(|e: String| Error::Internal(e))?,
            kind: kind.parse().map_err(|e: String| Error::Internal(e))?,
            created_at: row.get("created_at"),
        })
    }

    fn parse_defaults_row(row: sqlx::postgres::PgRow) -> DefaultModels {
        DefaultModels {
            default_chat_model: row.get("default_chat_model"),
            default_transformation_model: row.get("default_transformation_model"),
            large_context_model: row.get("large_context_model"),
            default_text_to_speech_model: row.get("default_text_to_speech_model"),
            default_speech_to_text_model: row.get("default_speech_to_text_model"),
            default_embedding_model: row.get("default_embedding_model"),
            default_tools_model: row.get("default_tools_model"),
        }
    }
}

#[async_trait]
impl ModelRegistry for PgModelRegistry {
    async fn register(
        &self,
        name: &str,
        provider: ModelProvider,
        kind: ModelKind,
    ) -> Result<Model> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("Model name cannot be empty".into()));
        }

        let id = new_v7();
        let now = Utc::now();

        let row = sqlx::query(
            "INSERT INTO model (id, name, provider, kind, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(id)
        .bind(name)
        .bind(provider.to_string())
        .bind(kind.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Self::parse_row(row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Model>> {
        let row = sqlx::query("SELECT * FROM model WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_row).transpose()
    }

    async fn list(&self, kind: Option<ModelKind>) -> Result<Vec<Model>> {
        let rows = sqlx::query(
            "SELECT * FROM model WHERE ($1::text IS NULL OR kind = $1) ORDER BY name",
        )
        .bind(kind.map(|k| k.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_row).collect()
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM model WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_defaults(&self) -> Result<DefaultModels> {
        // Lazily create the singleton on first read so callers never see
        // a missing row.
        let row = sqlx::query(
            "INSERT INTO default_models (singleton)
             VALUES (TRUE)
             ON CONFLICT (singleton) DO UPDATE SET singleton = TRUE
             RETURNING *",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_defaults_row(row))
    }

    async fn set_defaults(&self, defaults: &DefaultModels) -> Result<()> {
        sqlx::query(
            "INSERT INTO default_models
                 (singleton, default_chat_model, default_transformation_model,
                  large_context_model, default_text_to_speech_model,
                  default_speech_to_text_model, default_embedding_model,
                  default_tools_model)
             VALUES (TRUE, $1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (singleton) DO UPDATE SET
                 default_chat_model = EXCLUDED.default_chat_model,
                 default_transformation_model = EXCLUDED.default_transformation_model,
                 large_context_model = EXCLUDED.large_context_model,
                 default_text_to_speech_model = EXCLUDED.default_text_to_speech_model,
                 default_speech_to_text_model = EXCLUDED.default_speech_to_text_model,
                 default_embedding_model = EXCLUDED.default_embedding_model,
                 default_tools_model = EXCLUDED.default_tools_model",
        )
        .bind(defaults.default_chat_model)
        .bind(defaults.default_transformation_model)
        .bind(defaults.large_context_model)
        .bind(defaults.default_text_to_speech_model)
        .bind(defaults.default_speech_to_text_model)
        .bind(defaults.default_embedding_model)
        .bind(defaults.default_tools_model)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }
}
