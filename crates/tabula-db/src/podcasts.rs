//! Podcast repository implementation.
//!
//! Episode rows carry profile snapshots as JSON so later edits to a profile
//! never change what an already-generated episode recorded.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use tabula_core::{
    new_v7, CreateEpisodeRequest, EpisodeProfile, EpisodeStatus, EpisodeUpdate, Error,
    PodcastEpisode, PodcastRepository, Result, SpeakerProfile,
};

/// PostgreSQL implementation of PodcastRepository.
#[derive(Clone)]
pub struct PgPodcastRepository {
    pool: Pool<Postgres>,
}

impl PgPodcastRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_episode_row(row: sqlx::postgres::PgRow) -> PodcastEpisode {
        let status: String = row.get("status");
        PodcastEpisode {
            id: row.get("id"),
            name: row.get("name"),
            briefing: row.get("briefing"),
            content: row.get("content"),
            episode_profile: row.get("episode_profile"),
            speaker_profile: row.get("speaker_profile"),
            status: status.parse().unwrap_or(EpisodeStatus::Starting),
            audio_file: row.get("audio_file"),
            transcript: row.get("transcript"),
            outline: row.get("outline"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl PodcastRepository for PgPodcastRepository {
    async fn create_episode(&self, req: CreateEpisodeRequest) -> Result<PodcastEpisode> {
        let id = new_v7();
        let now = Utc::now();

        let row = sqlx::query(
            "INSERT INTO podcast_episode
                 (id, name, briefing, content, episode_profile, speaker_profile,
                  status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, 'starting', $7, $7)
             RETURNING *",
        )
        .bind(id)
        .bind(&req.name)
        .bind(&req.briefing)
        .bind(&req.content)
        .bind(&req.episode_profile)
        .bind(&req.speaker_profile)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_episode_row(row))
    }

    async fn get_episode(&self, id: Uuid) -> Result<Option<PodcastEpisode>> {
        let row = sqlx::query("SELECT * FROM podcast_episode WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_episode_row))
    }

    async fn list_episodes(&self) -> Result<Vec<PodcastEpisode>> {
        let rows = sqlx::query("SELECT * FROM podcast_episode ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_episode_row).collect())
    }

    async fn update_episode(&self, id: Uuid, update: EpisodeUpdate) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE podcast_episode SET
                 status = COALESCE($2, status),
                 audio_file = COALESCE($3, audio_file),
                 transcript = COALESCE($4, transcript),
                 outline = COALESCE($5, outline),
                 updated_at = $6
             WHERE id = $1",
        )
        .bind(id)
        .bind(update.status.map(|s| s.as_str()))
        .bind(&update.audio_file)
        .bind(&update.transcript)
        .bind(&update.outline)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_episode_profile(&self, name: &str) -> Result<Option<EpisodeProfile>> {
        let row = sqlx::query("SELECT * FROM episode_profile WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(|row| EpisodeProfile {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            speaker_profile: row.get("speaker_profile"),
            default_briefing: row.get("default_briefing"),
            num_segments: row.get("num_segments"),
        }))
    }

    async fn get_speaker_profile(&self, name: &str) -> Result<Option<SpeakerProfile>> {
        let row = sqlx::query("SELECT * FROM speaker_profile WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(|row| SpeakerProfile {
            id: row.get("id"),
            name: row.get("name"),
            tts_provider: row.get("tts_provider"),
            tts_model: row.get("tts_model"),
            speakers: row.get("speakers"),
        }))
    }
}
