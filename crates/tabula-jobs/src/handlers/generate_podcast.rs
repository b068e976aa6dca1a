//! Podcast generation handler.
//!
//! Creates an episode row from a named profile, hands it to the generation
//! engine, and records the produced artifacts. The episode row tracks its
//! own status so the UI can follow generation independently of the job.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use tabula_core::{
    CreateEpisodeRequest, EpisodeStatus, EpisodeUpdate, PodcastGenerator, PodcastRepository,
};

use crate::handler::{JobContext, JobHandler, JobOutcome};

#[derive(Debug, Deserialize)]
struct GeneratePodcastArgs {
    /// Name of the episode profile to generate with.
    episode_profile: String,
    episode_name: String,
    /// Instructions for this episode. Falls back to the profile's default.
    briefing: Option<String>,
    /// Material the episode is based on.
    content: String,
}

/// Handler for the `generate_podcast` command.
pub struct GeneratePodcastHandler {
    podcasts: Arc<dyn PodcastRepository>,
    generator: Arc<dyn PodcastGenerator>,
}

impl GeneratePodcastHandler {
    pub fn new(
        podcasts: Arc<dyn PodcastRepository>,
        generator: Arc<dyn PodcastGenerator>,
    ) -> Self {
        Self {
            podcasts,
            generator,
        }
    }

    async fn mark_failed(&self, episode_id: Uuid) {
        let update = EpisodeUpdate {
            status: Some(EpisodeStatus::Failed),
            ..Default::default()
        };
        if let Err(e) = self.podcasts.update_episode(episode_id, update).await {
            warn!(error = ?e, %episode_id, "Failed to mark episode as failed");
        }
    }
}

#[async_trait]
impl JobHandler for GeneratePodcastHandler {
    fn command_name(&self) -> &'static str {
        "generate_podcast"
    }

    async fn execute(&self, ctx: JobContext) -> JobOutcome {
        let start = Instant::now();

        let args: GeneratePodcastArgs = match ctx.parse_args() {
            Ok(args) => args,
            Err(e) => return JobOutcome::from_error(&e),
        };

        let episode_profile = match self.podcasts.get_episode_profile(&args.episode_profile).await
        {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                return JobOutcome::Failed(format!(
                    "Episode profile not found: {}",
                    args.episode_profile
                ));
            }
            Err(e) => return JobOutcome::from_error(&e),
        };

        let speaker_profile = match self
            .podcasts
            .get_speaker_profile(&episode_profile.speaker_profile)
            .await
        {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                return JobOutcome::Failed(format!(
                    "Speaker profile not found: {}",
                    episode_profile.speaker_profile
                ));
            }
            Err(e) => return JobOutcome::from_error(&e),
        };

        let briefing = args
            .briefing
            .unwrap_or_else(|| episode_profile.default_briefing.clone());

        // Profiles are snapshotted into the episode row so later profile
        // edits do not rewrite the history of what an episode was made with.
        let (episode_snapshot, speaker_snapshot) = match (
            serde_json::to_value(&episode_profile),
            serde_json::to_value(&speaker_profile),
        ) {
            (Ok(e), Ok(s)) => (e, s),
            (Err(e), _) | (_, Err(e)) => {
                return JobOutcome::Failed(format!("Failed to snapshot profiles: {}", e));
            }
        };

        let episode = match self
            .podcasts
            .create_episode(CreateEpisodeRequest {
                name: args.episode_name,
                briefing,
                content: args.content,
                episode_profile: episode_snapshot,
                speaker_profile: speaker_snapshot,
            })
            .await
        {
            Ok(episode) => episode,
            Err(e) => return JobOutcome::from_error(&e),
        };
        let episode_id = episode.id;

        ctx.report_progress(0.1, Some("Generating episode")).await;
        let generating = EpisodeUpdate {
            status: Some(EpisodeStatus::Generating),
            ..Default::default()
        };
        if let Err(e) = self.podcasts.update_episode(episode_id, generating).await {
            return JobOutcome::from_error(&e);
        }

        let artifacts = match self.generator.generate(&episode).await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                self.mark_failed(episode_id).await;
                return JobOutcome::from_error(&e);
            }
        };

        let completed = EpisodeUpdate {
            status: Some(EpisodeStatus::Completed),
            audio_file: Some(artifacts.audio_file.clone()),
            transcript: Some(artifacts.transcript),
            outline: Some(artifacts.outline),
        };
        if let Err(e) = self.podcasts.update_episode(episode_id, completed).await {
            return JobOutcome::from_error(&e);
        }
        ctx.report_progress(1.0, Some("Done")).await;

        info!(
            %episode_id,
            audio_file = %artifacts.audio_file,
            duration_ms = start.elapsed().as_millis() as u64,
            "Podcast episode generated"
        );

        JobOutcome::Success(json!({
            "success": true,
            "episode_id": episode_id,
            "audio_file": artifacts.audio_file,
            "processing_time_ms": start.elapsed().as_millis() as u64,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        make_job, InMemoryJobRepository, InMemoryPodcastRepository, StubPodcastGenerator,
    };
    use serde_json::json;
    use tabula_core::JobRepository;

    fn jobs() -> Arc<dyn JobRepository> {
        Arc::new(InMemoryJobRepository::default())
    }

    #[tokio::test]
    async fn test_generate_podcast_completes_episode() {
        let podcasts = Arc::new(InMemoryPodcastRepository::default());
        podcasts.add_speaker_profile("two_hosts");
        podcasts.add_episode_profile("tech_deep_dive", "two_hosts");

        let handler = GeneratePodcastHandler::new(
            podcasts.clone(),
            Arc::new(StubPodcastGenerator::succeeding()),
        );
        let job = make_job(
            "generate_podcast",
            json!({
                "episode_profile": "tech_deep_dive",
                "episode_name": "Vector search in practice",
                "content": "Material about vector search.",
            }),
        );
        let outcome = handler.execute(JobContext::new(job, jobs())).await;

        let JobOutcome::Success(result) = outcome else {
            panic!("Expected success");
        };
        let episode_id: Uuid =
            serde_json::from_value(result["episode_id"].clone()).unwrap();
        let episode = podcasts.get_episode(episode_id).await.unwrap().unwrap();
        assert_eq!(episode.status, EpisodeStatus::Completed);
        assert!(episode.audio_file.is_some());
        assert!(episode.transcript.is_some());
        // Briefing falls back to the profile default when not supplied.
        assert_eq!(episode.briefing, "Discuss the provided material");
    }

    #[tokio::test]
    async fn test_generate_podcast_missing_profile_fails() {
        let podcasts = Arc::new(InMemoryPodcastRepository::default());
        let handler = GeneratePodcastHandler::new(
            podcasts,
            Arc::new(StubPodcastGenerator::succeeding()),
        );
        let job = make_job(
            "generate_podcast",
            json!({
                "episode_profile": "nonexistent",
                "episode_name": "Episode",
                "content": "Material.",
            }),
        );
        let outcome = handler.execute(JobContext::new(job, jobs())).await;

        let JobOutcome::Failed(message) = outcome else {
            panic!("Expected failure");
        };
        assert!(message.contains("Episode profile not found"));
    }

    #[tokio::test]
    async fn test_generate_podcast_missing_speaker_profile_fails() {
        let podcasts = Arc::new(InMemoryPodcastRepository::default());
        podcasts.add_episode_profile("solo", "missing_speakers");

        let handler = GeneratePodcastHandler::new(
            podcasts,
            Arc::new(StubPodcastGenerator::succeeding()),
        );
        let job = make_job(
            "generate_podcast",
            json!({
                "episode_profile": "solo",
                "episode_name": "Episode",
                "content": "Material.",
            }),
        );
        let outcome = handler.execute(JobContext::new(job, jobs())).await;

        let JobOutcome::Failed(message) = outcome else {
            panic!("Expected failure");
        };
        assert!(message.contains("Speaker profile not found"));
    }

    #[tokio::test]
    async fn test_generate_podcast_generator_failure_marks_episode() {
        let podcasts = Arc::new(InMemoryPodcastRepository::default());
        podcasts.add_speaker_profile("two_hosts");
        podcasts.add_episode_profile("tech_deep_dive", "two_hosts");

        let handler = GeneratePodcastHandler::new(
            podcasts.clone(),
            Arc::new(StubPodcastGenerator::failing("tts exploded")),
        );
        let job = make_job(
            "generate_podcast",
            json!({
                "episode_profile": "tech_deep_dive",
                "episode_name": "Episode",
                "briefing": "Keep it short",
                "content": "Material.",
            }),
        );
        let outcome = handler.execute(JobContext::new(job, jobs())).await;

        let JobOutcome::Failed(message) = outcome else {
            panic!("Expected failure");
        };
        assert!(message.contains("tts exploded"));

        let episodes = podcasts.list_episodes().await.unwrap();
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].status, EpisodeStatus::Failed);
        assert_eq!(episodes[0].briefing, "Keep it short");
    }
}
