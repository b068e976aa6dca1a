//! Model manager: resolves configured default models into usable backends.
//!
//! The manager sits between the model registry (rows in the database) and
//! the code that needs a live backend. Role lookups go through the singleton
//! default-models row; backends are cached per model id.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use tabula_core::{
    defaults, EmbeddingBackend, Error, Model, ModelKind, ModelProvider, ModelRegistry, Result,
};

use crate::ollama::OllamaBackend;

/// Model role used for default lookups.
///
/// Roles without their own configured default fall back to the chat default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Chat,
    Transformation,
    LargeContext,
    TextToSpeech,
    SpeechToText,
    Embedding,
    Tools,
}

impl ModelRole {
    fn describe(&self) -> &'static str {
        match self {
            ModelRole::Chat => "chat",
            ModelRole::Transformation => "transformation",
            ModelRole::LargeContext => "large_context",
            ModelRole::TextToSpeech => "text_to_speech",
            ModelRole::SpeechToText => "speech_to_text",
            ModelRole::Embedding => "embedding",
            ModelRole::Tools => "tools",
        }
    }
}

/// Resolves default models per role and constructs inference backends.
pub struct ModelManager {
    registry: Arc<dyn ModelRegistry>,
    embedding_cache: RwLock<HashMap<Uuid, Arc<dyn EmbeddingBackend>>>,
}

impl ModelManager {
    pub fn new(registry: Arc<dyn ModelRegistry>) -> Self {
        Self {
            registry,
            embedding_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve the default model configured for a role.
    ///
    /// Returns `Error::ModelUnavailable` when no default is configured for
    /// the role (after fallback) or the configured id no longer resolves.
    pub async fn default_model(&self, role: ModelRole) -> Result<Model> {
        let config = self.registry.get_defaults().await?;

        let id = match role {
            ModelRole::Chat => config.default_chat_model,
            ModelRole::Transformation => config
                .default_transformation_model
                .or(config.default_chat_model),
            ModelRole::LargeContext => config.large_context_model.or(config.default_chat_model),
            ModelRole::TextToSpeech => config.default_text_to_speech_model,
            ModelRole::SpeechToText => config.default_speech_to_text_model,
            ModelRole::Embedding => config.default_embedding_model,
            ModelRole::Tools => config.default_tools_model.or(config.default_chat_model),
        };

        let id = id.ok_or_else(|| {
            Error::ModelUnavailable(format!("No default {} model configured", role.describe()))
        })?;

        self.registry.get(id).await?.ok_or_else(|| {
            Error::ModelUnavailable(format!(
                "Default {} model {} is not registered",
                role.describe(),
                id
            ))
        })
    }

    /// Get the embedding backend for the configured default embedding model.
    ///
    /// Backends are cached per model id; switching the default picks up the
    /// new model on the next call.
    pub async fn embedding_backend(&self) -> Result<Arc<dyn EmbeddingBackend>> {
        let model = self.default_model(ModelRole::Embedding).await?;

        if model.kind != ModelKind::Embedding {
            return Err(Error::ModelUnavailable(format!(
                "Model {} is a {} model, not an embedding model",
                model.name, model.kind
            )));
        }

        {
            let cache = self.embedding_cache.read().await;
            if let Some(backend) = cache.get(&model.id) {
                debug!(
                    subsystem = "inference",
                    component = "manager",
                    model = %model.name,
                    "Embedding backend cache hit"
                );
                return Ok(backend.clone());
            }
        }

        let backend = self.build_embedding_backend(&model)?;

        let mut cache = self.embedding_cache.write().await;
        cache.insert(model.id, backend.clone());

        info!(
            subsystem = "inference",
            component = "manager",
            model = %model.name,
            provider = %model.provider,
            "Embedding backend initialized"
        );

        Ok(backend)
    }

    fn build_embedding_backend(&self, model: &Model) -> Result<Arc<dyn EmbeddingBackend>> {
        match model.provider {
            ModelProvider::Ollama => {
                let base_url = std::env::var("OLLAMA_BASE")
                    .unwrap_or_else(|_| defaults::OLLAMA_URL.to_string());
                let dimension = std::env::var("OLLAMA_EMBED_DIM")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults::EMBED_DIMENSION);
                let backend =
                    OllamaBackend::with_config(base_url, model.name.clone(), dimension)?;
                Ok(Arc::new(backend))
            }
            ModelProvider::OpenAi => Err(Error::ModelUnavailable(format!(
                "Provider {} is not supported for embeddings",
                model.provider
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::InMemoryModelRegistry;

    #[tokio::test]
    async fn test_missing_embedding_default_is_unavailable() {
        let registry = Arc::new(InMemoryModelRegistry::default());
        let manager = ModelManager::new(registry);

        let err = manager.default_model(ModelRole::Embedding).await.unwrap_err();
        assert!(matches!(err, Error::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_transformation_falls_back_to_chat() {
        let registry = Arc::new(InMemoryModelRegistry::default());
        let chat = registry
            .register("llama3", ModelProvider::Ollama, ModelKind::Language)
            .await
            .unwrap();

        let mut config = registry.get_defaults().await.unwrap();
        config.default_chat_model = Some(chat.id);
        registry.set_defaults(&config).await.unwrap();

        let manager = ModelManager::new(registry);
        let resolved = manager.default_model(ModelRole::Transformation).await.unwrap();
        assert_eq!(resolved.id, chat.id);
    }

    #[tokio::test]
    async fn test_speech_roles_do_not_fall_back() {
        let registry = Arc::new(InMemoryModelRegistry::default());
        let chat = registry
            .register("llama3", ModelProvider::Ollama, ModelKind::Language)
            .await
            .unwrap();

        let mut config = registry.get_defaults().await.unwrap();
        config.default_chat_model = Some(chat.id);
        registry.set_defaults(&config).await.unwrap();

        let manager = ModelManager::new(registry);
        assert!(manager.default_model(ModelRole::TextToSpeech).await.is_err());
        assert!(manager.default_model(ModelRole::SpeechToText).await.is_err());
    }

    #[tokio::test]
    async fn test_embedding_backend_rejects_wrong_kind() {
        let registry = Arc::new(InMemoryModelRegistry::default());
        let chat = registry
            .register("llama3", ModelProvider::Ollama, ModelKind::Language)
            .await
            .unwrap();

        let mut config = registry.get_defaults().await.unwrap();
        config.default_embedding_model = Some(chat.id);
        registry.set_defaults(&config).await.unwrap();

        let manager = ModelManager::new(registry);
        let Err(err) = manager.embedding_backend().await else {
            panic!("Expected backend resolution to fail");
        };
        assert!(matches!(err, Error::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_embedding_backend_cached_by_model_id() {
        let registry = Arc::new(InMemoryModelRegistry::default());
        let embed = registry
            .register("nomic-embed-text", ModelProvider::Ollama, ModelKind::Embedding)
            .await
            .unwrap();

        let mut config = registry.get_defaults().await.unwrap();
        config.default_embedding_model = Some(embed.id);
        registry.set_defaults(&config).await.unwrap();

        let manager = ModelManager::new(registry);
        let a = manager.embedding_backend().await.unwrap();
        let b = manager.embedding_backend().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
