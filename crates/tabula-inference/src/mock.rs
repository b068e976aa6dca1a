//! In-memory test doubles for the model registry and embedding backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use tabula_core::{
    new_v7, DefaultModels, EmbeddingBackend, Error, Model, ModelKind, ModelProvider,
    ModelRegistry, Result, Vector,
};

/// Model registry backed by a mutex-guarded map.
#[derive(Default)]
pub struct InMemoryModelRegistry {
    models: Mutex<HashMap<Uuid, Model>>,
    defaults: Mutex<DefaultModels>,
}

#[async_trait]
impl ModelRegistry for InMemoryModelRegistry {
    async fn register(
        &self,
        name: &str,
        provider: ModelProvider,
        kind: ModelKind,
    ) -> Result<Model> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("Model name cannot be empty".into()));
        }
        let model = Model {
            id: new_v7(),
            name: name.to_string(),
            provider,
            kind,
            created_at: Utc::now(),
        };
        self.models
            .lock()
            .expect("registry lock poisoned")
            .insert(model.id, model.clone());
        Ok(model)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Model>> {
        Ok(self
            .models
            .lock()
            .expect("registry lock poisoned")
            .get(&id)
            .cloned())
    }

    async fn list(&self, kind: Option<ModelKind>) -> Result<Vec<Model>> {
        let models = self.models.lock().expect("registry lock poisoned");
        let mut out: Vec<Model> = models
            .values()
            .filter(|m| kind.is_none_or(|k| m.kind == k))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self
            .models
            .lock()
            .expect("registry lock poisoned")
            .remove(&id)
            .is_some())
    }

    async fn get_defaults(&self) -> Result<DefaultModels> {
        Ok(self.defaults.lock().expect("defaults lock poisoned").clone())
    }

    async fn set_defaults(&self, defaults: &DefaultModels) -> Result<()> {
        *self.defaults.lock().expect("defaults lock poisoned") = defaults.clone();
        Ok(())
    }
}

/// Embedding backend that returns deterministic vectors without a server.
pub struct MockEmbeddingBackend {
    dimension: usize,
    model_name: String,
    /// When set, every call fails with this message.
    pub fail_with: Option<String>,
}

impl MockEmbeddingBackend {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_name: "mock-embed".to_string(),
            fail_with: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            dimension: 4,
            model_name: "mock-embed".to_string(),
            fail_with: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if let Some(message) = &self.fail_with {
            return Err(Error::Embedding(message.clone()));
        }
        Ok(texts
            .iter()
            .map(|t| {
                // Length-derived vector keeps outputs deterministic per input.
                let seed = t.len() as f32;
                Vector::from(vec![seed; self.dimension])
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
