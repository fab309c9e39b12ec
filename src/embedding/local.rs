//! Local inference via fastembed (ONNX Runtime).
//!
//! Models are downloaded on first use from Hugging Face and cached. After the
//! initial download no network calls are needed. The model is loaded once,
//! when the provider is built, and reused for every batch.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use fastembed::EmbeddingModel;
use tracing::info;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;

const DEFAULT_MODEL: &str = "all-minilm-l6-v2";

pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<Mutex<fastembed::TextEmbedding>>,
}

impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_name, fastembed_model, dims) = resolve_local_model(config)?;

        info!(model = %model_name, dims, "loading local embedding model");
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            model: Arc::new(Mutex::new(model)),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow::anyhow!("Local embedding model lock poisoned"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

/// Supported models: config name, fastembed variant, output width.
static LOCAL_MODELS: &[(&str, EmbeddingModel, usize)] = &[
    ("all-minilm-l6-v2", EmbeddingModel::AllMiniLML6V2, 384),
    ("bge-small-en-v1.5", EmbeddingModel::BGESmallENV15, 384),
    ("bge-base-en-v1.5", EmbeddingModel::BGEBaseENV15, 768),
    ("bge-large-en-v1.5", EmbeddingModel::BGELargeENV15, 1024),
    ("nomic-embed-text-v1", EmbeddingModel::NomicEmbedTextV1, 768),
    ("nomic-embed-text-v1.5", EmbeddingModel::NomicEmbedTextV15, 768),
    ("multilingual-e5-small", EmbeddingModel::MultilingualE5Small, 384),
    ("multilingual-e5-base", EmbeddingModel::MultilingualE5Base, 768),
    ("multilingual-e5-large", EmbeddingModel::MultilingualE5Large, 1024),
];

fn lookup_model(name: &str) -> Result<&'static (&'static str, EmbeddingModel, usize)> {
    match LOCAL_MODELS.iter().find(|(known, _, _)| *known == name) {
        Some(entry) => Ok(entry),
        None => {
            let supported: Vec<&str> = LOCAL_MODELS.iter().map(|(known, _, _)| *known).collect();
            bail!(
                "Unknown local embedding model: '{}'. Supported models: {}",
                name,
                supported.join(", ")
            )
        }
    }
}

/// Configured model name, its fastembed variant, and the vector width
/// (`dims` in the config overrides the model's own width).
fn resolve_local_model(config: &EmbeddingConfig) -> Result<(String, EmbeddingModel, usize)> {
    let name = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
    let (known, model, default_dims) = lookup_model(name)?;
    let dims = config.dims.unwrap_or(*default_dims);
    Ok((known.to_string(), model.clone(), dims))
}
