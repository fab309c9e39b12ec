//! Embedding engine: provider abstraction, passage text, vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: returns errors; used when embeddings are not configured.
//! - **[`OllamaProvider`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`HashingProvider`]**: deterministic feature-hashing embedder; offline, no model files.
//! - **`LocalProvider`**: runs ONNX models locally via fastembed; no network calls after model download.
//!
//! Providers are wrapped in an [`EmbeddingEngine`], which is built once at
//! startup and shared (`Arc`) by the dataset builder and the retrieval engine.
//! The engine owns the model; nothing here touches the document store.
//!
//! # Provider Selection
//!
//! Use [`EmbeddingEngine::from_config`] to build the engine for the configured
//! provider:
//!
//! ```rust
//! # use course_compass::config::EmbeddingConfig;
//! # use course_compass::embedding::EmbeddingEngine;
//! let config = EmbeddingConfig {
//!     provider: "hashing".to_string(),
//!     ..EmbeddingConfig::default()
//! };
//! let engine = EmbeddingEngine::from_config(&config).unwrap();
//! assert_eq!(engine.model_name(), "hashing");
//! ```
//!
//! # Passage Text
//!
//! A catalog record is embedded through [`passage_text`]: the record is
//! serialized as JSON with `", "` and `": "` separators, then every character
//! that is not an ASCII letter, digit, or space is removed. The projection is
//! lossy but stable, so the same record always embeds the same way.

mod hashing;
#[cfg(feature = "local-embeddings-fastembed")]
mod local;
mod ollama;

pub use hashing::HashingProvider;
#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalProvider;
pub use ollama::OllamaProvider;

use std::io;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::models::{CourseRecord, EmbeddingMatrix};

/// Trait for embedding providers.
///
/// Defines the interface that all embedding backends must implement.
/// Implementations hold whatever model state they need and must return one
/// vector per input text, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.")
    }
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// # Supported Providers
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"hashing"` | [`HashingProvider`] |
/// | `"local"` | `LocalProvider` (requires the `local-embeddings-fastembed` feature) |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        "hashing" => Ok(Box::new(HashingProvider::new(
            config.dims.unwrap_or(hashing::DEFAULT_DIMS),
        ))),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Box::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!(
            "Local embedding provider requires --features local-embeddings-fastembed"
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// The shared embedding component.
pub struct EmbeddingEngine {
    provider: Box<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl EmbeddingEngine {
    pub fn new(provider: Box<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    /// Build the configured provider (loading model weights where needed).
    pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<Self>> {
        let provider = create_provider(config)?;
        Ok(Arc::new(Self::new(provider, config.batch_size)))
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn dims(&self) -> usize {
        self.provider.dims()
    }

    /// Embed a free-text query as a single vector.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }

    /// Embed catalog records; row `i` of the result belongs to `records[i]`.
    pub async fn embed_records(&self, records: &[CourseRecord]) -> Result<EmbeddingMatrix> {
        let passages = records
            .iter()
            .map(passage_text)
            .collect::<Result<Vec<String>>>()?;

        let mut rows = Vec::with_capacity(passages.len());
        for batch in passages.chunks(self.batch_size) {
            rows.extend(self.embed_batch(batch).await?);
            debug!(embedded = rows.len(), total = passages.len(), "embedded batch");
        }

        Ok(EmbeddingMatrix::from_rows(rows)?)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.provider.embed_texts(texts).await?;
        if vectors.len() != texts.len() {
            bail!(
                "Embedding provider '{}' returned {} vectors for {} inputs",
                self.model_name(),
                vectors.len(),
                texts.len()
            );
        }
        let dims = self.dims();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            bail!(
                "Embedding provider '{}' returned a {}-dimensional vector, expected {}",
                self.model_name(),
                bad.len(),
                dims
            );
        }
        if let Some((i, _)) = vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.iter().any(|x| !x.is_finite()))
        {
            bail!(
                "Embedding provider '{}' returned a non-finite value in vector {} of the batch",
                self.model_name(),
                i
            );
        }
        Ok(vectors)
    }
}

/// JSON formatting with `", "` and `": "` separators, so that field
/// boundaries survive as spaces once punctuation is stripped.
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

/// The text a catalog record is embedded as.
pub fn passage_text(record: &CourseRecord) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    record.serialize(&mut ser)?;
    let json = String::from_utf8(buf)?;
    Ok(json
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect())
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero vector on either side.
///
/// # Formula
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn course(value: serde_json::Value) -> CourseRecord {
        CourseRecord::from_document(value.as_object().unwrap().clone()).unwrap()
    }

    /// Returns a fixed number of vectors regardless of input, to exercise the
    /// engine's output checks.
    struct FixedProvider {
        vectors: Vec<Vec<f32>>,
        dims: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(self.vectors.clone())
        }
    }

    #[test]
    fn test_passage_text_strips_punctuation() {
        let record = course(json!({
            "title": "Intro to Python!",
            "description": "basics (part 1)",
            "url": "https://a.io/x",
        }));
        assert_eq!(
            passage_text(&record).unwrap(),
            "title Intro to Python description basics part 1 url httpsaiox"
        );
    }

    #[test]
    fn test_passage_text_includes_tags_and_extras() {
        let record = course(json!({
            "title": "T",
            "description": "D",
            "url": "u",
            "tags": ["ml", "ai"],
            "rating": 4.5,
        }));
        assert_eq!(
            passage_text(&record).unwrap(),
            "title T description D url u tags ml ai rating 45"
        );
    }

    #[test]
    fn test_passage_text_is_stable() {
        let a = course(json!({"url": "u", "title": "T", "description": "D", "b": 1, "a": 2}));
        let b = course(json!({"a": 2, "b": 1, "description": "D", "title": "T", "url": "u"}));
        assert_eq!(passage_text(&a).unwrap(), passage_text(&b).unwrap());
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let engine = EmbeddingEngine::new(Box::new(DisabledProvider), 8);
        assert!(engine.embed_query("anything").await.is_err());
    }

    #[tokio::test]
    async fn test_engine_rejects_wrong_vector_count() {
        let engine = EmbeddingEngine::new(
            Box::new(FixedProvider {
                vectors: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
                dims: 2,
            }),
            8,
        );
        let err = engine.embed_query("q").await.unwrap_err();
        assert!(err.to_string().contains("2 vectors for 1 inputs"));
    }

    #[tokio::test]
    async fn test_engine_rejects_wrong_width() {
        let engine = EmbeddingEngine::new(
            Box::new(FixedProvider {
                vectors: vec![vec![1.0, 0.0, 0.0]],
                dims: 2,
            }),
            8,
        );
        let err = engine.embed_query("q").await.unwrap_err();
        assert!(err.to_string().contains("expected 2"));
    }

    #[tokio::test]
    async fn test_engine_rejects_non_finite_values() {
        let engine = EmbeddingEngine::new(
            Box::new(FixedProvider {
                vectors: vec![vec![0.5, f32::NAN]],
                dims: 2,
            }),
            8,
        );
        let err = engine.embed_query("q").await.unwrap_err();
        assert!(err.to_string().contains("non-finite"));

        let engine = EmbeddingEngine::new(
            Box::new(FixedProvider {
                vectors: vec![vec![f32::INFINITY, 0.0]],
                dims: 2,
            }),
            8,
        );
        assert!(engine.embed_query("q").await.is_err());
    }

    #[tokio::test]
    async fn test_embed_records_batches_preserve_order() {
        let engine = EmbeddingEngine::new(Box::new(HashingProvider::new(64)), 2);
        let records: Vec<CourseRecord> = (0..5)
            .map(|i| course(json!({"title": format!("course {}", i), "description": "", "url": "u"})))
            .collect();

        let matrix = engine.embed_records(&records).await.unwrap();
        assert_eq!(matrix.len(), 5);
        for (i, record) in records.iter().enumerate() {
            let direct = engine
                .embed_query(&passage_text(record).unwrap())
                .await
                .unwrap();
            assert_eq!(matrix.row(i).unwrap(), direct.as_slice());
        }
    }

    #[test]
    fn test_create_provider_unknown() {
        let config = EmbeddingConfig {
            provider: "magic".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
