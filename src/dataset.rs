//! Embedding dataset construction.
//!
//! Reads the whole catalog, embeds every course, and replaces the vector
//! collection with the resulting matrix. The build is not incremental: each
//! run recomputes all rows, so running it twice over an unchanged catalog
//! leaves the vector collection with the same contents.
//!
//! The matrix is written only after every row has been computed. If loading
//! or embedding fails, the previously stored vectors are left untouched.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::info;

use crate::catalog;
use crate::config::Config;
use crate::embedding::EmbeddingEngine;
use crate::store::DocumentStore;

/// Summary of a completed build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub rows: usize,
    pub dims: usize,
    pub model: String,
}

pub struct DatasetBuilder {
    engine: Arc<EmbeddingEngine>,
}

impl DatasetBuilder {
    pub fn new(engine: Arc<EmbeddingEngine>) -> Self {
        Self { engine }
    }

    /// Embed the catalog held by `catalog_store` and store the matrix in
    /// `vector_store`, replacing whatever was there.
    pub async fn build_and_store(
        &self,
        catalog_store: &DocumentStore,
        vector_store: &DocumentStore,
    ) -> Result<BuildReport> {
        let started = Instant::now();

        let courses = catalog::load_courses(catalog_store).await?;
        info!(
            courses = courses.len(),
            model = self.engine.model_name(),
            "building embedding dataset"
        );

        let matrix = self.engine.embed_records(&courses).await?;
        if matrix.len() != courses.len() {
            bail!(
                "Embedded {} rows for {} courses",
                matrix.len(),
                courses.len()
            );
        }

        let written = catalog::persist_matrix(vector_store, &matrix).await?;

        let report = BuildReport {
            rows: written,
            dims: matrix.dims(),
            model: self.engine.model_name().to_string(),
        };
        info!(
            rows = report.rows,
            dims = report.dims,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "embedding dataset stored"
        );
        Ok(report)
    }
}

/// Run the build command: rebuild the vector collection and print a summary.
pub async fn run_build(config: &Config) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let engine = EmbeddingEngine::from_config(&config.embedding)?;
    let builder = DatasetBuilder::new(engine);
    let catalog_store = config.catalog_store();
    let vector_store = config.vector_store();

    let result = builder.build_and_store(&catalog_store, &vector_store).await;
    catalog_store.close().await;
    vector_store.close().await;
    let report = result?;

    println!("build");
    println!("  catalog: {}", config.collections.catalog);
    println!("  vectors: {}", config.collections.vectors);
    println!("  rows: {}", report.rows);
    println!("  dims: {}", report.dims);
    println!("  model: {}", report.model);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::load_matrix;
    use crate::embedding::{EmbeddingProvider, HashingProvider};
    use crate::error::StoreError;
    use crate::models::Document;
    use crate::store::CollectionHandle;
    use serde_json::json;
    use tempfile::TempDir;

    /// Emits a NaN in every vector.
    struct DegenerateProvider;

    #[async_trait::async_trait]
    impl EmbeddingProvider for DegenerateProvider {
        fn model_name(&self) -> &str {
            "degenerate"
        }
        fn dims(&self) -> usize {
            32
        }
        async fn embed_texts(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|_| {
                    let mut v = vec![0.1; 32];
                    v[7] = f32::NAN;
                    v
                })
                .collect())
        }
    }

    fn stores(tmp: &TempDir) -> (DocumentStore, DocumentStore) {
        (
            DocumentStore::new(CollectionHandle::new(tmp.path(), "catalog", "courses")),
            DocumentStore::new(CollectionHandle::new(tmp.path(), "catalog", "embedded")),
        )
    }

    fn builder() -> DatasetBuilder {
        DatasetBuilder::new(Arc::new(EmbeddingEngine::new(
            Box::new(HashingProvider::new(32)),
            2,
        )))
    }

    async fn seed(store: &DocumentStore, docs: Vec<serde_json::Value>) {
        store.connect(true).await.unwrap();
        let docs: Vec<Document> = docs
            .into_iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect();
        store.write_table(&docs, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_build_reports_rows_and_dims() {
        let tmp = TempDir::new().unwrap();
        let (courses, vectors) = stores(&tmp);
        seed(
            &courses,
            vec![
                json!({"title": "A", "description": "a", "url": "a"}),
                json!({"title": "B", "description": "b", "url": "b"}),
                json!({"title": "C", "description": "c", "url": "c"}),
            ],
        )
        .await;

        let report = builder().build_and_store(&courses, &vectors).await.unwrap();
        assert_eq!(
            report,
            BuildReport {
                rows: 3,
                dims: 32,
                model: "hashing".to_string()
            }
        );
        assert_eq!(vectors.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_vectors() {
        let tmp = TempDir::new().unwrap();
        let (courses, vectors) = stores(&tmp);
        seed(
            &courses,
            vec![json!({"title": "A", "description": "a", "url": "a"})],
        )
        .await;
        builder().build_and_store(&courses, &vectors).await.unwrap();

        let empty_catalog =
            DocumentStore::new(CollectionHandle::new(tmp.path(), "catalog", "nothing_here"));
        let err = builder()
            .build_and_store(&empty_catalog, &vectors)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::NotFound { .. })
        ));
        assert_eq!(vectors.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_non_finite_embeddings_keep_previous_vectors() {
        let tmp = TempDir::new().unwrap();
        let (courses, vectors) = stores(&tmp);
        seed(
            &courses,
            vec![
                json!({"title": "A", "description": "a", "url": "a"}),
                json!({"title": "B", "description": "b", "url": "b"}),
            ],
        )
        .await;
        builder().build_and_store(&courses, &vectors).await.unwrap();
        let before = load_matrix(&vectors).await.unwrap();

        let degenerate = DatasetBuilder::new(Arc::new(EmbeddingEngine::new(
            Box::new(DegenerateProvider),
            2,
        )));
        let err = degenerate
            .build_and_store(&courses, &vectors)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("non-finite"));

        let after = load_matrix(&vectors).await.unwrap();
        assert_eq!(before, after);
        assert_eq!(after.dims(), 32);
    }
}
