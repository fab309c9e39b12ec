//! Query-time retrieval.
//!
//! A search embeds the query, scans every row of the stored embedding matrix
//! with cosine similarity, and maps the best rows back to catalog records by
//! position. Row `i` of the matrix always belongs to catalog record `i`; the
//! search refuses to answer when the two collections disagree in size.
//!
//! # Ranking
//!
//! Rows are ordered by descending similarity. Rows with equal similarity keep
//! catalog order (stable sort), so the same query over the same data always
//! returns the same list.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use tracing::{debug, info};

use crate::catalog;
use crate::config::Config;
use crate::embedding::{cosine_similarity, EmbeddingEngine};
use crate::error::RetrievalError;
use crate::models::{CourseRecord, EmbeddingMatrix, ScoredCourse};
use crate::store::DocumentStore;

pub struct Retriever {
    engine: Arc<EmbeddingEngine>,
}

impl Retriever {
    pub fn new(engine: Arc<EmbeddingEngine>) -> Self {
        Self { engine }
    }

    /// The `top_k` catalog records most similar to `query`, best first.
    pub async fn search(
        &self,
        catalog_store: &DocumentStore,
        vector_store: &DocumentStore,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<CourseRecord>> {
        let scored = self
            .search_scored(catalog_store, vector_store, query, top_k)
            .await?;
        Ok(scored.into_iter().map(|s| s.course).collect())
    }

    /// Like [`search`](Self::search), with rank and similarity for each hit.
    pub async fn search_scored(
        &self,
        catalog_store: &DocumentStore,
        vector_store: &DocumentStore,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredCourse>> {
        let started = Instant::now();

        let courses = catalog::load_courses(catalog_store).await?;
        let matrix = catalog::load_matrix(vector_store).await?;
        if matrix.len() != courses.len() {
            return Err(RetrievalError::RowCountMismatch {
                catalog: courses.len(),
                vectors: matrix.len(),
            }
            .into());
        }

        let query_vec = self.engine.embed_query(query).await?;
        let ranked = rank_rows(&query_vec, &matrix, top_k)?;

        let mut courses: Vec<Option<CourseRecord>> = courses.into_iter().map(Some).collect();
        let mut results = Vec::with_capacity(ranked.len());
        for (rank, (row, score)) in ranked.into_iter().enumerate() {
            let Some(course) = courses[row].take() else {
                bail!("Row {} ranked twice", row);
            };
            results.push(ScoredCourse {
                rank: rank + 1,
                score,
                course,
            });
        }

        info!(
            results = results.len(),
            candidates = matrix.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search complete"
        );
        Ok(results)
    }
}

/// Rank matrix rows against `query`, returning `(row, similarity)` pairs for
/// the best `top_k` rows. Fewer rows than `top_k` means every row is returned.
pub fn rank_rows(
    query: &[f32],
    matrix: &EmbeddingMatrix,
    top_k: usize,
) -> Result<Vec<(usize, f32)>, RetrievalError> {
    if !matrix.is_empty() && query.len() != matrix.dims() {
        return Err(RetrievalError::DimensionMismatch {
            query: query.len(),
            matrix: matrix.dims(),
        });
    }

    let mut scored: Vec<(usize, f32)> = matrix
        .rows()
        .enumerate()
        .map(|(i, row)| {
            let score = cosine_similarity(query, row);
            // non-finite scores rank last
            (i, if score.is_finite() { score } else { f32::NEG_INFINITY })
        })
        .collect();

    // sort_by is stable: equal scores keep catalog order
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);

    debug!(top = ?scored.first(), "ranked rows");
    Ok(scored)
}

/// Run the search command: print the best matches for `query`.
pub async fn run_search(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        bail!("Query must not be empty");
    }
    let top_k = top_k.unwrap_or(config.retrieval.default_top_k);
    if top_k == 0 {
        bail!("--top-k must be >= 1");
    }
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let engine = EmbeddingEngine::from_config(&config.embedding)?;
    let retriever = Retriever::new(engine);
    let catalog_store = config.catalog_store();
    let vector_store = config.vector_store();

    let result = retriever
        .search_scored(&catalog_store, &vector_store, query, top_k)
        .await;
    catalog_store.close().await;
    vector_store.close().await;
    let results = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for hit in &results {
        println!("{}. [{:.3}] {}", hit.rank, hit.score, hit.course.title);
        println!("    url: {}", hit.course.url);
        if !hit.course.description.is_empty() {
            println!("    {}", truncate(&hit.course.description, 120));
        }
        println!();
    }

    Ok(())
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
