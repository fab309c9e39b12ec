//! Typed catalog and matrix access on top of the [`DocumentStore`].
//!
//! Each helper is one logical operation: connect (creating the target only
//! when writing), perform a single read or write, and hand the pooled
//! connection back. No state lives here.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde_json::{Number, Value};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::StoreError;
use crate::models::{CourseRecord, Document, EmbeddingMatrix, Table, ID_FIELD};
use crate::store::DocumentStore;

/// Seed a catalog collection from the CSV files in `dir`.
pub async fn setup_from_files(
    store: &DocumentStore,
    dir: &Path,
    encoding: &str,
) -> Result<usize, StoreError> {
    store.connect(true).await?;
    store.load_delimited_files_from_directory(dir, encoding).await
}

/// Run the seed command. Flags override the `[seed]` section of the config.
pub async fn run_seed(
    config: &Config,
    dir: Option<PathBuf>,
    encoding: Option<String>,
) -> Result<()> {
    let dir = match (dir, config.seed.as_ref()) {
        (Some(dir), _) => dir,
        (None, Some(seed)) => seed.directory.clone(),
        (None, None) => bail!("No seed directory. Pass --dir or set [seed] directory in config."),
    };
    let encoding = encoding
        .or_else(|| config.seed.as_ref().map(|s| s.encoding.clone()))
        .unwrap_or_else(|| "utf-8".to_string());

    let store = config.catalog_store();
    let result = setup_from_files(&store, &dir, &encoding).await;
    store.close().await;
    let inserted = result?;

    info!(inserted, dir = %dir.display(), "catalog seeded");
    println!("seed");
    println!("  directory: {}", dir.display());
    println!("  collection: {}", config.collections.catalog);
    println!("  documents inserted: {}", inserted);
    Ok(())
}

/// All documents of an existing collection, in catalog order.
pub async fn load_as_records(store: &DocumentStore) -> Result<Vec<Document>, StoreError> {
    store.connect(false).await?;
    store.read_all_as_records().await
}

/// All documents of an existing collection, in tabular form.
pub async fn load_as_table(store: &DocumentStore) -> Result<Table, StoreError> {
    store.connect(false).await?;
    store.read_all_as_table().await
}

/// Replace the contents of `store` with one document per matrix row.
pub async fn persist_matrix(
    store: &DocumentStore,
    matrix: &EmbeddingMatrix,
) -> Result<usize, StoreError> {
    let documents = matrix_to_documents(matrix)?;
    store.connect(true).await?;
    store.write_table(&documents, true).await
}

/// Load and validate the catalog. Position `i` in the result is catalog row `i`.
pub async fn load_courses(store: &DocumentStore) -> Result<Vec<CourseRecord>, StoreError> {
    let records = load_as_records(store).await?;
    records
        .into_iter()
        .enumerate()
        .map(|(index, doc)| {
            CourseRecord::from_document(doc)
                .map_err(|reason| StoreError::InvalidRecord { index, reason })
        })
        .collect()
}

/// Load the persisted embedding matrix.
pub async fn load_matrix(store: &DocumentStore) -> Result<EmbeddingMatrix, StoreError> {
    let table = load_as_table(store).await?;
    let matrix = table_to_matrix(&table)?;
    debug!(rows = matrix.len(), dims = matrix.dims(), "loaded embedding matrix");
    Ok(matrix)
}

/// Row `i` becomes `{"0": v0, "1": v1, ...}`. Non-finite values have no JSON
/// form and are rejected, so nothing unreadable is ever written.
pub fn matrix_to_documents(matrix: &EmbeddingMatrix) -> Result<Vec<Document>, StoreError> {
    matrix
        .rows()
        .enumerate()
        .map(|(row_index, row)| {
            row.iter()
                .enumerate()
                .map(|(i, v)| {
                    Number::from_f64(f64::from(*v))
                        .map(|n| (i.to_string(), Value::Number(n)))
                        .ok_or_else(|| StoreError::InvalidRecord {
                            index: row_index,
                            reason: format!("column {} is not a finite number ({})", i, v),
                        })
                })
                .collect::<Result<Document, StoreError>>()
        })
        .collect()
}

/// Inverse of [`matrix_to_documents`]: drops `_id` and orders the numeric
/// columns by index, whatever order the table lists them in.
pub fn table_to_matrix(table: &Table) -> Result<EmbeddingMatrix, StoreError> {
    let mut columns: Vec<(usize, usize)> = Vec::with_capacity(table.columns.len());
    for (position, name) in table.columns.iter().enumerate() {
        if name == ID_FIELD {
            continue;
        }
        let index: usize = name.parse().map_err(|_| StoreError::InvalidRecord {
            index: 0,
            reason: format!("unexpected column '{}' in embedding matrix", name),
        })?;
        columns.push((index, position));
    }
    columns.sort_unstable();

    if let Some((expected, (found, _))) = columns
        .iter()
        .enumerate()
        .find(|(expected, (found, _))| expected != found)
    {
        return Err(StoreError::InvalidRecord {
            index: 0,
            reason: format!(
                "embedding matrix columns are not contiguous: expected column {}, found {}",
                expected, found
            ),
        });
    }

    let mut rows = Vec::with_capacity(table.rows.len());
    for (row_index, row) in table.rows.iter().enumerate() {
        let vector = columns
            .iter()
            .map(|(col, position)| {
                row[*position]
                    .as_f64()
                    .map(|v| v as f32)
                    .ok_or_else(|| StoreError::InvalidRecord {
                        index: row_index,
                        reason: format!("column {} is not a number", col),
                    })
            })
            .collect::<Result<Vec<f32>, StoreError>>()?;
        rows.push(vector);
    }

    EmbeddingMatrix::from_rows(rows).map_err(|e| StoreError::InvalidRecord {
        index: e.row,
        reason: e.to_string(),
    })
}
