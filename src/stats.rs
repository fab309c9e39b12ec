//! Store statistics.
//!
//! Prints the document counts of the catalog and vector collections, so it is
//! easy to see whether the embedding dataset is in step with the catalog.

use anyhow::Result;

use crate::config::Config;
use crate::error::StoreError;
use crate::store::DocumentStore;

/// Document count of a collection, or `None` when the database or collection
/// does not exist yet.
async fn collection_count(store: &DocumentStore) -> Result<Option<u64>> {
    match store.connect(false).await {
        Ok(()) => {}
        Err(StoreError::NotFound { .. }) => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let count = store.count().await;
    store.close().await;
    Ok(Some(count?))
}

/// Run the stats command: count both collections and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let catalog = collection_count(&config.catalog_store()).await?;
    let vectors = collection_count(&config.vector_store()).await?;

    let db_path = config.catalog_store().handle().database_path();
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    println!("Course Compass: Store Stats");
    println!("===========================");
    println!();
    println!("  Database:    {}", db_path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!(
        "  Catalog:     {} ({})",
        describe(catalog),
        config.collections.catalog
    );
    println!(
        "  Vectors:     {} ({})",
        describe(vectors),
        config.collections.vectors
    );

    match (catalog, vectors) {
        (Some(c), Some(v)) if c != v => {
            println!();
            println!("  Vector rows do not match the catalog; run `compass build`.");
        }
        (Some(_), None) => {
            println!();
            println!("  No embedding dataset yet; run `compass build`.");
        }
        _ => {}
    }

    Ok(())
}

fn describe(count: Option<u64>) -> String {
    match count {
        Some(n) => n.to_string(),
        None => "missing".to_string(),
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
