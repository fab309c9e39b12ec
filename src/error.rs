//! Error taxonomy for the document store and the retrieval engine.
//!
//! [`StoreError`] covers everything the [`store`](crate::store) and
//! [`catalog`](crate::catalog) layers can report. None of these are retried:
//! they propagate unchanged through the dataset builder and the retrieval
//! engine (wrapped in `anyhow::Error`), and the caller recovers the kind with
//! `err.downcast_ref::<StoreError>()`.
//!
//! [`RetrievalError`] covers the query-time alignment guard.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// The kind of object a [`StoreError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Database,
    Collection,
    Directory,
    File,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Database => "Database",
            ResourceKind::Collection => "Collection",
            ResourceKind::Directory => "Directory",
            ResourceKind::File => "File",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store at `address` could not be reached or refused the session.
    #[error("failed to connect to document store at {address}: {source}")]
    ConnectionFailure {
        address: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("not connected to the document store")]
    NoActiveSession,

    #[error("{kind}: {name} does not exist")]
    NotFound { kind: ResourceKind, name: String },

    #[error("no CSV files found in given path: {}", .0.display())]
    NoFilesFound(PathBuf),

    #[error("{collection} collection inside of {database} database is empty")]
    EmptyCollection { database: String, collection: String },

    #[error("invalid collection or database name '{0}': use ASCII letters, digits and '_'")]
    InvalidCollectionName(String),

    #[error("unsupported text encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("malformed delimited file {}: {source}", path.display())]
    Delimited {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("document {index} is invalid: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("document store query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn connection(
        address: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        StoreError::ConnectionFailure {
            address: address.into(),
            source: source.into(),
        }
    }

    pub(crate) fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// True for [`StoreError::EmptyCollection`].
    pub fn is_empty_collection(&self) -> bool {
        matches!(self, StoreError::EmptyCollection { .. })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetrievalError {
    /// Catalog and embedding matrix disagree on length; the dataset must be rebuilt.
    #[error(
        "embedding matrix has {vectors} rows but the catalog has {catalog} records; rebuild the embedded dataset"
    )]
    RowCountMismatch { catalog: usize, vectors: usize },

    #[error("query vector has {query} dimensions but the embedding matrix has {matrix}")]
    DimensionMismatch { query: usize, matrix: usize },
}
