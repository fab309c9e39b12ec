//! Document store: named collections of JSON documents.
//!
//! A [`CollectionHandle`] names a server address, a database and a
//! collection. The backend is embedded SQLite: the address is a directory,
//! each database is a `<database>.sqlite` file inside it, and each collection
//! is a table of JSON documents kept in insertion order.
//!
//! # Sessions
//!
//! [`DocumentStore::connect`] opens (or reuses) a connection pool and
//! validates the target. Every operation afterwards acquires its own pooled
//! connection, which is returned to the pool when the operation's guard drops,
//! on success and on error alike. [`DocumentStore::close`] shuts the pool;
//! operations then fail with [`StoreError::NoActiveSession`] until the next
//! `connect`.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`connect`](DocumentStore::connect) | Open + validate (or create) database and collection |
//! | [`load_delimited_files_from_directory`](DocumentStore::load_delimited_files_from_directory) | Bulk-load CSV files |
//! | [`write_table`](DocumentStore::write_table) | Insert documents, optionally replacing the collection |
//! | [`read_all_as_records`](DocumentStore::read_all_as_records) | All documents, insertion order |
//! | [`read_all_as_table`](DocumentStore::read_all_as_table) | All documents as a [`Table`] |
//!
//! Reads never return an empty result: a collection without documents is
//! reported as [`StoreError::EmptyCollection`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Connection, Row, Sqlite, SqliteConnection};
use tracing::{debug, info};
use uuid::Uuid;

use crate::delimited;
use crate::error::{ResourceKind, StoreError};
use crate::models::{Document, Table, ID_FIELD};

const DATABASE_EXTENSION: &str = "sqlite";

/// Credentials presented when opening a session.
///
/// The embedded SQLite backend keeps them on the handle for parity with
/// networked deployments but does not authenticate.
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_mechanism: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("auth_mechanism", &self.auth_mechanism)
            .finish()
    }
}

/// Identifies one collection: address, database, collection, credentials.
#[derive(Debug, Clone)]
pub struct CollectionHandle {
    pub address: PathBuf,
    pub database: String,
    pub collection: String,
    pub credentials: Credentials,
}

impl CollectionHandle {
    pub fn new(
        address: impl Into<PathBuf>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            database: database.into(),
            collection: collection.into(),
            credentials: Credentials::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Path of the SQLite file backing this handle's database.
    pub fn database_path(&self) -> PathBuf {
        self.address
            .join(format!("{}.{}", self.database, DATABASE_EXTENSION))
    }
}

/// Database and collection names become file and table names.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && !name.starts_with("sqlite_")
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidCollectionName(name.to_string()))
    }
}

/// A single collection in the document store.
pub struct DocumentStore {
    handle: CollectionHandle,
    max_connections: u32,
    pool: RwLock<Option<SqlitePool>>,
}

impl DocumentStore {
    pub fn new(handle: CollectionHandle) -> Self {
        Self::with_max_connections(handle, 5)
    }

    pub fn with_max_connections(handle: CollectionHandle, max_connections: u32) -> Self {
        Self {
            handle,
            max_connections: max_connections.max(1),
            pool: RwLock::new(None),
        }
    }

    pub fn handle(&self) -> &CollectionHandle {
        &self.handle
    }

    pub fn database(&self) -> &str {
        &self.handle.database
    }

    pub fn collection(&self) -> &str {
        &self.handle.collection
    }

    /// Establish a session.
    ///
    /// With `create_if_missing = false` the database file and the collection
    /// must already exist ([`StoreError::NotFound`]); with `true` both are
    /// created. An unusable address is a [`StoreError::ConnectionFailure`].
    /// A failed validation leaves the store disconnected.
    pub async fn connect(&self, create_if_missing: bool) -> Result<(), StoreError> {
        validate_name(&self.handle.database)?;
        validate_name(&self.handle.collection)?;

        let pool = match self.live_pool() {
            Some(pool) => pool,
            None => {
                let opened = self.open_pool(create_if_missing).await?;
                self.install_pool(opened).await
            }
        };

        if let Err(e) = self.ensure_collection(&pool, create_if_missing).await {
            self.close().await;
            return Err(e);
        }

        debug!(
            database = %self.handle.database,
            collection = %self.handle.collection,
            create_if_missing,
            "document store session ready"
        );
        Ok(())
    }

    /// Whether a live session (open pool) exists.
    pub fn is_connected(&self) -> bool {
        self.live_pool().is_some()
    }

    /// Release the session. Safe to call when not connected.
    pub async fn close(&self) {
        let pool = self
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pool) = pool {
            pool.close().await;
            debug!(database = %self.handle.database, "document store session closed");
        }
    }

    /// Read every `.csv` file in `dir` and insert its rows as documents.
    ///
    /// Files are loaded in file-name order within a single transaction.
    /// Returns the number of documents inserted.
    pub async fn load_delimited_files_from_directory(
        &self,
        dir: &Path,
        encoding: &str,
    ) -> Result<usize, StoreError> {
        let files = delimited::list_delimited_files(dir)?;
        let mut conn = self.session().await?;
        if files.is_empty() {
            return Err(StoreError::NoFilesFound(dir.to_path_buf()));
        }
        let encoding = delimited::resolve_encoding(encoding)?;

        let mut tx = conn.begin().await?;
        let mut total = 0usize;
        for file in &files {
            let docs = delimited::read_delimited_file(file, encoding)?;
            let inserted = insert_documents(&mut tx, &self.handle.collection, &docs).await?;
            info!(file = %file.display(), documents = inserted, "loaded delimited file");
            total += inserted;
        }
        tx.commit().await?;

        info!(
            collection = %self.handle.collection,
            files = files.len(),
            documents = total,
            "bulk load complete"
        );
        Ok(total)
    }

    /// Insert `documents`. With `replace_existing`, the collection is emptied
    /// first; delete and insert commit together.
    pub async fn write_table(
        &self,
        documents: &[Document],
        replace_existing: bool,
    ) -> Result<usize, StoreError> {
        let mut conn = self.session().await?;
        let table = quote_ident(&self.handle.collection);

        let mut tx = conn.begin().await?;
        if replace_existing {
            let deleted = sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?
                .rows_affected();
            debug!(collection = %self.handle.collection, deleted, "cleared collection");
        }
        let written = insert_documents(&mut tx, &self.handle.collection, documents).await?;
        tx.commit().await?;

        info!(
            collection = %self.handle.collection,
            written,
            replace_existing,
            "wrote documents"
        );
        Ok(written)
    }

    /// Every document in insertion order, each carrying its `_id`.
    pub async fn read_all_as_records(&self) -> Result<Vec<Document>, StoreError> {
        let mut conn = self.session().await?;
        let rows = sqlx::query(&format!(
            "SELECT doc_id, body FROM {} ORDER BY seq",
            quote_ident(&self.handle.collection)
        ))
        .fetch_all(&mut *conn)
        .await?;

        if rows.is_empty() {
            return Err(StoreError::EmptyCollection {
                database: self.handle.database.clone(),
                collection: self.handle.collection.clone(),
            });
        }

        let mut docs = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("doc_id");
            let body: String = row.get("body");
            let mut doc: Document = serde_json::from_str(&body)?;
            doc.insert(ID_FIELD.to_string(), serde_json::Value::String(id));
            docs.push(doc);
        }
        Ok(docs)
    }

    /// Every document as a [`Table`] (the `_id` column included).
    pub async fn read_all_as_table(&self) -> Result<Table, StoreError> {
        let docs = self.read_all_as_records().await?;
        Ok(Table::from_documents(&docs))
    }

    /// Number of documents in the collection (zero is not an error here).
    pub async fn count(&self) -> Result<u64, StoreError> {
        let mut conn = self.session().await?;
        let n: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {}",
            quote_ident(&self.handle.collection)
        ))
        .fetch_one(&mut *conn)
        .await?;
        Ok(n as u64)
    }

    // ============ Session plumbing ============

    fn live_pool(&self) -> Option<SqlitePool> {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|p| !p.is_closed())
            .cloned()
    }

    /// Store a freshly opened pool unless a concurrent `connect` won the race.
    async fn install_pool(&self, opened: SqlitePool) -> SqlitePool {
        let existing = {
            let mut slot = self.pool.write().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref().filter(|p| !p.is_closed()) {
                Some(current) => Some(current.clone()),
                None => {
                    *slot = Some(opened.clone());
                    None
                }
            }
        };
        match existing {
            Some(current) => {
                opened.close().await;
                current
            }
            None => opened,
        }
    }

    async fn open_pool(&self, create: bool) -> Result<SqlitePool, StoreError> {
        let address = &self.handle.address;
        let address_str = address.display().to_string();

        if create {
            std::fs::create_dir_all(address)
                .map_err(|e| StoreError::connection(address_str.clone(), e))?;
        } else if !address.is_dir() {
            return Err(StoreError::connection(
                address_str,
                "address is not an existing directory",
            ));
        }

        let db_path = self.handle.database_path();
        if !create && !db_path.is_file() {
            return Err(StoreError::not_found(
                ResourceKind::Database,
                self.handle.database.clone(),
            ));
        }

        if self.handle.credentials.username.is_some() {
            debug!(
                credentials = ?self.handle.credentials,
                "embedded store ignores credentials"
            );
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::connection(db_path.display().to_string(), e))?;

        info!(database = %db_path.display(), "opened document store");
        Ok(pool)
    }

    async fn ensure_collection(&self, pool: &SqlitePool, create: bool) -> Result<(), StoreError> {
        let mut conn = acquire(pool, &self.handle).await?;
        let name = &self.handle.collection;

        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;

        if exists {
            return Ok(());
        }
        if !create {
            return Err(StoreError::not_found(ResourceKind::Collection, name.clone()));
        }

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                doc_id TEXT NOT NULL UNIQUE,
                body TEXT NOT NULL
            )
            "#,
            quote_ident(name)
        ))
        .execute(&mut *conn)
        .await?;

        info!(database = %self.handle.database, collection = %name, "created collection");
        Ok(())
    }

    /// Scoped acquisition: the returned guard goes back to the pool on drop.
    async fn session(&self) -> Result<PoolConnection<Sqlite>, StoreError> {
        let pool = self.live_pool().ok_or(StoreError::NoActiveSession)?;
        acquire(&pool, &self.handle).await
    }
}

async fn acquire(
    pool: &SqlitePool,
    handle: &CollectionHandle,
) -> Result<PoolConnection<Sqlite>, StoreError> {
    pool.acquire().await.map_err(|e| match e {
        sqlx::Error::PoolClosed => StoreError::NoActiveSession,
        other => StoreError::connection(handle.database_path().display().to_string(), other),
    })
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Insert documents in order. A string `_id` is kept as the document id;
/// otherwise a fresh UUID is assigned.
async fn insert_documents(
    conn: &mut SqliteConnection,
    collection: &str,
    documents: &[Document],
) -> Result<usize, StoreError> {
    let sql = format!(
        "INSERT INTO {} (doc_id, body) VALUES (?, ?)",
        quote_ident(collection)
    );

    for doc in documents {
        let (id, body) = match doc.get(ID_FIELD) {
            Some(serde_json::Value::String(id)) => {
                let mut body = doc.clone();
                body.remove(ID_FIELD);
                (id.clone(), serde_json::to_string(&body)?)
            }
            _ => (Uuid::new_v4().to_string(), serde_json::to_string(doc)?),
        };

        sqlx::query(&sql)
            .bind(id)
            .bind(body)
            .execute(&mut *conn)
            .await?;
    }

    Ok(documents.len())
}
