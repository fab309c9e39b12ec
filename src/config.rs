use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::store::{validate_name, CollectionHandle, Credentials, DocumentStore};

/// Environment variable consulted when `[store].password` is not set.
pub const PASSWORD_ENV: &str = "COMPASS_STORE_PASSWORD";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub collections: CollectionsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub seed: Option<SeedConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub address: PathBuf,
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub auth_mechanism: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectionsConfig {
    #[serde(default = "default_catalog_collection")]
    pub catalog: String,
    #[serde(default = "default_vectors_collection")]
    pub vectors: String,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            catalog: default_catalog_collection(),
            vectors: default_vectors_collection(),
        }
    }
}

fn default_catalog_collection() -> String {
    "courses".to_string()
}
fn default_vectors_collection() -> String {
    "embedded_dataset".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            url: None,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeedConfig {
    pub directory: PathBuf,
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

impl Config {
    fn credentials(&self) -> Credentials {
        Credentials {
            username: self.store.username.clone(),
            password: self
                .store
                .password
                .clone()
                .or_else(|| std::env::var(PASSWORD_ENV).ok()),
            auth_mechanism: self.store.auth_mechanism.clone(),
        }
    }

    fn handle_for(&self, collection: &str) -> CollectionHandle {
        CollectionHandle::new(&self.store.address, &self.store.database, collection)
            .with_credentials(self.credentials())
    }

    /// Store for the course catalog collection.
    pub fn catalog_store(&self) -> DocumentStore {
        DocumentStore::with_max_connections(
            self.handle_for(&self.collections.catalog),
            self.store.max_connections,
        )
    }

    /// Store for the embedded dataset collection.
    pub fn vector_store(&self) -> DocumentStore {
        DocumentStore::with_max_connections(
            self.handle_for(&self.collections.vectors),
            self.store.max_connections,
        )
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate store
    validate_name(&config.store.database).context("store.database")?;
    validate_name(&config.collections.catalog).context("collections.catalog")?;
    validate_name(&config.collections.vectors).context("collections.vectors")?;
    if config.collections.catalog == config.collections.vectors {
        bail!("collections.catalog and collections.vectors must be different collections");
    }
    if config.store.max_connections == 0 {
        bail!("store.max_connections must be >= 1");
    }

    // Validate retrieval
    if config.retrieval.default_top_k == 0 {
        bail!("retrieval.default_top_k must be >= 1");
    }

    // Validate embedding
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "ollama" => {
            if config.embedding.model.is_none() {
                bail!("embedding.model must be specified when provider is 'ollama'");
            }
            if matches!(config.embedding.dims, None | Some(0)) {
                bail!("embedding.dims must be > 0 when provider is 'ollama'");
            }
        }
        "hashing" => {
            if config.embedding.dims == Some(0) {
                bail!("embedding.dims must be > 0 when provider is 'hashing'");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, local, ollama, or hashing.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_text)?;
        validate(&config)?;
        Ok(config)
    }

    const MINIMAL: &str = r#"
[store]
address = "./data"
database = "course_compass"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse(MINIMAL).unwrap();
        assert_eq!(config.collections.catalog, "courses");
        assert_eq!(config.collections.vectors, "embedded_dataset");
        assert_eq!(config.retrieval.default_top_k, 5);
        assert!(!config.embedding.is_enabled());
        assert!(config.seed.is_none());
        assert_eq!(config.store.max_connections, 5);
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
[store]
address = "/var/lib/compass"
database = "ibm_chatbot"
username = "chatbot"
password = "pw"
auth_mechanism = "SCRAM-SHA-1"

[collections]
catalog = "courses"
vectors = "embedded"

[embedding]
provider = "hashing"
dims = 128

[retrieval]
default_top_k = 10

[seed]
directory = "./catalog"
encoding = "latin-1"
"#,
        )
        .unwrap();
        assert_eq!(config.embedding.dims, Some(128));
        assert_eq!(config.seed.unwrap().encoding, "latin-1");

        let store = parse(MINIMAL).unwrap().catalog_store();
        assert_eq!(store.collection(), "courses");
    }

    #[test]
    fn test_rejects_same_collection_twice() {
        let err = parse(
            r#"
[store]
address = "./data"
database = "db"

[collections]
catalog = "same"
vectors = "same"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("different"));
    }

    #[test]
    fn test_rejects_bad_names_and_providers() {
        let bad_name = format!("{}\n", MINIMAL.replace("course_compass", "course-compass"));
        assert!(parse(&bad_name).is_err());

        let bad_provider = format!("{}\n[embedding]\nprovider = \"magic\"\n", MINIMAL);
        let err = parse(&bad_provider).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));

        let ollama_without_model = format!("{}\n[embedding]\nprovider = \"ollama\"\n", MINIMAL);
        assert!(parse(&ollama_without_model).is_err());
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let text = format!("{}\n[retrieval]\ndefault_top_k = 0\n", MINIMAL);
        assert!(parse(&text).is_err());
    }
}
