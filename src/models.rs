//! Core data models used throughout the retrieval engine.
//!
//! The store persists loosely-typed [`Document`]s. Everything past the
//! [`catalog`](crate::catalog) boundary works with validated
//! [`CourseRecord`]s and row-aligned [`EmbeddingMatrix`]es.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A single document as stored in a collection.
pub type Document = serde_json::Map<String, Value>;

/// Store-assigned identifier field present on every document read back from
/// a collection. Never used for row alignment.
pub const ID_FIELD: &str = "_id";

/// `(field, alias)` pairs accepted by [`CourseRecord`].
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("title", "name"),
    ("learning_hours", "duration"),
    ("course_type", "level"),
];

/// A course in the catalog, validated at the store boundary.
///
/// Field order is fixed and `extra` is key-ordered, so serializing the same
/// record always produces the same text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseRecord {
    #[serde(alias = "name", deserialize_with = "required_text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: String,
    #[serde(deserialize_with = "required_text")]
    pub url: String,
    #[serde(
        default,
        alias = "duration",
        deserialize_with = "optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub learning_hours: Option<String>,
    #[serde(
        default,
        alias = "level",
        deserialize_with = "optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub course_type: Option<String>,
    #[serde(
        default,
        deserialize_with = "tag_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tags: Vec<String>,
    /// Catalog-specific fields with no dedicated slot (price, rating, host, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CourseRecord {
    /// Validate a stored document into a course. The `_id` field is dropped.
    ///
    /// When a document carries both a field and its alias (say `title` and
    /// `name`), the field wins and the alias is kept in `extra`.
    pub fn from_document(mut doc: Document) -> Result<Self, String> {
        doc.remove(ID_FIELD);
        let mut shadowed = Vec::new();
        for (field, alias) in FIELD_ALIASES {
            if doc.contains_key(*field) {
                if let Some(value) = doc.remove(*alias) {
                    shadowed.push((alias.to_string(), value));
                }
            }
        }

        let mut record: CourseRecord =
            serde_json::from_value(Value::Object(doc)).map_err(|e| e.to_string())?;
        record.extra.extend(shadowed);
        if record.title.trim().is_empty() {
            return Err("title must not be empty".to_string());
        }
        if record.url.trim().is_empty() {
            return Err("url must not be empty".to_string());
        }
        Ok(record)
    }

    /// Convert back to a plain document (used when seeding from typed records).
    pub fn to_document(&self) -> Document {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Document::new(),
        }
    }
}

fn scalar_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn required_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    scalar_to_text(value).ok_or_else(|| serde::de::Error::custom("required field is null"))
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_text(value).unwrap_or_default())
}

fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_text(value).filter(|s| !s.is_empty()))
}

/// Tags arrive either as a JSON array or, from CSV sources, as a string such
/// as `"['python', 'data']"` or `"python, data"`.
fn tag_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let tags = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.into_iter().filter_map(scalar_to_text).collect(),
        Value::String(s) => parse_tag_string(&s),
        other => vec![other.to_string()],
    };
    Ok(tags)
}

pub(crate) fn parse_tag_string(raw: &str) -> Vec<String> {
    let inner = raw
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']');
    inner
        .split(',')
        .map(|t| t.trim().trim_matches(|c| c == '\'' || c == '"').trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Tabular view of a collection: the union of document keys as columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Columns appear in first-seen order; absent cells are `null`.
    pub fn from_documents(docs: &[Document]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for doc in docs {
            for key in doc.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = docs
            .iter()
            .map(|doc| {
                columns
                    .iter()
                    .map(|c| doc.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("embedding row {row} has {found} values, expected {expected}")]
pub struct RaggedRowError {
    pub row: usize,
    pub expected: usize,
    pub found: usize,
}

/// Embedding vectors for a catalog; row `i` belongs to catalog record `i`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmbeddingMatrix {
    dims: usize,
    rows: Vec<Vec<f32>>,
}

impl EmbeddingMatrix {
    /// Build a matrix, rejecting rows whose width differs from the first row.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, RaggedRowError> {
        let dims = rows.first().map(Vec::len).unwrap_or(0);
        if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != dims) {
            return Err(RaggedRowError {
                row,
                expected: dims,
                found: r.len(),
            });
        }
        Ok(Self { dims, rows })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.rows.iter().map(Vec::as_slice)
    }
}

/// A ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCourse {
    /// 1-based position in the result list.
    pub rank: usize,
    /// Cosine similarity between the query and the course vector.
    pub score: f32,
    pub course: CourseRecord,
}
