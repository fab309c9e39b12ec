//! Delimited (CSV) source files → documents.
//!
//! Used by [`DocumentStore::load_delimited_files_from_directory`](crate::store::DocumentStore::load_delimited_files_from_directory)
//! to seed a catalog. Files are decoded with a WHATWG encoding label, the
//! first row is the header, and cells are typed: empty → `null`, integers and
//! finite floats → numbers, everything else → strings.

use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use serde_json::{Number, Value};
use tracing::warn;

use crate::error::{ResourceKind, StoreError};
use crate::models::Document;

const EXTENSION: &str = "csv";

/// Resolve an encoding label such as `utf-8`, `latin-1` or `windows-1252`.
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding, StoreError> {
    let normalized = label.trim().to_ascii_lowercase();
    let lookup = match normalized.as_str() {
        "latin-1" | "latin_1" => "latin1",
        "utf_8" => "utf-8",
        other => other,
    };
    Encoding::for_label(lookup.as_bytes())
        .ok_or_else(|| StoreError::UnsupportedEncoding(label.to_string()))
}

/// List the `.csv` files directly inside `dir`, sorted by file name so the
/// resulting catalog order does not depend on directory iteration order.
pub fn list_delimited_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    if !dir.is_dir() {
        return Err(StoreError::not_found(
            ResourceKind::Directory,
            dir.display().to_string(),
        ));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case(EXTENSION))
            .unwrap_or(false);
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parse one delimited file into documents, in file row order.
pub fn read_delimited_file(
    path: &Path,
    encoding: &'static Encoding,
) -> Result<Vec<Document>, StoreError> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            StoreError::not_found(ResourceKind::File, path.display().to_string())
        }
        _ => StoreError::Io(e),
    })?;

    let (text, _, had_errors) = encoding.decode(&bytes);
    if had_errors {
        warn!(
            file = %path.display(),
            encoding = encoding.name(),
            "replaced undecodable bytes while reading delimited file"
        );
    }

    parse_delimited(&text).map_err(|source| StoreError::Delimited {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_delimited(text: &str) -> Result<Vec<Document>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = h.trim();
            if h.is_empty() {
                format!("column_{}", i)
            } else {
                h.to_string()
            }
        })
        .collect();

    let mut docs = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut doc = Document::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            doc.insert(header.clone(), infer_cell(cell));
        }
        docs.push(doc);
    }
    Ok(docs)
}

fn infer_cell(cell: &str) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(cell.to_string())
}
