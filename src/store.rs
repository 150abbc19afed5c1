//! Collection store backed by one JSON file per collection.
//!
//! Each collection lives at `<data_dir>/<collection>.json` as an object mapping
//! document id to stored record. Every write re-reads the file, inserts the new
//! record, and rewrites the whole file. There is no update or delete; ids are
//! never reused.
//!
//! # Identifiers
//!
//! Ids are `<collection>_<16 hex chars>`, the hex part taken from a random v4
//! UUID. A draw that clashes with an existing key is discarded and redrawn.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::models::Document;

const ID_HEX_LEN: usize = 16;

pub struct CollectionStore {
    data_dir: PathBuf,
}

impl CollectionStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn collection_path(&self, collection: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", collection))
    }

    /// Store `document` in `collection` and return its new id.
    ///
    /// # Errors
    ///
    /// Fails when the collection name is invalid, the document does not belong
    /// in this collection, or the collection file cannot be read, parsed, or
    /// written. The document is never silently dropped.
    pub fn add_document(&self, collection: &str, document: &Document) -> Result<String> {
        validate_collection_name(collection)?;
        document.check_collection(collection)?;

        std::fs::create_dir_all(&self.data_dir).with_context(|| {
            format!(
                "Failed to create data directory: {}",
                self.data_dir.display()
            )
        })?;

        let path = self.collection_path(collection);
        let mut records = read_collection(&path)?;

        let id = loop {
            let candidate = generate_id(collection);
            if !records.contains_key(&candidate) {
                break candidate;
            }
            tracing::debug!(id = %candidate, "id clash, drawing again");
        };

        let mut record = document.to_record()?;
        record.insert("id".to_string(), Value::String(id.clone()));
        if !record.contains_key("created_at") {
            record.insert("created_at".to_string(), serde_json::to_value(Utc::now())?);
        }
        records.insert(id.clone(), Value::Object(record));

        let json = serde_json::to_string_pretty(&records)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write collection file: {}", path.display()))?;

        tracing::debug!(collection, id = %id, "document stored");
        Ok(id)
    }

    /// All stored records of `collection`, keyed by id. Empty if never written.
    pub fn load_collection(&self, collection: &str) -> Result<Map<String, Value>> {
        validate_collection_name(collection)?;
        read_collection(&self.collection_path(collection))
    }
}

fn read_collection(path: &Path) -> Result<Map<String, Value>> {
    if !path.exists() {
        return Ok(Map::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read collection file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse collection file: {}", path.display()))
}

/// Collection names become file names.
fn validate_collection_name(collection: &str) -> Result<()> {
    if collection.is_empty() {
        bail!("collection name must not be empty");
    }
    if !collection
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        bail!(
            "invalid collection name '{}': use letters, digits, '_' or '-'",
            collection
        );
    }
    Ok(())
}

fn generate_id(collection: &str) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", collection, &hex[..ID_HEX_LEN])
}
