use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by bulk loading
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read store file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store file {path} is not a JSON object of key/value pairs: {reason}")]
    Format { path: PathBuf, reason: String },
}

/// Process-wide key-value store shared by every script invocation.
///
/// All operations are synchronous: scripts run on dedicated worker threads and
/// call straight into the store from native functions.
pub trait KeyValueStore: Send + Sync {
    /// Get a value; absence is not an error
    fn get(&self, key: &str) -> Option<String>;

    /// Set a value, replacing any previous one
    fn set(&self, key: &str, value: String);

    /// Delete a key (no-op when absent)
    fn delete(&self, key: &str);

    /// Read several keys under one consistent view
    fn get_many(&self, keys: &[&str]) -> Vec<Option<String>>;

    /// Apply every entry as a single visible update. Returns the entry count.
    fn load_batch(&self, entries: Vec<(String, String)>) -> usize;

    /// Apply a script's buffered writes as a single visible update. `None`
    /// deletes the key.
    fn apply(&self, writes: Vec<(String, Option<String>)>);

    /// Number of stored keys
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every key. Returns how many were removed.
    fn clear(&self) -> usize;

    /// Bulk-load a JSON object file.
    ///
    /// The file is parsed completely before anything is written, so a missing or
    /// malformed file leaves the store unchanged.
    fn load_file(&self, path: &Path) -> Result<usize, StoreError> {
        let entries = read_batch_file(path)?;
        Ok(self.load_batch(entries))
    }
}

/// Parse a bulk file into key/value pairs.
///
/// String values are kept verbatim; any other JSON value is stored as its JSON text.
pub fn read_batch_file(path: &Path) -> Result<Vec<(String, String)>, StoreError> {
    let contents = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let value: Value = serde_json::from_str(&contents).map_err(|e| StoreError::Format {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let Value::Object(map) = value else {
        return Err(StoreError::Format {
            path: path.to_path_buf(),
            reason: "top-level value must be an object".to_string(),
        });
    };

    Ok(map
        .into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect())
}

/// Create the store described by the configuration, seeding it when asked.
pub fn create_store(config: &crate::config::StoreConfig) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    use crate::backends::InMemoryStore;
    use anyhow::Context;

    let store = InMemoryStore::new();

    if let Some(seed) = &config.seed_file {
        let count = store
            .load_file(seed)
            .with_context(|| format!("Failed to seed store from {}", seed.display()))?;
        tracing::info!("Seeded in-memory store with {} entries from {}", count, seed.display());
    } else {
        tracing::info!("Using in-memory store");
    }

    Ok(Arc::new(store))
}
