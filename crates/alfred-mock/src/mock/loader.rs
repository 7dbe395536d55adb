//! Reading mock files from disk.

use super::types::{LoadError, MockDefinition, MockError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `*.json` files of a directory, sorted by file name
pub fn mock_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        LoadError::single(MockError::Parse {
            file: dir.to_path_buf(),
            reason: format!("cannot read mocks directory: {e}"),
        })
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("json"))
                    .unwrap_or(false)
        })
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Parse one mock file: a single definition or an array of them
pub fn read_mock_file(path: &Path) -> Result<Vec<MockDefinition>, MockError> {
    let parse_error = |reason: String| MockError::Parse {
        file: path.to_path_buf(),
        reason,
    };

    let contents = std::fs::read_to_string(path).map_err(|e| parse_error(e.to_string()))?;
    let value: Value = serde_json::from_str(&contents).map_err(|e| parse_error(e.to_string()))?;

    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value(item).map_err(|e| parse_error(format!("mock #{i}: {e}")))
            })
            .collect(),
        single => serde_json::from_value(single)
            .map(|def| vec![def])
            .map_err(|e| parse_error(e.to_string())),
    }
}

/// Every definition in the directory, in declaration order
pub fn load_directory(dir: &Path) -> Result<Vec<MockDefinition>, LoadError> {
    let mut definitions = Vec::new();
    let mut errors = Vec::new();

    for file in mock_files(dir)? {
        match read_mock_file(&file) {
            Ok(defs) => {
                debug!("Read {} mock(s) from {}", defs.len(), file.display());
                definitions.extend(defs);
            }
            Err(e) => errors.push(e),
        }
    }

    if errors.is_empty() {
        Ok(definitions)
    } else {
        Err(LoadError { errors })
    }
}
