use crate::errors::TranslateError;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Read a JSON file, treating a missing file as `Value::Null` rather than
/// an error so callers (progress files, glossary caches) can always start
/// from a clean default on first run.
pub fn read_json_file(path: &Path) -> Result<Value, TranslateError> {
    if !path.exists() {
        return Ok(Value::Null);
    }
    let s = fs::read_to_string(path).map_err(|e| TranslateError::StorageError(e.to_string()))?;
    serde_json::from_str(&s).map_err(|e| TranslateError::StorageError(e.to_string()))
}

/// Write JSON to `path` via a temp-file-then-rename swap so a crash mid-write
/// never leaves a half-written progress or cache file behind.
pub fn write_json_atomic(path: &Path, json: &Value) -> Result<(), TranslateError> {
    let pretty = serde_json::to_string_pretty(json).map_err(|e| TranslateError::StorageError(e.to_string()))?;
    let tmp_path = path.with_extension("tmp");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TranslateError::StorageError(e.to_string()))?;
    }
    fs::write(&tmp_path, pretty).map_err(|e| TranslateError::StorageError(e.to_string()))?;
    fs::rename(&tmp_path, path).map_err(|e| TranslateError::StorageError(e.to_string()))?;
    Ok(())
}
