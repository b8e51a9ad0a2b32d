//! Storage locations of raw records.
//!
//! Locations are `file://` URIs or plain filesystem paths pointing at either
//! a single file or a directory tree. Remote object-store schemes are not
//! reachable from here and are reported as configuration errors.

use crate::error::{WarehouseError, WarehouseResult};
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const RECORD_FILE_EXTENSIONS: &[&str] = &["json", "jsonl", "ndjson"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocation {
    uri: String,
    path: PathBuf,
}

impl StorageLocation {
    pub fn parse(uri: &str) -> WarehouseResult<Self> {
        let trimmed = uri.trim().trim_matches('\'');
        if trimmed.is_empty() {
            return Err(WarehouseError::configuration("Storage location is empty"));
        }

        let path = match trimmed.split_once("://") {
            Some(("file", rest)) => PathBuf::from(rest),
            Some((scheme, _)) => {
                return Err(WarehouseError::configuration(format!(
                    "Unsupported storage scheme '{}' in {}",
                    scheme, trimmed
                )))
            }
            None => PathBuf::from(trimmed),
        };

        Ok(StorageLocation {
            uri: trimmed.to_string(),
            path,
        })
    }

    /// Lists the record files under this location, sorted by path so that
    /// repeated copies of the same tree assign sequence numbers in the same
    /// relative order.
    pub fn record_files(&self) -> WarehouseResult<Vec<PathBuf>> {
        if !self.path.exists() {
            return Err(WarehouseError::staging(
                &self.uri,
                "location does not exist",
            ));
        }
        if self.path.is_file() {
            return Ok(vec![self.path.clone()]);
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.path).follow_links(true) {
            let entry = entry.map_err(|e| WarehouseError::staging(&self.uri, e.to_string()))?;
            if entry.file_type().is_file() && is_record_file(entry.path()) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn read_to_string(&self) -> WarehouseResult<String> {
        std::fs::read_to_string(&self.path)
            .map_err(|e| WarehouseError::staging(&self.uri, e.to_string()))
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

fn is_record_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            RECORD_FILE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
