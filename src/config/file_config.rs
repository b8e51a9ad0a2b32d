use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// TOML configuration file. Every field is optional; values present here
/// override the command line.
///
/// ```toml
/// [storage]
/// db_path = "/var/lib/warehouse/warehouse.db"
///
/// [staging]
/// access_role = "arn:aws:iam::123456789012:role/warehouse-reader"
///
/// [staging.events]
/// location = "file:///data/log_data"
/// mapping = "file:///data/log_json_path.json"
///
/// [staging.songs]
/// location = "file:///data/song_data"
/// mapping = "auto"
/// ```
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub storage: Option<StorageConfig>,
    pub staging: Option<StagingConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct StagingConfig {
    pub access_role: Option<String>,
    pub events: Option<SourceConfig>,
    pub songs: Option<SourceConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SourceConfig {
    pub location: Option<String>,
    /// `auto` or the location of a JSONPaths document.
    pub mapping: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_all_sections() {
        let config: FileConfig = toml::from_str(
            r#"
            [storage]
            db_path = "/tmp/warehouse.db"

            [staging]
            access_role = "reader"

            [staging.events]
            location = "file:///data/log_data"
            mapping = "file:///data/log_json_path.json"

            [staging.songs]
            location = "file:///data/song_data"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.storage.unwrap().db_path.as_deref(),
            Some("/tmp/warehouse.db")
        );
        let staging = config.staging.unwrap();
        assert_eq!(staging.access_role.as_deref(), Some("reader"));
        assert_eq!(
            staging.events.unwrap().mapping.as_deref(),
            Some("file:///data/log_json_path.json")
        );
        assert!(staging.songs.unwrap().mapping.is_none());
    }

    #[test]
    fn empty_file_is_valid() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert!(config.storage.is_none());
        assert!(config.staging.is_none());
    }

    #[test]
    fn load_reports_missing_and_malformed_files() {
        let dir = TempDir::new().unwrap();
        assert!(FileConfig::load(&dir.path().join("missing.toml")).is_err());

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[storage\ndb_path = 1").unwrap();
        let err = FileConfig::load(&bad).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
