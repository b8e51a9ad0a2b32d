mod file_config;

pub use file_config::{FileConfig, SourceConfig, StagingConfig, StorageConfig};

use crate::error::{WarehouseError, WarehouseResult};
use crate::staging::{AccessCredentials, CopyRequest, StagingTarget};
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// TOML values take precedence over these.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub log_data: Option<String>,
    pub log_mapping: Option<String>,
    pub song_data: Option<String>,
    pub access_role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSettings {
    pub location: Option<String>,
    pub mapping: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub access_role: Option<String>,
    pub events: SourceSettings,
    pub songs: SourceSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    ///
    /// Only the database path is required here; staging settings are checked
    /// by [`AppConfig::copy_requests`] since not every command stages data.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> WarehouseResult<Self> {
        let file = file_config.unwrap_or_default();
        let storage = file.storage.unwrap_or_default();
        let staging = file.staging.unwrap_or_default();

        let db_path = storage
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                WarehouseError::configuration(
                    "db_path must be specified via --db-path or in config file",
                )
            })?;

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                return Err(WarehouseError::configuration(format!(
                    "Database directory does not exist: {:?}",
                    parent
                )));
            }
        }

        let access_role = staging.access_role.or_else(|| cli.access_role.clone());

        let events_file = staging.events.unwrap_or_default();
        let events = SourceSettings {
            location: events_file.location.or_else(|| cli.log_data.clone()),
            mapping: events_file.mapping.or_else(|| cli.log_mapping.clone()),
        };

        let songs_file = staging.songs.unwrap_or_default();
        let songs = SourceSettings {
            location: songs_file.location.or_else(|| cli.song_data.clone()),
            mapping: songs_file.mapping,
        };

        Ok(Self {
            db_path,
            access_role,
            events,
            songs,
        })
    }

    /// Builds the staging copies for both sources, events first.
    ///
    /// Fails before anything is copied if the access role or a source
    /// location is missing.
    pub fn copy_requests(&self) -> WarehouseResult<Vec<CopyRequest>> {
        let role = self.access_role.clone().ok_or_else(|| {
            WarehouseError::configuration(
                "access_role must be specified via --access-role or in config file",
            )
        })?;
        let credentials = AccessCredentials::new(role)?;

        [
            (StagingTarget::Events, &self.events, "--log-data"),
            (StagingTarget::Songs, &self.songs, "--song-data"),
        ]
        .into_iter()
        .map(|(target, source, flag)| -> WarehouseResult<CopyRequest> {
            let location = source.location.clone().ok_or_else(|| {
                WarehouseError::configuration(format!(
                    "{} location must be specified via {} or in config file",
                    target, flag
                ))
            })?;
            Ok(CopyRequest {
                target,
                location,
                credentials: credentials.clone(),
                mapping: source.mapping.clone(),
            })
        })
        .collect()
    }
}
