//! Source record trees and provisioned warehouses for end-to-end tests
#![allow(dead_code)]

use super::constants::*;
use serde_json::{json, Value};
use songplay_warehouse::config::{AppConfig, CliConfig};
use songplay_warehouse::staging::{stage_all, CopyReport, JsonFileCopier, StagingTarget};
use songplay_warehouse::{
    LoadCoordinator, LoadReport, SqliteWarehouse, StepFailure, WarehouseResult,
};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A playback (`NextSong`) event.
pub fn playback_event(
    user_id: i64,
    ts: i64,
    song: &str,
    artist: &str,
    length: f64,
    level: &str,
) -> Value {
    json!({
        "artist": artist,
        "auth": "Logged In",
        "firstName": "Lily",
        "gender": "F",
        "itemInSession": 0,
        "lastName": "Koch",
        "length": length,
        "level": level,
        "location": "Chicago-Naperville-Elgin, IL-IN-WI",
        "method": "PUT",
        "page": "NextSong",
        "registration": 1541048010796i64,
        "sessionId": 818,
        "song": song,
        "status": 200,
        "ts": ts,
        "userAgent": "Mozilla/5.0 (X11; Linux x86_64)",
        // userId arrives as a string in the activity logs
        "userId": user_id.to_string(),
    })
}

/// A non-playback event, such as a `Home` or `Logout` page view.
pub fn page_event(page: &str, user_id: i64, ts: i64) -> Value {
    json!({
        "artist": null,
        "auth": "Logged In",
        "firstName": "Ryan",
        "gender": "M",
        "itemInSession": 1,
        "lastName": "Smith",
        "length": null,
        "level": "free",
        "location": "San Jose-Sunnyvale-Santa Clara, CA",
        "method": "GET",
        "page": page,
        "registration": 1541016707796i64,
        "sessionId": 169,
        "song": null,
        "status": 200,
        "ts": ts,
        "userAgent": "Mozilla/5.0",
        "userId": user_id.to_string(),
    })
}

/// A song catalog record.
pub fn song_record(
    song_id: &str,
    artist_id: &str,
    title: &str,
    artist_name: &str,
    duration: f64,
) -> Value {
    json!({
        "num_songs": 1,
        "artist_id": artist_id,
        "artist_latitude": 41.88415,
        "artist_longitude": -87.63241,
        "artist_location": "Chicago, IL",
        "artist_name": artist_name,
        "song_id": song_id,
        "title": title,
        "duration": duration,
        "year": 2004,
    })
}

/// The catalog record matched by the default playback event fields.
pub fn test_song_record() -> Value {
    song_record(
        TEST_SONG_ID,
        TEST_ARTIST_ID,
        TEST_SONG_TITLE,
        TEST_ARTIST_NAME,
        TEST_SONG_LENGTH,
    )
}

/// Temporary `log_data/` and `song_data/` trees of record files.
pub struct TestSources {
    dir: TempDir,
}

impl TestSources {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir_all(dir.path().join("log_data")).expect("Failed to create log_data");
        fs::create_dir_all(dir.path().join("song_data")).expect("Failed to create song_data");
        Self { dir }
    }

    pub fn log_data_uri(&self) -> String {
        format!("file://{}", self.dir.path().join("log_data").display())
    }

    pub fn song_data_uri(&self) -> String {
        format!("file://{}", self.dir.path().join("song_data").display())
    }

    /// Writes one record per line to `log_data/<name>`.
    pub fn write_events(&self, name: &str, records: &[Value]) -> PathBuf {
        self.write_lines(self.dir.path().join("log_data").join(name), records)
    }

    /// Writes one record per line to `song_data/<name>`.
    pub fn write_songs(&self, name: &str, records: &[Value]) -> PathBuf {
        self.write_lines(self.dir.path().join("song_data").join(name), records)
    }

    pub fn write_raw(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, content).expect("Failed to write raw file");
        path
    }

    fn write_lines(&self, path: PathBuf, records: &[Value]) -> PathBuf {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        let content = records
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(&path, content).expect("Failed to write records");
        path
    }
}

/// A provisioned warehouse database in a temporary directory, wired to a
/// [`TestSources`] tree.
pub struct TestWarehouse {
    _dir: TempDir,
    pub db_path: PathBuf,
    pub warehouse: SqliteWarehouse,
    pub sources: TestSources,
}

impl TestWarehouse {
    pub fn provisioned() -> Self {
        let test_warehouse = Self::unprovisioned();
        test_warehouse
            .warehouse
            .provision()
            .expect("Failed to provision warehouse");
        test_warehouse
    }

    pub fn unprovisioned() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = dir.path().join("warehouse.db");
        let warehouse = SqliteWarehouse::open(&db_path).expect("Failed to open warehouse");
        Self {
            _dir: dir,
            db_path,
            warehouse,
            sources: TestSources::new(),
        }
    }

    pub fn cli_config(&self) -> CliConfig {
        CliConfig {
            db_path: Some(self.db_path.clone()),
            log_data: Some(self.sources.log_data_uri()),
            log_mapping: None,
            song_data: Some(self.sources.song_data_uri()),
            access_role: Some(TEST_ROLE.to_string()),
        }
    }

    /// Stages both source trees with `config`.
    pub fn stage_with(&self, config: &CliConfig) -> WarehouseResult<Vec<(StagingTarget, CopyReport)>> {
        let app_config = AppConfig::resolve(config, None)?;
        let requests = app_config.copy_requests()?;
        stage_all(&JsonFileCopier::new(self.warehouse.clone()), &requests)
    }

    pub fn stage(&self) -> Vec<(StagingTarget, CopyReport)> {
        self.stage_with(&self.cli_config())
            .expect("Failed to stage records")
    }

    pub fn try_load(&self) -> Result<LoadReport, StepFailure> {
        LoadCoordinator::new(self.warehouse.clone()).run()
    }

    pub fn load(&self) -> LoadReport {
        self.try_load().expect("Load failed")
    }
}
