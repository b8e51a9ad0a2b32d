//! Row types of the warehouse tables.

use chrono::{DateTime, Datelike, Timelike};
use serde::Serialize;

/// One staged activity log record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StagedEvent {
    pub seq_no: i64,
    pub artist: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub session_id: Option<i64>,
    pub song: Option<String>,
    pub length: Option<f64>,
    pub level: Option<String>,
    pub location: Option<String>,
    pub page: Option<String>,
    pub ts: Option<i64>,
    pub status: Option<i64>,
    pub user_agent: Option<String>,
    pub user_id: Option<i64>,
}

/// One staged song catalog record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StagedCatalogEntry {
    pub seq_no: i64,
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<f64>,
    pub artist_longitude: Option<f64>,
    pub song_id: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f64>,
    pub year: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Artist {
    pub artist_id: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Song {
    pub song_id: String,
    pub title: Option<String>,
    pub artist_id: Option<String>,
    pub year: Option<i64>,
    pub duration: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct User {
    pub user_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: Option<String>,
}

/// A row of the time dimension. Every field but `start_time` is derived.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimeRow {
    /// Epoch milliseconds, UTC.
    pub start_time: i64,
    pub hour: u32,
    pub day: u32,
    pub week: u32,
    pub month: u32,
    pub year: i32,
    /// 0 = Sunday.
    pub weekday: u32,
}

impl TimeRow {
    /// Computes the calendar attributes of an epoch-millisecond timestamp in
    /// UTC. Returns `None` when the timestamp is outside the representable
    /// range.
    pub fn from_epoch_millis(start_time: i64) -> Option<Self> {
        let at = DateTime::from_timestamp_millis(start_time)?;
        Some(TimeRow {
            start_time,
            hour: at.hour(),
            day: at.day(),
            week: at.iso_week().week(),
            month: at.month(),
            year: at.year(),
            weekday: at.weekday().num_days_from_sunday(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Songplay {
    pub start_time: i64,
    pub user_id: i64,
    pub level: Option<String>,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: Option<i64>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

impl Songplay {
    /// Whether the play was matched to a catalog song.
    pub fn is_resolved(&self) -> bool {
        self.song_id.is_some() && self.artist_id.is_some()
    }
}

/// Row counts of every warehouse table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub staging_events: usize,
    pub staging_songs: usize,
    pub artists: usize,
    pub songs: usize,
    pub users: usize,
    pub time: usize,
    pub songplays: usize,
}
