//! Table definitions for the warehouse database.
//!
//! Two append-only staging tables receive the raw records; the star schema
//! (one fact table, four dimensions) is derived from them by the loaders.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};

/// Page type of an event that represents an actual song playback.
pub const PLAYBACK_PAGE: &str = "NextSong";

// =============================================================================
// Staging Tables
// =============================================================================

/// Raw activity log records, one row per event.
pub const STAGING_EVENTS_TABLE: Table = Table {
    name: "staging_events",
    columns: &[
        sqlite_column!(
            "seq_no",
            &SqlType::Integer,
            is_primary_key = true,
            autoincrement = true
        ),
        sqlite_column!("artist", &SqlType::Text),
        sqlite_column!("auth", &SqlType::Text),
        sqlite_column!("first_name", &SqlType::Text),
        sqlite_column!("gender", &SqlType::Text),
        sqlite_column!("item_in_session", &SqlType::Integer),
        sqlite_column!("last_name", &SqlType::Text),
        sqlite_column!("length", &SqlType::Real),
        sqlite_column!("level", &SqlType::Text),
        sqlite_column!("location", &SqlType::Text),
        sqlite_column!("method", &SqlType::Text),
        sqlite_column!("page", &SqlType::Text),
        sqlite_column!("registration", &SqlType::Integer),
        sqlite_column!("session_id", &SqlType::Integer),
        sqlite_column!("song", &SqlType::Text),
        sqlite_column!("status", &SqlType::Integer),
        sqlite_column!("ts", &SqlType::Integer), // epoch milliseconds
        sqlite_column!("user_agent", &SqlType::Text),
        sqlite_column!("user_id", &SqlType::Integer),
    ],
    primary_key: &[],
    indices: &[
        ("idx_staging_events_ts", "ts"),
        ("idx_staging_events_user", "user_id"),
    ],
    unique_constraints: &[],
};

/// Raw song catalog records, one row per song file.
pub const STAGING_SONGS_TABLE: Table = Table {
    name: "staging_songs",
    columns: &[
        sqlite_column!(
            "seq_no",
            &SqlType::Integer,
            is_primary_key = true,
            autoincrement = true
        ),
        sqlite_column!("num_songs", &SqlType::Integer),
        sqlite_column!("artist_id", &SqlType::Text),
        sqlite_column!("artist_latitude", &SqlType::Real),
        sqlite_column!("artist_longitude", &SqlType::Real),
        sqlite_column!("artist_location", &SqlType::Text),
        sqlite_column!("artist_name", &SqlType::Text),
        sqlite_column!("song_id", &SqlType::Text),
        sqlite_column!("title", &SqlType::Text),
        sqlite_column!("duration", &SqlType::Real),
        sqlite_column!("year", &SqlType::Integer),
    ],
    primary_key: &[],
    indices: &[
        ("idx_staging_songs_artist", "artist_id"),
        ("idx_staging_songs_song", "song_id"),
        ("idx_staging_songs_title", "title"),
    ],
    unique_constraints: &[],
};

// =============================================================================
// Dimension Tables
// =============================================================================

pub const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!(
            "artist_id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("location", &SqlType::Text),
        sqlite_column!("latitude", &SqlType::Real),
        sqlite_column!("longitude", &SqlType::Real),
    ],
    primary_key: &[],
    indices: &[("idx_artists_name", "name")],
    unique_constraints: &[],
};

const SONG_ARTIST_FK: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "artist_id",
    on_delete: ForeignKeyOnChange::NoAction,
};

pub const SONGS_TABLE: Table = Table {
    name: "songs",
    columns: &[
        sqlite_column!(
            "song_id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("title", &SqlType::Text),
        sqlite_column!(
            "artist_id",
            &SqlType::Text,
            foreign_key = Some(&SONG_ARTIST_FK)
        ),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!("duration", &SqlType::Real),
    ],
    primary_key: &[],
    indices: &[("idx_songs_artist", "artist_id")],
    unique_constraints: &[],
};

pub const USERS_TABLE: Table = Table {
    name: "users",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            is_primary_key = true,
            non_null = true
        ),
        sqlite_column!("first_name", &SqlType::Text),
        sqlite_column!("last_name", &SqlType::Text),
        sqlite_column!("gender", &SqlType::Text),
        sqlite_column!("level", &SqlType::Text),
    ],
    primary_key: &[],
    indices: &[],
    unique_constraints: &[],
};

pub const TIME_TABLE: Table = Table {
    name: "time",
    columns: &[
        sqlite_column!(
            "start_time",
            &SqlType::Integer,
            is_primary_key = true,
            non_null = true
        ), // epoch milliseconds
        sqlite_column!("hour", &SqlType::Integer),
        sqlite_column!("day", &SqlType::Integer),
        sqlite_column!("week", &SqlType::Integer), // ISO-8601 week
        sqlite_column!("month", &SqlType::Integer),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!("weekday", &SqlType::Integer), // 0 = Sunday
    ],
    primary_key: &[],
    indices: &[],
    unique_constraints: &[],
};

// =============================================================================
// Fact Table
// =============================================================================

const SONGPLAY_USER_FK: ForeignKey = ForeignKey {
    foreign_table: "users",
    foreign_column: "user_id",
    on_delete: ForeignKeyOnChange::NoAction,
};

const SONGPLAY_SONG_FK: ForeignKey = ForeignKey {
    foreign_table: "songs",
    foreign_column: "song_id",
    on_delete: ForeignKeyOnChange::NoAction,
};

const SONGPLAY_ARTIST_FK: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "artist_id",
    on_delete: ForeignKeyOnChange::NoAction,
};

pub const SONGPLAYS_TABLE: Table = Table {
    name: "songplays",
    columns: &[
        sqlite_column!("start_time", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&SONGPLAY_USER_FK)
        ),
        sqlite_column!("level", &SqlType::Text),
        sqlite_column!(
            "song_id",
            &SqlType::Text,
            foreign_key = Some(&SONGPLAY_SONG_FK)
        ),
        sqlite_column!(
            "artist_id",
            &SqlType::Text,
            foreign_key = Some(&SONGPLAY_ARTIST_FK)
        ),
        sqlite_column!("session_id", &SqlType::Integer),
        sqlite_column!("location", &SqlType::Text),
        sqlite_column!("user_agent", &SqlType::Text),
    ],
    primary_key: &["start_time", "user_id"],
    indices: &[
        ("idx_songplays_user", "user_id"),
        ("idx_songplays_song", "song_id"),
    ],
    unique_constraints: &[&["start_time", "user_id", "session_id"]],
};

// =============================================================================
// Versioned Schema Definition
// =============================================================================

/// Warehouse schema, parents before dependents so that creation order
/// satisfies the foreign keys and reverse order is a valid drop order.
pub const WAREHOUSE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        STAGING_EVENTS_TABLE,
        STAGING_SONGS_TABLE,
        USERS_TABLE,
        ARTISTS_TABLE,
        SONGS_TABLE,
        TIME_TABLE,
        SONGPLAYS_TABLE,
    ],
}];

pub fn latest_schema() -> &'static VersionedSchema {
    &WAREHOUSE_VERSIONED_SCHEMAS[WAREHOUSE_VERSIONED_SCHEMAS.len() - 1]
}
