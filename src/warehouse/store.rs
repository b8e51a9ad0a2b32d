//! SQLite-backed warehouse.
//!
//! `SqliteWarehouse` owns the database connection. It provisions the schema
//! and exposes typed reads over every table; the staging copier and the
//! load coordinator borrow its connection for writes.

use super::models::*;
use super::schema::{latest_schema, WAREHOUSE_VERSIONED_SCHEMAS};
use crate::error::{WarehouseError, WarehouseResult};
use crate::sqlite_persistence::{Table, BASE_DB_VERSION};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Clone)]
pub struct SqliteWarehouse {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteWarehouse {
    /// Opens (or creates) the warehouse database file.
    ///
    /// The schema is not created here, see [`SqliteWarehouse::provision`].
    pub fn open<P: AsRef<Path>>(db_path: P) -> WarehouseResult<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open_with_flags(
            db_path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            WarehouseError::configuration(format!(
                "Failed to open warehouse database {:?}: {}",
                db_path, e
            ))
        })?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        debug!("Opened warehouse database at {:?}", db_path);
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> WarehouseResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> WarehouseResult<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(SqliteWarehouse {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Schema Provisioning
    // =========================================================================

    /// Creates every table that does not exist yet and validates the result.
    pub fn provision(&self) -> WarehouseResult<()> {
        let conn = self.lock();
        let schema = latest_schema();

        let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
        let missing = schema.missing_tables(&conn).map_err(schema_error("*"))?;
        if missing.len() < schema.tables.len()
            && db_version > (BASE_DB_VERSION + schema.version) as i64
        {
            return Err(WarehouseError::Schema {
                table: "*".to_string(),
                message: format!(
                    "Database version {} is newer than the supported {}",
                    db_version,
                    BASE_DB_VERSION + schema.version
                ),
            });
        }

        if !missing.is_empty() {
            info!("Creating warehouse tables: {}", missing.join(", "));
        }
        schema.create(&conn).map_err(schema_error("*"))?;
        schema.validate(&conn).map_err(schema_error("*"))?;
        Ok(())
    }

    /// Drops every warehouse table, staging included.
    pub fn drop_all(&self) -> WarehouseResult<()> {
        let conn = self.lock();
        info!("Dropping warehouse tables");
        for schema in WAREHOUSE_VERSIONED_SCHEMAS.iter().rev() {
            schema.drop(&conn).map_err(schema_error("*"))?;
        }
        Ok(())
    }

    /// Drops and recreates every table.
    pub fn reset(&self) -> WarehouseResult<()> {
        self.drop_all()?;
        self.provision()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn table_counts(&self) -> WarehouseResult<TableCounts> {
        let conn = self.lock();
        let count = |table: &str| -> WarehouseResult<usize> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
                r.get(0)
            })?;
            Ok(n as usize)
        };
        Ok(TableCounts {
            staging_events: count("staging_events")?,
            staging_songs: count("staging_songs")?,
            artists: count("artists")?,
            songs: count("songs")?,
            users: count("users")?,
            time: count("time")?,
            songplays: count("songplays")?,
        })
    }

    pub fn get_artist(&self, artist_id: &str) -> WarehouseResult<Option<Artist>> {
        let conn = self.lock();
        let artist = conn
            .query_row(
                "SELECT artist_id, name, location, latitude, longitude
                 FROM artists WHERE artist_id = ?1",
                params![artist_id],
                parse_artist_row,
            )
            .optional()?;
        Ok(artist)
    }

    pub fn list_artists(&self) -> WarehouseResult<Vec<Artist>> {
        self.query_all(
            "SELECT artist_id, name, location, latitude, longitude
             FROM artists ORDER BY artist_id",
            parse_artist_row,
        )
    }

    pub fn get_song(&self, song_id: &str) -> WarehouseResult<Option<Song>> {
        let conn = self.lock();
        let song = conn
            .query_row(
                "SELECT song_id, title, artist_id, year, duration FROM songs WHERE song_id = ?1",
                params![song_id],
                parse_song_row,
            )
            .optional()?;
        Ok(song)
    }

    pub fn list_songs(&self) -> WarehouseResult<Vec<Song>> {
        self.query_all(
            "SELECT song_id, title, artist_id, year, duration FROM songs ORDER BY song_id",
            parse_song_row,
        )
    }

    pub fn get_user(&self, user_id: i64) -> WarehouseResult<Option<User>> {
        let conn = self.lock();
        let user = conn
            .query_row(
                "SELECT user_id, first_name, last_name, gender, level
                 FROM users WHERE user_id = ?1",
                params![user_id],
                parse_user_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> WarehouseResult<Vec<User>> {
        self.query_all(
            "SELECT user_id, first_name, last_name, gender, level FROM users ORDER BY user_id",
            parse_user_row,
        )
    }

    pub fn get_time(&self, start_time: i64) -> WarehouseResult<Option<TimeRow>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT start_time, hour, day, week, month, year, weekday
                 FROM time WHERE start_time = ?1",
                params![start_time],
                parse_time_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_time(&self) -> WarehouseResult<Vec<TimeRow>> {
        self.query_all(
            "SELECT start_time, hour, day, week, month, year, weekday
             FROM time ORDER BY start_time",
            parse_time_row,
        )
    }

    pub fn list_songplays(&self) -> WarehouseResult<Vec<Songplay>> {
        self.query_all(
            "SELECT start_time, user_id, level, song_id, artist_id, session_id, location, user_agent
             FROM songplays ORDER BY start_time, user_id",
            |row| {
                Ok(Songplay {
                    start_time: row.get(0)?,
                    user_id: row.get(1)?,
                    level: row.get(2)?,
                    song_id: row.get(3)?,
                    artist_id: row.get(4)?,
                    session_id: row.get(5)?,
                    location: row.get(6)?,
                    user_agent: row.get(7)?,
                })
            },
        )
    }

    pub fn list_staged_events(&self) -> WarehouseResult<Vec<StagedEvent>> {
        self.query_all(
            "SELECT seq_no, artist, first_name, last_name, gender, session_id, song, length,
                    level, location, page, ts, status, user_agent, user_id
             FROM staging_events ORDER BY seq_no",
            |row| {
                Ok(StagedEvent {
                    seq_no: row.get(0)?,
                    artist: row.get(1)?,
                    first_name: row.get(2)?,
                    last_name: row.get(3)?,
                    gender: row.get(4)?,
                    session_id: row.get(5)?,
                    song: row.get(6)?,
                    length: row.get(7)?,
                    level: row.get(8)?,
                    location: row.get(9)?,
                    page: row.get(10)?,
                    ts: row.get(11)?,
                    status: row.get(12)?,
                    user_agent: row.get(13)?,
                    user_id: row.get(14)?,
                })
            },
        )
    }

    pub fn list_staged_catalog_entries(&self) -> WarehouseResult<Vec<StagedCatalogEntry>> {
        self.query_all(
            "SELECT seq_no, artist_id, artist_name, artist_location, artist_latitude,
                    artist_longitude, song_id, title, duration, year
             FROM staging_songs ORDER BY seq_no",
            |row| {
                Ok(StagedCatalogEntry {
                    seq_no: row.get(0)?,
                    artist_id: row.get(1)?,
                    artist_name: row.get(2)?,
                    artist_location: row.get(3)?,
                    artist_latitude: row.get(4)?,
                    artist_longitude: row.get(5)?,
                    song_id: row.get(6)?,
                    title: row.get(7)?,
                    duration: row.get(8)?,
                    year: row.get(9)?,
                })
            },
        )
    }

    fn query_all<T, F>(&self, sql: &str, parse: F) -> WarehouseResult<Vec<T>>
    where
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], parse)?.collect::<Result<Vec<T>, _>>()?;
        Ok(rows)
    }
}

/// Returns an error if any of `tables` is absent.
pub fn require_tables(conn: &Connection, tables: &[&Table]) -> WarehouseResult<()> {
    for table in tables {
        let exists = table.exists(conn).map_err(schema_error(table.name))?;
        if !exists {
            return Err(WarehouseError::Schema {
                table: table.name.to_string(),
                message: "table does not exist, provision the warehouse first".to_string(),
            });
        }
    }
    Ok(())
}

fn schema_error(table: &'static str) -> impl Fn(anyhow::Error) -> WarehouseError {
    move |e| WarehouseError::Schema {
        table: table.to_string(),
        message: format!("{:#}", e),
    }
}

fn parse_artist_row(row: &rusqlite::Row) -> rusqlite::Result<Artist> {
    Ok(Artist {
        artist_id: row.get(0)?,
        name: row.get(1)?,
        location: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
    })
}

fn parse_song_row(row: &rusqlite::Row) -> rusqlite::Result<Song> {
    Ok(Song {
        song_id: row.get(0)?,
        title: row.get(1)?,
        artist_id: row.get(2)?,
        year: row.get(3)?,
        duration: row.get(4)?,
    })
}

fn parse_user_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        user_id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        gender: row.get(3)?,
        level: row.get(4)?,
    })
}

fn parse_time_row(row: &rusqlite::Row) -> rusqlite::Result<TimeRow> {
    Ok(TimeRow {
        start_time: row.get(0)?,
        hour: row.get(1)?,
        day: row.get(2)?,
        week: row.get(3)?,
        month: row.get(4)?,
        year: row.get(5)?,
        weekday: row.get(6)?,
    })
}
