//! Incremental loading of the dimension tables from staging.
//!
//! Every dimension follows the same insert-only procedure: keep staged rows
//! with a non-null natural key, pick the row with the smallest `seq_no` per
//! key, drop keys already present in the dimension, insert the rest.

use crate::error::{WarehouseError, WarehouseResult};
use crate::sqlite_persistence::Table;
use crate::warehouse::schema::{
    ARTISTS_TABLE, PLAYBACK_PAGE, SONGS_TABLE, STAGING_EVENTS_TABLE, STAGING_SONGS_TABLE,
    TIME_TABLE, USERS_TABLE,
};
use crate::warehouse::{require_tables, SqliteWarehouse, TimeRow};
use rusqlite::{params, Connection};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Artists,
    Songs,
    Users,
    Time,
}

impl Dimension {
    /// Load order of the dimensions. Artists come before songs so that
    /// `songs.artist_id` always resolves.
    pub const ALL: [Dimension; 4] = [
        Dimension::Artists,
        Dimension::Songs,
        Dimension::Users,
        Dimension::Time,
    ];

    pub fn table(&self) -> &'static Table {
        match self {
            Dimension::Artists => &ARTISTS_TABLE,
            Dimension::Songs => &SONGS_TABLE,
            Dimension::Users => &USERS_TABLE,
            Dimension::Time => &TIME_TABLE,
        }
    }

    fn staging_table(&self) -> &'static Table {
        match self {
            Dimension::Artists | Dimension::Songs => &STAGING_SONGS_TABLE,
            Dimension::Users | Dimension::Time => &STAGING_EVENTS_TABLE,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table().name)
    }
}

/// Rows inserted per dimension by [`DimensionLoader::load_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimensionCounts {
    pub artists: usize,
    pub songs: usize,
    pub users: usize,
    pub time: usize,
}

impl DimensionCounts {
    pub fn record(&mut self, dimension: Dimension, inserted: usize) {
        match dimension {
            Dimension::Artists => self.artists = inserted,
            Dimension::Songs => self.songs = inserted,
            Dimension::Users => self.users = inserted,
            Dimension::Time => self.time = inserted,
        }
    }

    pub fn total(&self) -> usize {
        self.artists + self.songs + self.users + self.time
    }
}

const ARTISTS_INSERT: &str = "
    INSERT INTO artists (artist_id, name, location, latitude, longitude)
    SELECT s.artist_id, s.artist_name, s.artist_location, s.artist_latitude, s.artist_longitude
      FROM staging_songs s
     WHERE s.seq_no IN (SELECT MIN(seq_no) FROM staging_songs
                         WHERE artist_id IS NOT NULL
                         GROUP BY artist_id)
       AND NOT EXISTS (SELECT 1 FROM artists a WHERE a.artist_id = s.artist_id)";

const SONGS_INSERT: &str = "
    INSERT INTO songs (song_id, title, artist_id, year, duration)
    SELECT s.song_id, s.title, s.artist_id, s.year, s.duration
      FROM staging_songs s
     WHERE s.seq_no IN (SELECT MIN(seq_no) FROM staging_songs
                         WHERE song_id IS NOT NULL
                         GROUP BY song_id)
       AND NOT EXISTS (SELECT 1 FROM songs d WHERE d.song_id = s.song_id)";

const USERS_INSERT: &str = "
    INSERT INTO users (user_id, first_name, last_name, gender, level)
    SELECT e.user_id, e.first_name, e.last_name, e.gender, e.level
      FROM staging_events e
     WHERE e.seq_no IN (SELECT MIN(seq_no) FROM staging_events
                         WHERE user_id IS NOT NULL AND page = ?1
                         GROUP BY user_id)
       AND NOT EXISTS (SELECT 1 FROM users u WHERE u.user_id = e.user_id)";

const TIME_CANDIDATES: &str = "
    SELECT e.ts
      FROM staging_events e
     WHERE e.seq_no IN (SELECT MIN(seq_no) FROM staging_events
                         WHERE ts IS NOT NULL
                         GROUP BY ts)
       AND NOT EXISTS (SELECT 1 FROM time t WHERE t.start_time = e.ts)
     ORDER BY e.seq_no";

/// Populates the dimension tables. Each [`DimensionLoader::load`] runs in
/// its own transaction.
pub struct DimensionLoader {
    warehouse: SqliteWarehouse,
}

impl DimensionLoader {
    pub fn new(warehouse: SqliteWarehouse) -> Self {
        Self { warehouse }
    }

    /// Loads one dimension and returns the number of inserted rows.
    pub fn load(&self, dimension: Dimension) -> WarehouseResult<usize> {
        let conn = self.warehouse.lock();
        require_tables(&conn, &[dimension.staging_table(), dimension.table()])?;

        debug!("Loading dimension {}", dimension);
        let tx = conn.unchecked_transaction()?;
        let inserted = match dimension {
            Dimension::Artists => tx.execute(ARTISTS_INSERT, []),
            Dimension::Songs => tx.execute(SONGS_INSERT, []),
            Dimension::Users => tx.execute(USERS_INSERT, params![PLAYBACK_PAGE]),
            Dimension::Time => insert_time_rows(&tx),
        }
        .map_err(|e| WarehouseError::from_write(dimension.table().name, e))?;
        tx.commit()?;

        info!("Inserted {} rows into {}", inserted, dimension);
        Ok(inserted)
    }

    /// Loads every dimension in [`Dimension::ALL`] order, stopping at the
    /// first failure. Dimensions loaded before the failure stay committed.
    pub fn load_all(&self) -> WarehouseResult<DimensionCounts> {
        self.load_in_order().map_err(|(_, error)| error)
    }

    /// Same as [`DimensionLoader::load_all`], keeping the dimension that failed.
    pub(crate) fn load_in_order(&self) -> Result<DimensionCounts, (Dimension, WarehouseError)> {
        let mut counts = DimensionCounts::default();
        for dimension in Dimension::ALL {
            let inserted = self.load(dimension).map_err(|e| (dimension, e))?;
            counts.record(dimension, inserted);
        }
        Ok(counts)
    }
}

fn insert_time_rows(conn: &Connection) -> rusqlite::Result<usize> {
    let timestamps = {
        let mut stmt = conn.prepare(TIME_CANDIDATES)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let mut insert = conn.prepare_cached(
        "INSERT INTO time (start_time, hour, day, week, month, year, weekday)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    let mut inserted = 0;
    for ts in timestamps {
        // Timestamps outside chrono's range have no calendar attributes
        let Some(row) = TimeRow::from_epoch_millis(ts) else {
            debug!("Skipping out of range timestamp {}", ts);
            continue;
        };
        inserted += insert.execute(params![
            row.start_time,
            row.hour,
            row.day,
            row.week,
            row.month,
            row.year,
            row.weekday
        ])?;
    }
    Ok(inserted)
}
