//! Loading of the `songplays` fact table.

use crate::error::{WarehouseError, WarehouseResult};
use crate::warehouse::schema::{
    PLAYBACK_PAGE, SONGPLAYS_TABLE, STAGING_EVENTS_TABLE, STAGING_SONGS_TABLE,
};
use crate::warehouse::{require_tables, SqliteWarehouse};
use rusqlite::params;
use tracing::{debug, info};

/// Playback events not yet in `songplays`, one per `(ts, user_id)`, each
/// joined to the earliest staged catalog entry with the same title,
/// duration and artist name.
const PENDING_SONGPLAYS: &str = "
      FROM staging_events e
      LEFT JOIN staging_songs c
        ON c.seq_no = (SELECT MIN(m.seq_no) FROM staging_songs m
                        WHERE m.title = e.song
                          AND m.duration = e.length
                          AND m.artist_name = e.artist)
     WHERE e.seq_no IN (SELECT MIN(seq_no) FROM staging_events
                         WHERE page = ?1 AND ts IS NOT NULL AND user_id IS NOT NULL
                         GROUP BY ts, user_id)
       AND NOT EXISTS (SELECT 1 FROM songplays p
                        WHERE p.start_time = e.ts AND p.user_id = e.user_id)";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactLoadSummary {
    pub inserted: usize,
    /// Inserted rows whose event matched no catalog entry.
    pub unresolved: usize,
}

pub struct FactLoader {
    warehouse: SqliteWarehouse,
}

impl FactLoader {
    pub fn new(warehouse: SqliteWarehouse) -> Self {
        Self { warehouse }
    }

    /// Inserts one songplay per new playback event.
    ///
    /// A play whose key already exists in `songplays` is filtered out before
    /// the insert, so reloading the same staging data inserts nothing.
    pub fn load(&self) -> WarehouseResult<FactLoadSummary> {
        let conn = self.warehouse.lock();
        require_tables(
            &conn,
            &[&STAGING_EVENTS_TABLE, &STAGING_SONGS_TABLE, &SONGPLAYS_TABLE],
        )?;

        debug!("Loading {}", SONGPLAYS_TABLE.name);
        let tx = conn.unchecked_transaction()?;
        let unresolved: i64 = tx.query_row(
            &format!(
                "SELECT COUNT(*) {} AND (c.song_id IS NULL OR c.artist_id IS NULL)",
                PENDING_SONGPLAYS
            ),
            params![PLAYBACK_PAGE],
            |row| row.get(0),
        )?;
        let inserted = tx
            .execute(
                &format!(
                    "INSERT INTO songplays (start_time, user_id, level, song_id, artist_id,
                                            session_id, location, user_agent)
                     SELECT e.ts, e.user_id, e.level, c.song_id, c.artist_id,
                            e.session_id, e.location, e.user_agent {}",
                    PENDING_SONGPLAYS
                ),
                params![PLAYBACK_PAGE],
            )
            .map_err(|e| WarehouseError::from_write(SONGPLAYS_TABLE.name, e))?;
        tx.commit()?;

        let summary = FactLoadSummary {
            inserted,
            unresolved: unresolved as usize,
        };
        info!(
            "Inserted {} rows into {}, {} without a matching song",
            summary.inserted, SONGPLAYS_TABLE.name, summary.unresolved
        );
        Ok(summary)
    }
}
