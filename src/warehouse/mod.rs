mod models;
pub mod schema;
mod store;

pub use models::{
    Artist, Song, Songplay, StagedCatalogEntry, StagedEvent, TableCounts, TimeRow, User,
};
pub use store::{require_tables, SqliteWarehouse};
