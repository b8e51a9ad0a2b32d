//! Songplay Warehouse Library
//!
//! Stages raw activity logs and song catalog records into SQLite and
//! reshapes them into a star schema: the `songplays` fact table with the
//! `users`, `songs`, `artists` and `time` dimensions.

pub mod config;
pub mod error;
pub mod etl;
pub mod sqlite_persistence;
pub mod staging;
pub mod warehouse;

// Re-export commonly used types for convenience
pub use error::{WarehouseError, WarehouseResult};
pub use etl::{LoadCoordinator, LoadReport, LoadState, StepFailure};
pub use staging::{BulkCopy, JsonFileCopier};
pub use warehouse::SqliteWarehouse;
