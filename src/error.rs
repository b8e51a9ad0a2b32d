//! Error taxonomy for the warehouse.
//!
//! A correlation miss between a playback event and the song catalog is not
//! an error: it produces a songplay with unresolved references and is only
//! counted in the load report.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WarehouseError {
    /// A required external resource (credentials, storage location, db path)
    /// is missing or unusable. Raised before any load step runs.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A table referenced by a step does not exist or has the wrong shape.
    #[error("Schema error on table {table}: {message}")]
    Schema { table: String, message: String },

    /// An insert hit a uniqueness or foreign key constraint. Loads filter
    /// existing keys beforehand, so this means the data or the schema is off.
    #[error("Constraint violation while loading {target}: {message}")]
    ConstraintViolation { target: String, message: String },

    #[error("Staging error for {location}: {message}")]
    Staging { location: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl WarehouseError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        WarehouseError::Configuration(message.into())
    }

    pub fn staging<L: Into<String>, M: Into<String>>(location: L, message: M) -> Self {
        WarehouseError::Staging {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Classifies a SQLite error raised while writing `target`.
    ///
    /// Constraint failures become [`WarehouseError::ConstraintViolation`],
    /// everything else stays a plain SQLite error.
    pub fn from_write(target: &str, err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ffi_err, message)
                if ffi_err.code == ErrorCode::ConstraintViolation =>
            {
                WarehouseError::ConstraintViolation {
                    target: target.to_string(),
                    message: message.unwrap_or_else(|| ffi_err.to_string()),
                }
            }
            other => WarehouseError::Sqlite(other),
        }
    }
}

pub type WarehouseResult<T> = std::result::Result<T, WarehouseError>;
