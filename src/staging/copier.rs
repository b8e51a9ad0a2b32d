//! Bulk copy of raw JSON records into the staging tables.

use super::location::StorageLocation;
use super::mapping::{RecordMapping, AUTO_MAPPING};
use crate::error::{WarehouseError, WarehouseResult};
use crate::sqlite_persistence::{SqlType, Table};
use crate::warehouse::schema::{STAGING_EVENTS_TABLE, STAGING_SONGS_TABLE};
use crate::warehouse::SqliteWarehouse;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info};

/// Which staging table a copy fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingTarget {
    Events,
    Songs,
}

impl StagingTarget {
    pub fn table(&self) -> &'static Table {
        match self {
            StagingTarget::Events => &STAGING_EVENTS_TABLE,
            StagingTarget::Songs => &STAGING_SONGS_TABLE,
        }
    }
}

impl fmt::Display for StagingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table().name)
    }
}

/// Credentials presented to the storage location.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessCredentials {
    pub role: String,
}

impl AccessCredentials {
    pub fn new<S: Into<String>>(role: S) -> WarehouseResult<Self> {
        let role = role.into();
        if role.trim().is_empty() {
            return Err(WarehouseError::configuration("Access role is empty"));
        }
        Ok(AccessCredentials { role })
    }
}

impl fmt::Debug for AccessCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessCredentials")
            .field("role", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CopyRequest {
    pub target: StagingTarget,
    pub location: String,
    pub credentials: AccessCredentials,
    /// `auto`, a JSONPaths document location, or `None` for `auto`.
    pub mapping: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub files: usize,
    pub records: usize,
    /// Fields stored as NULL because they held invalid characters or could
    /// not be converted to the column type.
    pub nulled_fields: usize,
}

/// Populates a staging table from a storage location.
pub trait BulkCopy {
    fn copy(&self, request: &CopyRequest) -> WarehouseResult<CopyReport>;
}

/// Copies record files from the local filesystem.
///
/// Each file may hold one JSON object per line or any sequence of
/// concatenated JSON objects. Every record becomes one staging row; rows are
/// appended so `seq_no` keeps growing across copies.
pub struct JsonFileCopier {
    warehouse: SqliteWarehouse,
}

impl JsonFileCopier {
    pub fn new(warehouse: SqliteWarehouse) -> Self {
        Self { warehouse }
    }

    fn resolve_mapping(hint: Option<&str>) -> WarehouseResult<RecordMapping> {
        match hint.map(str::trim) {
            None => Ok(RecordMapping::Auto),
            Some(h) if h.is_empty() || h.trim_matches('\'').eq_ignore_ascii_case(AUTO_MAPPING) => {
                Ok(RecordMapping::Auto)
            }
            Some(h) => {
                let location = StorageLocation::parse(h)?;
                let content = location.read_to_string().map_err(|e| {
                    WarehouseError::configuration(format!("Cannot read mapping {}: {}", h, e))
                })?;
                RecordMapping::from_jsonpaths_document(&content)
            }
        }
    }
}

impl BulkCopy for JsonFileCopier {
    fn copy(&self, request: &CopyRequest) -> WarehouseResult<CopyReport> {
        let location = StorageLocation::parse(&request.location)?;
        let mapping = Self::resolve_mapping(request.mapping.as_deref())?;
        let table = request.target.table();
        let columns = staged_columns(table);
        mapping.check_arity(columns.len())?;

        debug!(
            "Copying {} into {} with {:?}",
            location, table.name, request.credentials
        );
        let files = location.record_files()?;

        let conn = self.warehouse.lock();
        crate::warehouse::require_tables(&conn, &[table])?;

        let tx = conn.unchecked_transaction()?;
        let mut report = CopyReport::default();
        for file in &files {
            let bytes = std::fs::read(file)?;
            // Invalid UTF-8 turns into U+FFFD here and the field into NULL below
            let lossy = std::str::from_utf8(&bytes).is_err();
            let text = String::from_utf8_lossy(&bytes);
            let records = parse_records(&text)
                .map_err(|e| WarehouseError::staging(file.display().to_string(), e))?;
            for record in &records {
                let (row, nulled) = to_row(&mapping, record, table, &columns, lossy);
                insert_row(&tx, table, &columns, row)?;
                report.nulled_fields += nulled;
                report.records += 1;
            }
            report.files += 1;
        }
        tx.commit()?;

        info!(
            "Staged {} records from {} files into {} ({} fields nulled)",
            report.records, report.files, table.name, report.nulled_fields
        );
        Ok(report)
    }
}

/// Staging columns filled by a copy, `seq_no` excluded.
fn staged_columns(table: &Table) -> Vec<&'static str> {
    table
        .columns
        .iter()
        .filter(|c| !c.autoincrement)
        .map(|c| c.name)
        .collect()
}

fn parse_records(text: &str) -> Result<Vec<Value>, String> {
    let mut records = Vec::new();
    for value in serde_json::Deserializer::from_str(text).into_iter::<Value>() {
        let value = value.map_err(|e| format!("malformed record: {}", e))?;
        if !value.is_object() {
            return Err(format!("record is not a JSON object: {}", value));
        }
        records.push(value);
    }
    Ok(records)
}

fn to_row(
    mapping: &RecordMapping,
    record: &Value,
    table: &Table,
    columns: &[&str],
    lossy: bool,
) -> (Vec<SqlValue>, usize) {
    let mut nulled = 0;
    let row = mapping
        .project(record, columns)
        .into_iter()
        .zip(columns)
        .map(|(value, name)| {
            let sql_type = column_type(table, name);
            let converted = value.and_then(|v| convert_value(v, sql_type, lossy));
            if converted.is_none() && value.is_some_and(|v| !is_blank(v)) {
                nulled += 1;
            }
            converted.unwrap_or(SqlValue::Null)
        })
        .collect();
    (row, nulled)
}

fn column_type<'t>(table: &'t Table, name: &str) -> &'t SqlType {
    table
        .columns
        .iter()
        .find(|c| c.name == name)
        .map(|c| c.sql_type)
        .unwrap_or(&SqlType::Text)
}

/// Null and empty strings are stored as NULL without counting as a loss.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Converts a JSON value to the column type; `None` means NULL.
///
/// `lossy` marks values decoded from a file that was not valid UTF-8, where
/// U+FFFD stands for an undecodable byte sequence.
fn convert_value(value: &Value, sql_type: &SqlType, lossy: bool) -> Option<SqlValue> {
    if is_blank(value) {
        return None;
    }
    match (sql_type, value) {
        (SqlType::Text, Value::String(s)) => {
            if lossy && s.contains(char::REPLACEMENT_CHARACTER) {
                None
            } else {
                Some(SqlValue::Text(s.clone()))
            }
        }
        (SqlType::Text, other) => Some(SqlValue::Text(other.to_string())),
        (SqlType::Integer, Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(integral_f64))
            .map(SqlValue::Integer),
        (SqlType::Integer, Value::String(s)) => {
            s.trim().parse::<i64>().ok().map(SqlValue::Integer)
        }
        (SqlType::Integer, Value::Bool(b)) => Some(SqlValue::Integer(*b as i64)),
        (SqlType::Real, Value::Number(n)) => n.as_f64().map(SqlValue::Real),
        (SqlType::Real, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(SqlValue::Real),
        _ => None,
    }
}

/// Whole floats within i64 range; `as` would saturate anything larger.
fn integral_f64(f: f64) -> Option<i64> {
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (in_range && f.fract() == 0.0).then_some(f as i64)
}

fn insert_row(
    conn: &Connection,
    table: &Table,
    columns: &[&str],
    row: Vec<SqlValue>,
) -> WarehouseResult<()> {
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare_cached(&format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name,
        columns.join(", "),
        placeholders
    ))?;
    stmt.execute(params_from_iter(row))
        .map_err(|e| WarehouseError::from_write(table.name, e))?;
    Ok(())
}
