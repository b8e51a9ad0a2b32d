//! Record-shape mapping between source JSON records and staging columns.
//!
//! Two layouts are understood:
//! - `auto`: object keys are matched to column names ignoring case and
//!   underscores, so `firstName` fills `first_name`.
//! - a JSONPaths document, `{"jsonpaths": ["$['artist']", "$.page", ...]}`,
//!   whose expressions fill the staging columns positionally.

use crate::error::{WarehouseError, WarehouseResult};
use serde::Deserialize;
use serde_json::{Map, Value};

pub const AUTO_MAPPING: &str = "auto";

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

/// A parsed JSONPath expression restricted to member and index access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<PathSegment>,
}

impl JsonPath {
    pub fn parse(expression: &str) -> WarehouseResult<Self> {
        let invalid = |reason: &str| {
            WarehouseError::configuration(format!(
                "Invalid JSONPath expression '{}': {}",
                expression, reason
            ))
        };

        let mut rest = expression
            .trim()
            .strip_prefix('$')
            .ok_or_else(|| invalid("must start with '$'"))?;
        let mut segments = Vec::new();

        while !rest.is_empty() {
            if let Some(after_dot) = rest.strip_prefix('.') {
                let end = after_dot.find(['.', '[']).unwrap_or(after_dot.len());
                let key = &after_dot[..end];
                if key.is_empty() {
                    return Err(invalid("empty member name"));
                }
                segments.push(PathSegment::Key(key.to_string()));
                rest = &after_dot[end..];
            } else if let Some(after_bracket) = rest.strip_prefix('[') {
                let end = after_bracket
                    .find(']')
                    .ok_or_else(|| invalid("unterminated '['"))?;
                let inner = after_bracket[..end].trim();
                let quoted = inner
                    .strip_prefix('\'')
                    .and_then(|s| s.strip_suffix('\''))
                    .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')));
                match quoted {
                    Some(key) => segments.push(PathSegment::Key(key.to_string())),
                    None => {
                        let index = inner
                            .parse::<usize>()
                            .map_err(|_| invalid("bracket must hold a quoted name or an index"))?;
                        segments.push(PathSegment::Index(index));
                    }
                }
                rest = &after_bracket[end + 1..];
            } else {
                return Err(invalid("expected '.' or '['"));
            }
        }

        if segments.is_empty() {
            return Err(invalid("path selects the whole record"));
        }
        Ok(JsonPath { segments })
    }

    pub fn extract<'v>(&self, record: &'v Value) -> Option<&'v Value> {
        self.segments
            .iter()
            .try_fold(record, |value, segment| match segment {
                PathSegment::Key(key) => value.get(key.as_str()),
                PathSegment::Index(index) => value.get(*index),
            })
    }
}

#[derive(Deserialize)]
struct JsonPathsDocument {
    jsonpaths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordMapping {
    Auto,
    JsonPaths(Vec<JsonPath>),
}

impl RecordMapping {
    /// Parses the content of a JSONPaths document.
    pub fn from_jsonpaths_document(content: &str) -> WarehouseResult<Self> {
        let document: JsonPathsDocument = serde_json::from_str(content).map_err(|e| {
            WarehouseError::configuration(format!("Invalid JSONPaths document: {}", e))
        })?;
        let paths = document
            .jsonpaths
            .iter()
            .map(|p| JsonPath::parse(p))
            .collect::<WarehouseResult<Vec<_>>>()?;
        Ok(RecordMapping::JsonPaths(paths))
    }

    /// Checks the mapping can fill `column_count` columns.
    pub fn check_arity(&self, column_count: usize) -> WarehouseResult<()> {
        match self {
            RecordMapping::JsonPaths(paths) if paths.len() != column_count => {
                Err(WarehouseError::configuration(format!(
                    "JSONPaths document has {} expressions but the staging table has {} columns",
                    paths.len(),
                    column_count
                )))
            }
            _ => Ok(()),
        }
    }

    /// Picks the source value of every column, in column order.
    ///
    /// `record` is expected to be a JSON object; anything else yields no values.
    pub fn project<'v>(&self, record: &'v Value, columns: &[&str]) -> Vec<Option<&'v Value>> {
        match self {
            RecordMapping::Auto => {
                let Some(fields) = record.as_object() else {
                    return vec![None; columns.len()];
                };
                columns
                    .iter()
                    .map(|column| lookup_ignoring_case(fields, column))
                    .collect()
            }
            RecordMapping::JsonPaths(paths) => {
                paths.iter().map(|path| path.extract(record)).collect()
            }
        }
    }
}

fn lookup_ignoring_case<'v>(fields: &'v Map<String, Value>, column: &str) -> Option<&'v Value> {
    if let Some(value) = fields.get(column) {
        return Some(value);
    }
    let wanted = normalize_name(column);
    fields
        .iter()
        .find(|(key, _)| normalize_name(key) == wanted)
        .map(|(_, value)| value)
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}
