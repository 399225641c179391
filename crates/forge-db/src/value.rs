//! # Tagged SQL Values & Row Maps
//!
//! The currency between entities and SQL: a closed tagged union of the
//! storage classes SQLite actually has, and an ordered column→value map
//! built from it.
//!
//! ## Why a Closed Union?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SqlValue and RowMap                                │
//! │                                                                         │
//! │  Entity ──to_row()──►  RowMap {                                        │
//! │                          "id"            → Text("5f0c...")             │
//! │                          "quantity"      → Double(2.5)                 │
//! │                          "status"        → Int(1)                      │
//! │                          "serial_number" → Null                        │
//! │                          "registered_at" → Timestamp(...)              │
//! │                        }                                               │
//! │                            │                                            │
//! │                            ▼                                            │
//! │            INSERT INTO assets (id, quantity, ...) VALUES (?, ?, ...)   │
//! │                                                                         │
//! │  A value is one of six shapes, checked by the compiler. There is no    │
//! │  "any" escape hatch: booleans are Int 0/1, enums are their integer     │
//! │  codes, collections are serialized JSON text.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tolerant Reads
//! The typed accessors never abort a read. Absent columns and NULLs yield
//! `None` silently; a type mismatch logs a warning and yields `None`, and
//! the mapper fills a default. Writes are strict, reads degrade.
//!
//! ## Timestamps
//! Timestamps persist as RFC 3339 TEXT, written by [`SqlValue::bind_to`]
//! and parsed by [`RowMap::timestamp`]. Decoding a result row therefore
//! produces `Text` for timestamp columns; the accessor does the parsing.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::error::BoxDynError;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::warn;

// =============================================================================
// SqlValue
// =============================================================================

/// One SQL value, in one of the six shapes the system stores.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL. Optional fields map their `None` here.
    Null,
    /// INTEGER. Also carries booleans (0/1) and enum codes.
    Int(i64),
    /// REAL. Quantities and capacities.
    Double(f64),
    /// TEXT. Ids, codes, names, serialized JSON.
    Text(String),
    /// A UTC timestamp, stored as RFC 3339 TEXT.
    Timestamp(DateTime<Utc>),
    /// BLOB. Raw bytes.
    Bytes(Vec<u8>),
}

impl SqlValue {
    /// Shape name for log messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "NULL",
            SqlValue::Int(_) => "INTEGER",
            SqlValue::Double(_) => "REAL",
            SqlValue::Text(_) => "TEXT",
            SqlValue::Timestamp(_) => "TIMESTAMP",
            SqlValue::Bytes(_) => "BLOB",
        }
    }

    /// Whether this is SQL NULL.
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Binds this value as the next placeholder of `query`.
    ///
    /// Timestamps bind as their RFC 3339 text form; everything else
    /// binds as its native sqlx type.
    pub fn bind_to<'q>(
        &self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        match self {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Double(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Timestamp(ts) => query.bind(ts.to_rfc3339()),
            SqlValue::Bytes(b) => query.bind(b.clone()),
        }
    }
}

// -----------------------------------------------------------------------------
// Conversions into SqlValue
// -----------------------------------------------------------------------------

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Double(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Int(if v { 1 } else { 0 })
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

/// `None` becomes SQL NULL, `Some(v)` converts like `v`.
impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

// -----------------------------------------------------------------------------
// sqlx integration
// -----------------------------------------------------------------------------

/// Lets `SqlValue` ride through `Row::try_get` for any column type.
impl sqlx::Type<Sqlite> for SqlValue {
    fn type_info() -> SqliteTypeInfo {
        <str as sqlx::Type<Sqlite>>::type_info()
    }

    fn compatible(_ty: &SqliteTypeInfo) -> bool {
        // Every column decodes into some SqlValue shape
        true
    }
}

/// Decodes by the value's runtime storage class, not the declared
/// column type, so SQLite's flexible typing cannot surprise us.
impl<'r> sqlx::Decode<'r, Sqlite> for SqlValue {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }

        let storage_class = value.type_info().name().to_owned();
        match storage_class.as_str() {
            "INTEGER" | "BOOLEAN" => {
                Ok(SqlValue::Int(<i64 as sqlx::Decode<'r, Sqlite>>::decode(value)?))
            }
            "REAL" => Ok(SqlValue::Double(<f64 as sqlx::Decode<'r, Sqlite>>::decode(
                value,
            )?)),
            "BLOB" => Ok(SqlValue::Bytes(
                <Vec<u8> as sqlx::Decode<'r, Sqlite>>::decode(value)?,
            )),
            // TEXT and every declared-type alias of it
            _ => Ok(SqlValue::Text(<String as sqlx::Decode<'r, Sqlite>>::decode(
                value,
            )?)),
        }
    }
}

// =============================================================================
// RowMap
// =============================================================================

/// An ordered column→value map: one database row in transit.
///
/// Insertion order is preserved because it becomes the column order of
/// generated INSERT and UPDATE statements. Setting an existing column
/// replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowMap {
    entries: Vec<(String, SqlValue)>,
}

impl RowMap {
    /// Creates an empty row map.
    pub fn new() -> Self {
        RowMap {
            entries: Vec::new(),
        }
    }

    /// Creates an empty row map with room for `capacity` columns.
    pub fn with_capacity(capacity: usize) -> Self {
        RowMap {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Sets a column value, replacing any existing value in place.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> &mut Self {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
        self
    }

    /// Serializes `value` as JSON and stores it as a TEXT column.
    ///
    /// Serialization failure is logged and stored as NULL; a metadata
    /// problem must never sink the surrounding write.
    pub fn set_json<T: Serialize>(&mut self, column: &str, value: &T) -> &mut Self {
        match serde_json::to_string(value) {
            Ok(json) => self.set(column, json),
            Err(err) => {
                warn!(column = %column, "Failed to serialize JSON column, storing NULL: {}", err);
                self.set(column, SqlValue::Null)
            }
        }
    }

    /// Returns the raw value of a column, if present.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Removes a column, returning its value.
    pub fn remove(&mut self, column: &str) -> Option<SqlValue> {
        let index = self.entries.iter().position(|(name, _)| name == column)?;
        Some(self.entries.remove(index).1)
    }

    /// Whether the column is present (possibly as NULL).
    pub fn contains(&self, column: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == column)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no columns.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates columns in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Iterates column names in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    // =========================================================================
    // Tolerant Typed Accessors
    // =========================================================================
    // Absent or NULL → None, silently (that is what optional fields are).
    // Wrong shape → warn and None; the mapper default-fills. A read never
    // aborts the caller.

    /// Reads a TEXT column.
    pub fn text(&self, column: &str) -> Option<String> {
        match self.get(column) {
            None | Some(SqlValue::Null) => None,
            Some(SqlValue::Text(v)) => Some(v.clone()),
            Some(other) => {
                warn!(
                    column = %column,
                    found = other.type_name(),
                    "Expected TEXT value, degrading to NULL"
                );
                None
            }
        }
    }

    /// Reads an INTEGER column.
    pub fn int(&self, column: &str) -> Option<i64> {
        match self.get(column) {
            None | Some(SqlValue::Null) => None,
            Some(SqlValue::Int(v)) => Some(*v),
            Some(other) => {
                warn!(
                    column = %column,
                    found = other.type_name(),
                    "Expected INTEGER value, degrading to NULL"
                );
                None
            }
        }
    }

    /// Reads a REAL column. Integer values widen without complaint
    /// because SQLite stores whole reals as integers.
    pub fn double(&self, column: &str) -> Option<f64> {
        match self.get(column) {
            None | Some(SqlValue::Null) => None,
            Some(SqlValue::Double(v)) => Some(*v),
            Some(SqlValue::Int(v)) => Some(*v as f64),
            Some(other) => {
                warn!(
                    column = %column,
                    found = other.type_name(),
                    "Expected REAL value, degrading to NULL"
                );
                None
            }
        }
    }

    /// Reads a timestamp column (RFC 3339 TEXT, or an in-memory
    /// `Timestamp` value on the write side).
    pub fn timestamp(&self, column: &str) -> Option<DateTime<Utc>> {
        match self.get(column) {
            None | Some(SqlValue::Null) => None,
            Some(SqlValue::Timestamp(ts)) => Some(*ts),
            Some(SqlValue::Text(raw)) => match DateTime::parse_from_rfc3339(raw) {
                Ok(ts) => Some(ts.with_timezone(&Utc)),
                Err(err) => {
                    warn!(
                        column = %column,
                        value = %raw,
                        "Malformed timestamp, degrading to NULL: {}", err
                    );
                    None
                }
            },
            Some(other) => {
                warn!(
                    column = %column,
                    found = other.type_name(),
                    "Expected timestamp value, degrading to NULL"
                );
                None
            }
        }
    }

    /// Reads a BLOB column.
    pub fn bytes(&self, column: &str) -> Option<Vec<u8>> {
        match self.get(column) {
            None | Some(SqlValue::Null) => None,
            Some(SqlValue::Bytes(v)) => Some(v.clone()),
            Some(other) => {
                warn!(
                    column = %column,
                    found = other.type_name(),
                    "Expected BLOB value, degrading to NULL"
                );
                None
            }
        }
    }

    /// Parses a serialized-JSON TEXT column into `T`.
    pub fn json_as<T: DeserializeOwned>(&self, column: &str) -> Option<T> {
        let raw = self.text(column)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    column = %column,
                    "Malformed JSON column, degrading to default: {}", err
                );
                None
            }
        }
    }

    // =========================================================================
    // Result-row conversion
    // =========================================================================

    /// Builds a row map from a fetched SQLite row.
    ///
    /// A column that fails to decode is logged and carried as NULL;
    /// the row as a whole always converts.
    pub fn from_sqlite_row(row: &SqliteRow) -> RowMap {
        let mut map = RowMap::with_capacity(row.len());
        for (index, column) in row.columns().iter().enumerate() {
            let value = match row.try_get::<SqlValue, _>(index) {
                Ok(value) => value,
                Err(err) => {
                    warn!(
                        column = %column.name(),
                        "Failed to decode column, substituting NULL: {}", err
                    );
                    SqlValue::Null
                }
            };
            map.set(column.name(), value);
        }
        map
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
