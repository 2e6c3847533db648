//! Database-agnostic type mappings.
//!
//! This module decodes backend rows into [`Row`]s of [`Value`]s.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! MySQL reports precise column types, so its decoder follows the declared
//! category. SQLite values carry their own storage class, so its decoder
//! follows the runtime class and uses the declared type only to recover
//! booleans and datetimes.

use crate::error::DbResult;
use crate::models::{DatabaseType, Row, Value};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row as _, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    DateTime,
    Date,
    Time,
    Text,
    Binary,
    Json,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    // Boolean (MySQL reports TINYINT(1) as BOOLEAN)
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    // Integer types
    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    // Date/time - datetime and timestamp before the bare date/time checks
    if lower.contains("datetime") || lower.contains("timestamp") {
        return TypeCategory::DateTime;
    }
    if lower == "date" {
        return TypeCategory::Date;
    }
    if lower == "time" {
        return TypeCategory::Time;
    }

    // Float types
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") {
        return TypeCategory::Binary;
    }

    // Everything else (varchar, text, char, enum, set, ...)
    TypeCategory::Text
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Row Decoding Trait
// =============================================================================

/// Trait for converting backend rows into [`Row`]s.
pub trait DecodeRow {
    fn decode_row(&self) -> DbResult<Row>;
}

impl DecodeRow for MySqlRow {
    fn decode_row(&self) -> DbResult<Row> {
        let mut row = Row::new();
        for (idx, col) in self.columns().iter().enumerate() {
            let category = categorize_type(col.type_info().name(), DatabaseType::MySQL);
            let value =
                mysql::decode_column(self, idx, category).map_err(|e| e.for_column(col.name()))?;
            row.insert(col.name(), value);
        }
        Ok(row)
    }
}

impl DecodeRow for SqliteRow {
    fn decode_row(&self) -> DbResult<Row> {
        let mut row = Row::new();
        for (idx, col) in self.columns().iter().enumerate() {
            let declared = categorize_type(col.type_info().name(), DatabaseType::SQLite);
            let value =
                sqlite::decode_column(self, idx, declared).map_err(|e| e.for_column(col.name()))?;
            row.insert(col.name(), value);
        }
        Ok(row)
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> DbResult<Value> {
        if row.try_get_raw(idx)?.is_null() {
            return Ok(Value::Null);
        }
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::DateTime => decode_datetime(row, idx),
            TypeCategory::Date => match row.try_get::<NaiveDate, _>(idx) {
                Ok(v) => Ok(Value::Text(v.to_string())),
                Err(_) => decode_text(row, idx),
            },
            // TIME may exceed 24h or be negative; those fall back to text
            TypeCategory::Time => match row.try_get::<NaiveTime, _>(idx) {
                Ok(v) => Ok(Value::Text(v.to_string())),
                Err(_) => decode_text(row, idx),
            },
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Binary => Ok(Value::Bytes(row.try_get::<Vec<u8>, _>(idx)?)),
            TypeCategory::Text => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> DbResult<Value> {
        let v = row.try_get::<RawDecimal, _>(idx)?;
        Ok(Value::Text(v.0))
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> DbResult<Value> {
        match row.try_get::<bool, _>(idx) {
            Ok(v) => Ok(Value::Bool(v)),
            Err(_) => decode_integer(row, idx),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> DbResult<Value> {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Ok(Value::Int(v));
        }
        // BIGINT UNSIGNED
        Ok(Value::from(row.try_get::<u64, _>(idx)?))
    }

    fn decode_datetime(row: &MySqlRow, idx: usize) -> DbResult<Value> {
        if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
            return Ok(Value::DateTime(v));
        }
        let v = row.try_get::<DateTime<Utc>, _>(idx)?;
        Ok(Value::DateTime(v.naive_utc()))
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> DbResult<Value> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Ok(Value::Float(v));
        }
        Ok(Value::Float(f64::from(row.try_get::<f32, _>(idx)?)))
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> DbResult<Value> {
        let v = row.try_get::<serde_json::Value, _>(idx)?;
        Ok(Value::Text(v.to_string()))
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> DbResult<Value> {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Ok(Value::Text(v));
        }
        // Binary collations and unknown types
        Ok(Value::Bytes(row.try_get::<Vec<u8>, _>(idx)?))
    }
}

mod sqlite {
    use super::*;
    use crate::models::parse_datetime;

    pub fn decode_column(row: &SqliteRow, idx: usize, declared: TypeCategory) -> DbResult<Value> {
        let storage = {
            let raw = row.try_get_raw(idx)?;
            if raw.is_null() {
                return Ok(Value::Null);
            }
            raw.type_info().name().to_string()
        };

        match storage.as_str() {
            "INTEGER" => {
                let v = row.try_get::<i64, _>(idx)?;
                if declared == TypeCategory::Boolean {
                    Ok(Value::Bool(v != 0))
                } else {
                    Ok(Value::Int(v))
                }
            }
            "REAL" => Ok(Value::Float(row.try_get::<f64, _>(idx)?)),
            "BLOB" => Ok(Value::Bytes(row.try_get::<Vec<u8>, _>(idx)?)),
            _ => {
                let v = row.try_get::<String, _>(idx)?;
                match declared {
                    TypeCategory::DateTime => {
                        Ok(parse_datetime(&v).map_or(Value::Text(v), Value::DateTime))
                    }
                    _ => Ok(Value::Text(v)),
                }
            }
        }
    }
}
