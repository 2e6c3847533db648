//! Generic result rows.

use crate::error::DbResult;
use crate::models::record::Record;
use crate::models::value::{FromValue, Value};
use indexmap::IndexMap;
use serde::Serialize;

/// One result row: column label → value, in result order.
///
/// Labels are taken from the result set itself (aliases included). When a
/// result carries the same label twice, the later column wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row {
    columns: IndexMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column, replacing an earlier column with the same label.
    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.columns.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Get a column converted to `T`.
    ///
    /// Returns `Ok(None)` when the column is missing or NULL.
    pub fn get_as<T: FromValue>(&self, column: &str) -> DbResult<Option<T>> {
        match self.columns.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::from_value(value.clone())
                .map(Some)
                .map_err(|e| e.for_column(column)),
        }
    }

    /// Value of the first column.
    pub fn first(&self) -> Option<&Value> {
        self.columns.first().map(|(_, v)| v)
    }

    /// Column labels in result order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Take the first column out of the row.
    pub fn into_first(self) -> Option<Value> {
        self.columns.into_iter().next().map(|(_, v)| v)
    }

    /// Take a named column out of the row.
    pub fn into_column(mut self, column: &str) -> Option<Value> {
        self.columns.swap_remove(column)
    }

    /// Project this row onto a record type.
    ///
    /// Starts from `T::default()` and offers every column to [`Record::assign`];
    /// columns without a matching field are skipped.
    pub fn into_record<T: Record>(self) -> DbResult<T> {
        let mut record = T::default();
        for (column, value) in self.columns {
            if !record.assign(&column, value)? {
                tracing::trace!(column = %column, "No matching field, column ignored");
            }
        }
        Ok(record)
    }

    /// Render this row as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}
