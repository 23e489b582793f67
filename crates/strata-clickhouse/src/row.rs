//! Positional result rows.
//!
//! The client asks the server for `JSONCompactEachRow`, so every row arrives
//! as one JSON array whose elements follow the SELECT list order.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::error::{Result, StoreError};

/// One raw row, accessed by column position.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Parse one `JSONCompactEachRow` line.
    pub fn from_line(line: &str) -> Result<Self> {
        Self::from_bytes(line.as_bytes())
    }

    /// Parse one raw `JSONCompactEachRow` line. Invalid UTF-8 inside a
    /// string value is a decode error, not a replacement character.
    pub fn from_bytes(line: &[u8]) -> Result<Self> {
        let values: Vec<Value> = serde_json::from_slice(line).map_err(|source| StoreError::Decode {
            line: String::from_utf8_lossy(line).into_owned(),
            source,
        })?;
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fail unless the row has exactly `expected` columns.
    pub fn ensure_width(&self, expected: usize) -> Result<()> {
        if self.values.len() != expected {
            return Err(StoreError::RowShape {
                expected,
                found: self.values.len(),
            });
        }
        Ok(())
    }

    /// Decode the value at `index` as `T`.
    pub fn try_get<T: FromColumn>(&self, index: usize) -> Result<T> {
        let value = self.values.get(index).ok_or(StoreError::RowShape {
            expected: index + 1,
            found: self.values.len(),
        })?;
        T::from_column(value).ok_or_else(|| StoreError::Column {
            index,
            expected: T::TYPE_NAME,
            found: value.to_string(),
        })
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

/// Types a single column value can be decoded into.
pub trait FromColumn: Sized {
    const TYPE_NAME: &'static str;

    fn from_column(value: &Value) -> Option<Self>;
}

impl FromColumn for String {
    const TYPE_NAME: &'static str = "string";

    fn from_column(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

// 64-bit integers may come back quoted depending on server settings.
impl FromColumn for i64 {
    const TYPE_NAME: &'static str = "i64";

    fn from_column(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FromColumn for u64 {
    const TYPE_NAME: &'static str = "u64";

    fn from_column(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FromColumn for f64 {
    const TYPE_NAME: &'static str = "f64";

    fn from_column(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl FromColumn for DateTime<Utc> {
    const TYPE_NAME: &'static str = "datetime";

    fn from_column(value: &Value) -> Option<Self> {
        let s = value.as_str()?;
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .ok()
            .or_else(|| {
                DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok()
            })
    }
}
