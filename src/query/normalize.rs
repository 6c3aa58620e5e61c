//! Row normalization: warehouse-native values → JSON-safe values.
//!
//! Dates and times become ISO-8601 strings, fixed-point decimals become
//! floats, bytes become base64 text. Everything else passes through.
//!
//! Converting `NUMERIC` to `f64` loses precision beyond ~15 significant
//! digits. That is fine for display (stock counts, unit costs, copays) and
//! not fine for financial reconciliation; callers that need exact amounts
//! should read the warehouse directly.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};

/// A value as decoded from the warehouse, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RawValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<Utc>),
    /// Nested or otherwise unrecognized values, passed through as-is.
    Json(Value),
}

/// A decoded warehouse row, in result-column order.
pub type RawRow = Vec<(String, RawValue)>;

/// A normalized row, ready to serialize.
pub type Row = Map<String, Value>;

/// Converts one raw value to its JSON-safe form. Never fails.
pub fn normalize_value(value: RawValue) -> Value {
    match value {
        RawValue::Null => Value::Null,
        RawValue::Bool(b) => Value::Bool(b),
        RawValue::Int(i) => Value::from(i),
        RawValue::Float(f) => float_to_json(f),
        RawValue::Decimal(d) => match d.to_f64() {
            Some(f) => float_to_json(f),
            None => Value::String(d.to_string()),
        },
        RawValue::String(s) => Value::String(s),
        RawValue::Bytes(b) => Value::String(BASE64.encode(b)),
        RawValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        RawValue::Time(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
        RawValue::DateTime(dt) => Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        RawValue::Timestamp(ts) => Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        RawValue::Json(v) => v,
    }
}

/// Normalizes every value of a row.
pub fn normalize_row(row: RawRow) -> Row {
    row.into_iter()
        .map(|(column, value)| (column, normalize_value(value)))
        .collect()
}

/// Normalizes a batch of rows.
pub fn normalize_rows(rows: Vec<RawRow>) -> Vec<Row> {
    rows.into_iter().map(normalize_row).collect()
}

/// JSON has no NaN or infinity; those become their string spelling.
fn float_to_json(f: f64) -> Value {
    Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(f.to_string()))
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        RawValue::Bool(v)
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Int(v)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Float(v)
    }
}

impl From<Decimal> for RawValue {
    fn from(v: Decimal) -> Self {
        RawValue::Decimal(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::String(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        RawValue::String(v)
    }
}

impl From<NaiveDate> for RawValue {
    fn from(v: NaiveDate) -> Self {
        RawValue::Date(v)
    }
}

impl From<DateTime<Utc>> for RawValue {
    fn from(v: DateTime<Utc>) -> Self {
        RawValue::Timestamp(v)
    }
}

impl<T> From<Option<T>> for RawValue
where
    T: Into<RawValue>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => RawValue::Null,
        }
    }
}
