//! Type-checked filter values and their SQL renderings.
//!
//! A JSON filter value is checked against the column's declared type before
//! it is rendered, either as a bound parameter value or as an escaped inline
//! literal.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use crate::error::FilterError;
use crate::schema::ColumnType;

/// A filter value that has been checked against its column type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    String(String),
    Integer(i64),
    Numeric(Decimal),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Boolean(bool),
}

impl TypedValue {
    /// Checks a non-null JSON value against the declared column type.
    pub fn from_json(column: &str, column_type: ColumnType, value: &Value) -> Result<Self, FilterError> {
        let invalid = |reason: &str| FilterError::InvalidValue {
            column: column.to_string(),
            column_type,
            reason: reason.to_string(),
        };

        match column_type {
            ColumnType::String => match value {
                Value::String(s) => Ok(Self::String(s.clone())),
                Value::Number(n) => Ok(Self::String(n.to_string())),
                Value::Bool(b) => Ok(Self::String(b.to_string())),
                _ => Err(invalid("expected a string")),
            },
            ColumnType::Integer => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| {
                        n.as_f64()
                            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                            .map(|f| f as i64)
                    })
                    .map(Self::Integer)
                    .ok_or_else(|| invalid("expected a whole number")),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Self::Integer)
                    .map_err(|_| invalid("expected a whole number")),
                _ => Err(invalid("expected a whole number")),
            },
            ColumnType::Numeric => {
                let text = match value {
                    Value::Number(n) => n.to_string(),
                    Value::String(s) => s.trim().to_string(),
                    _ => return Err(invalid("expected a number")),
                };
                Decimal::from_str(&text)
                    .or_else(|_| Decimal::from_scientific(&text))
                    .map(Self::Numeric)
                    .map_err(|_| invalid("expected a number"))
            }
            ColumnType::Date => match value {
                Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .map(Self::Date)
                    .map_err(|_| invalid("expected a date in YYYY-MM-DD form")),
                _ => Err(invalid("expected a date in YYYY-MM-DD form")),
            },
            ColumnType::Timestamp => match value {
                Value::String(s) => parse_timestamp(s.trim())
                    .map(Self::Timestamp)
                    .ok_or_else(|| invalid("expected an ISO-8601 timestamp")),
                _ => Err(invalid("expected an ISO-8601 timestamp")),
            },
            ColumnType::Boolean => match value {
                Value::Bool(b) => Ok(Self::Boolean(*b)),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Self::Boolean(true)),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Self::Boolean(false)),
                _ => Err(invalid("expected true or false")),
            },
        }
    }

    /// Returns the column type this value was checked against.
    pub fn column_type(&self) -> ColumnType {
        match self {
            Self::String(_) => ColumnType::String,
            Self::Integer(_) => ColumnType::Integer,
            Self::Numeric(_) => ColumnType::Numeric,
            Self::Date(_) => ColumnType::Date,
            Self::Timestamp(_) => ColumnType::Timestamp,
            Self::Boolean(_) => ColumnType::Boolean,
        }
    }

    /// Renders the value as an inline SQL literal.
    pub fn to_literal(&self) -> String {
        match self {
            Self::String(s) => quote_string(s),
            Self::Integer(i) => i.to_string(),
            Self::Numeric(d) => d.to_string(),
            Self::Date(d) => format!("DATE '{}'", d.format("%Y-%m-%d")),
            Self::Timestamp(ts) => format!("TIMESTAMP '{}'", format_timestamp(ts)),
            Self::Boolean(true) => "TRUE".to_string(),
            Self::Boolean(false) => "FALSE".to_string(),
        }
    }

    /// Renders the value as the text of a bound query parameter.
    pub fn to_parameter_value(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Numeric(d) => d.to_string(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Timestamp(ts) => format_timestamp(ts),
            Self::Boolean(b) => b.to_string(),
        }
    }
}

/// Quotes a string as a single-quoted SQL literal.
///
/// Backslashes, quotes and control characters are backslash-escaped, so the
/// literal always ends at the closing quote.
pub fn quote_string(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('\'');
    for c in s.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            '\0' => quoted.push_str("\\0"),
            c => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]` (UTC), or a bare date (midnight UTC).
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
