//! Filter entries: column → value or column → (operator, value).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::FilterError;

/// Comparison operator of a filter entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    /// `!=`
    NotEq,
    /// `<>`, kept apart from `!=` so the rendered SQL matches the input.
    LtGt,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Is,
    IsNot,
}

/// How a NULL value renders for a given operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullTest {
    IsNull,
    IsNotNull,
}

impl Operator {
    /// Parses an operator, ignoring case and surrounding/internal whitespace.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_uppercase().as_str() {
            "=" | "==" => Some(Self::Eq),
            "!=" => Some(Self::NotEq),
            "<>" => Some(Self::LtGt),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::LtEq),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::GtEq),
            "IS" => Some(Self::Is),
            "IS NOT" => Some(Self::IsNot),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::LtGt => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Is => "IS",
            Self::IsNot => "IS NOT",
        }
    }

    /// Returns the NULL test this operator means when the value is NULL.
    ///
    /// Ordering operators have no NULL meaning and return `None`.
    pub fn null_test(&self) -> Option<NullTest> {
        match self {
            Self::Eq | Self::Is => Some(NullTest::IsNull),
            Self::NotEq | Self::LtGt | Self::IsNot => Some(NullTest::IsNotNull),
            Self::Lt | Self::LtEq | Self::Gt | Self::GtEq => None,
        }
    }

    /// Returns true for `IS` / `IS NOT`, which only take NULL or a boolean keyword.
    pub fn is_identity_test(&self) -> bool {
        matches!(self, Self::Is | Self::IsNot)
    }

    /// Builds a filter entry using this operator.
    pub fn on(self, column: impl Into<String>, value: impl Into<Value>) -> FilterEntry {
        FilterEntry::new(column, self, value)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One column predicate before type checking.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterEntry {
    pub column: String,
    pub operator: Operator,
    pub value: Value,
}

impl FilterEntry {
    pub fn new(column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    /// Creates an equality entry, the meaning of a bare value.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Eq, value)
    }

    /// Parses one JSON entry: a bare value, or a two-element `[operator, value]` array.
    pub fn from_json(column: &str, raw: &Value) -> Result<Self, FilterError> {
        if let Value::Array(pair) = raw {
            if let [Value::String(op), value] = pair.as_slice() {
                let operator =
                    Operator::parse(op).ok_or_else(|| FilterError::UnsupportedOperator {
                        column: column.to_string(),
                        operator: op.clone(),
                    })?;
                return Ok(Self::new(column, operator, value.clone()));
            }
        }
        Ok(Self::eq(column, raw.clone()))
    }
}

/// An ordered set of filter entries, at most one per column.
///
/// Entries are keyed by column like the JSON object they come from, so a
/// column carries a single predicate. Range queries such as
/// `currentStock > 5 AND currentStock < 20` cannot be expressed; inserting a
/// second entry for a column replaces the first.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct Filters {
    entries: Vec<FilterEntry>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, replacing any existing entry for the same column.
    pub fn insert(&mut self, entry: FilterEntry) {
        match self.entries.iter_mut().find(|e| e.column == entry.column) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Builder form of [`Filters::insert`].
    pub fn with(mut self, entry: FilterEntry) -> Self {
        self.insert(entry);
        self
    }

    /// Parses filters from a JSON value. `null` means no filters.
    pub fn from_json(value: &Value) -> Result<Self, FilterError> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Self::try_from(map.clone()),
            _ => Err(FilterError::NotAnObject),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TryFrom<Map<String, Value>> for Filters {
    type Error = FilterError;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut filters = Self::new();
        for (column, raw) in &map {
            filters.insert(FilterEntry::from_json(column, raw)?);
        }
        Ok(filters)
    }
}

impl Serialize for Filters {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|e| {
                let value = match e.operator {
                    Operator::Eq => e.value.clone(),
                    op => Value::Array(vec![Value::from(op.as_str()), e.value.clone()]),
                };
                (e.column.clone(), value)
            })
            .collect();
        map.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_parse() {
        assert_eq!(Operator::parse("="), Some(Operator::Eq));
        assert_eq!(Operator::parse("<>"), Some(Operator::LtGt));
        assert_eq!(Operator::parse(" >= "), Some(Operator::GtEq));
        assert_eq!(Operator::parse("is"), Some(Operator::Is));
        assert_eq!(Operator::parse("is  not"), Some(Operator::IsNot));
        assert_eq!(Operator::parse("LIKE"), None);
        assert_eq!(Operator::parse("=>"), None);
    }

    #[test]
    fn test_null_tests() {
        assert_eq!(Operator::Eq.null_test(), Some(NullTest::IsNull));
        assert_eq!(Operator::Is.null_test(), Some(NullTest::IsNull));
        assert_eq!(Operator::NotEq.null_test(), Some(NullTest::IsNotNull));
        assert_eq!(Operator::LtGt.null_test(), Some(NullTest::IsNotNull));
        assert_eq!(Operator::IsNot.null_test(), Some(NullTest::IsNotNull));
        assert_eq!(Operator::Lt.null_test(), None);
    }

    #[test]
    fn test_entry_from_bare_value() {
        let entry = FilterEntry::from_json("ndc", &json!("12345-6789")).unwrap();
        assert_eq!(entry, FilterEntry::eq("ndc", "12345-6789"));
    }

    #[test]
    fn test_entry_from_operator_pair() {
        let entry = FilterEntry::from_json("currentStock", &json!(["<=", 10])).unwrap();
        assert_eq!(entry.operator, Operator::LtEq);
        assert_eq!(entry.value, json!(10));
    }

    #[test]
    fn test_entry_with_unknown_operator() {
        let err = FilterEntry::from_json("name", &json!(["LIKE", "%amox%"])).unwrap_err();
        assert_eq!(
            err,
            FilterError::UnsupportedOperator {
                column: "name".to_string(),
                operator: "LIKE".to_string(),
            }
        );
    }

    #[test]
    fn test_filters_deserialize_preserves_order() {
        let filters: Filters = serde_json::from_value(json!({
            "status": "pending",
            "quantity": [">", 30],
            "dateFilled": ["IS", null]
        }))
        .unwrap();

        let columns: Vec<&str> = filters.iter().map(|e| e.column.as_str()).collect();
        assert_eq!(columns, vec!["status", "quantity", "dateFilled"]);
    }

    #[test]
    fn test_filters_reject_non_object() {
        assert_eq!(
            Filters::from_json(&json!(["status", "pending"])),
            Err(FilterError::NotAnObject)
        );
        assert!(Filters::from_json(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_insert_replaces_same_column() {
        let filters = Filters::new()
            .with(FilterEntry::new("currentStock", Operator::Gt, 5))
            .with(FilterEntry::new("currentStock", Operator::Lt, 20));

        assert_eq!(filters.len(), 1);
        let entry = filters.iter().next().unwrap();
        assert_eq!(entry.operator, Operator::Lt);
    }

    #[test]
    fn test_filters_serialize() {
        let filters = Filters::new()
            .with(FilterEntry::eq("role", "pharmacist"))
            .with(FilterEntry::new("DateOfBirth", Operator::Gt, "1990-01-01"));

        let json = serde_json::to_value(&filters).unwrap();
        assert_eq!(
            json,
            json!({"role": "pharmacist", "DateOfBirth": [">", "1990-01-01"]})
        );
    }
}
