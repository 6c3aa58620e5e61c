//! Filter compilation: filter entries + column schema → WHERE clause + query.
//!
//! By default every value is bound as a named parameter (`@p0`, `@p1`, ...)
//! typed by its column's declared type, so no filter value text reaches the
//! SQL string. [`ParamStyle::Inline`] renders escaped literals instead, for
//! display and debugging.

use serde::Serialize;
use std::fmt;

use super::filter::{FilterEntry, Filters, NullTest};
use super::literal::TypedValue;
use crate::error::{FilterError, MedeaseError, Result};
use crate::schema::{ColumnType, TableSchema};

/// How filter values are placed into the SQL text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParamStyle {
    /// `column = @p0` with a typed parameter.
    #[default]
    Named,
    /// `column = 'value'` with the value escaped inline.
    Inline,
}

/// A fully-qualified `project.dataset.table` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    project: String,
    dataset: String,
    table: String,
}

impl TableRef {
    /// Creates a reference, rejecting parts that could break out of the quoted name.
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Result<Self> {
        let table_ref = Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        };
        for (label, part) in [
            ("project", &table_ref.project),
            ("dataset", &table_ref.dataset),
            ("table", &table_ref.table),
        ] {
            if part.is_empty() {
                return Err(MedeaseError::config(format!("{label} name is empty")));
            }
            if part
                .chars()
                .any(|c| c == '`' || c == '.' || c.is_whitespace() || c.is_control())
            {
                return Err(MedeaseError::config(format!(
                    "Invalid {label} name '{part}'"
                )));
            }
        }
        Ok(table_ref)
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}.{}.{}`", self.project, self.dataset, self.table)
    }
}

/// A named, typed query parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameter {
    pub name: String,
    pub value: TypedValue,
}

impl QueryParameter {
    pub fn new(name: impl Into<String>, value: TypedValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn column_type(&self) -> ColumnType {
        self.value.column_type()
    }
}

impl Serialize for QueryParameter {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("QueryParameter", 3)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("type", &self.column_type())?;
        state.serialize_field("value", &self.value.to_parameter_value())?;
        state.end()
    }
}

/// SQL text plus the parameters it references.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub parameters: Vec<QueryParameter>,
}

impl CompiledQuery {
    /// Wraps SQL that takes no parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: QueryParameter) -> Self {
        self.parameters.push(parameter);
        self
    }
}

/// Rendered clauses of a WHERE predicate, in filter order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    clauses: Vec<String>,
    parameters: Vec<QueryParameter>,
}

impl Predicate {
    pub fn clauses(&self) -> &[String] {
        &self.clauses
    }

    pub fn parameters(&self) -> &[QueryParameter] {
        &self.parameters
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Returns `WHERE a AND b`, or `None` when there are no clauses.
    pub fn where_clause(&self) -> Option<String> {
        if self.clauses.is_empty() {
            None
        } else {
            Some(format!("WHERE {}", self.clauses.join(" AND ")))
        }
    }
}

/// Compiles filters against one table schema.
#[derive(Debug, Clone, Copy)]
pub struct FilterCompiler<'a> {
    schema: &'a TableSchema,
    style: ParamStyle,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(schema: &'a TableSchema) -> Self {
        Self {
            schema,
            style: ParamStyle::Named,
        }
    }

    pub fn with_style(mut self, style: ParamStyle) -> Self {
        self.style = style;
        self
    }

    /// Renders every filter entry into a clause.
    pub fn compile_predicate(&self, filters: &Filters) -> std::result::Result<Predicate, FilterError> {
        let mut predicate = Predicate::default();
        for entry in filters.iter() {
            let clause = self.compile_entry(entry, &mut predicate.parameters)?;
            predicate.clauses.push(clause);
        }
        Ok(predicate)
    }

    /// Builds `SELECT * FROM table [WHERE ...] LIMIT n`.
    ///
    /// The limit caps the row count; no ordering is implied.
    pub fn compile_select(
        &self,
        table: &TableRef,
        filters: &Filters,
        limit: u32,
    ) -> std::result::Result<CompiledQuery, FilterError> {
        if limit == 0 {
            return Err(FilterError::InvalidLimit);
        }

        let predicate = self.compile_predicate(filters)?;
        let mut sql = format!("SELECT * FROM {table}");
        if let Some(where_clause) = predicate.where_clause() {
            sql.push(' ');
            sql.push_str(&where_clause);
        }
        sql.push_str(&format!(" LIMIT {limit}"));

        Ok(CompiledQuery {
            sql,
            parameters: predicate.parameters,
        })
    }

    fn compile_entry(
        &self,
        entry: &FilterEntry,
        parameters: &mut Vec<QueryParameter>,
    ) -> std::result::Result<String, FilterError> {
        let (column, column_type) =
            self.schema
                .column(&entry.column)
                .ok_or_else(|| FilterError::UnknownColumn {
                    table: self.schema.name().to_string(),
                    column: entry.column.clone(),
                })?;

        if entry.value.is_null() {
            return match entry.operator.null_test() {
                Some(NullTest::IsNull) => Ok(format!("{column} IS NULL")),
                Some(NullTest::IsNotNull) => Ok(format!("{column} IS NOT NULL")),
                None => Err(FilterError::NullComparison {
                    column: column.to_string(),
                    operator: entry.operator.to_string(),
                }),
            };
        }

        let value = TypedValue::from_json(column, column_type, &entry.value)?;

        if entry.operator.is_identity_test() {
            // IS / IS NOT only take keywords, never a bound value.
            return match value {
                TypedValue::Boolean(_) => {
                    Ok(format!("{column} {} {}", entry.operator, value.to_literal()))
                }
                _ => Err(FilterError::InvalidValue {
                    column: column.to_string(),
                    column_type,
                    reason: format!("{} only accepts NULL or a boolean", entry.operator),
                }),
            };
        }

        let rendered = match self.style {
            ParamStyle::Inline => value.to_literal(),
            ParamStyle::Named => {
                let name = format!("p{}", parameters.len());
                let placeholder = format!("@{name}");
                parameters.push(QueryParameter::new(name, value));
                placeholder
            }
        };

        Ok(format!("{column} {} {rendered}", entry.operator))
    }
}

/// Compiles a select with the default (named parameter) style.
pub fn compile_select(
    schema: &TableSchema,
    table: &TableRef,
    filters: &Filters,
    limit: u32,
) -> std::result::Result<CompiledQuery, FilterError> {
    FilterCompiler::new(schema).compile_select(table, filters, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::Operator;
    use crate::schema::{INVENTORY, PRESCRIPTIONS, USERS};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn inventory_ref() -> TableRef {
        TableRef::new("med-ease-473410", "MedEase", "Inventory").unwrap()
    }

    fn inline(schema: &TableSchema) -> FilterCompiler<'_> {
        FilterCompiler::new(schema).with_style(ParamStyle::Inline)
    }

    fn filters(value: Value) -> Filters {
        Filters::from_json(&value).unwrap()
    }

    #[test]
    fn test_empty_filters_have_no_where_clause() {
        let predicate = FilterCompiler::new(&INVENTORY)
            .compile_predicate(&Filters::new())
            .unwrap();
        assert!(predicate.is_empty());
        assert_eq!(predicate.where_clause(), None);

        let query = compile_select(&INVENTORY, &inventory_ref(), &Filters::new(), 50).unwrap();
        assert_eq!(
            query.sql,
            "SELECT * FROM `med-ease-473410.MedEase.Inventory` LIMIT 50"
        );
        assert!(!query.sql.contains("WHERE"));
        assert!(query.parameters.is_empty());
    }

    #[test]
    fn test_bare_value_means_equality() {
        let predicate = inline(&PRESCRIPTIONS)
            .compile_predicate(&filters(json!({
                "patientName": "Alice Rivera",
                "quantity": 30,
                "copayAmount": "12.50",
                "dateFilled": "2025-02-01T09:00:00Z"
            })))
            .unwrap();

        assert_eq!(
            predicate.clauses(),
            &[
                "patientName = 'Alice Rivera'".to_string(),
                "quantity = 30".to_string(),
                "copayAmount = 12.50".to_string(),
                "dateFilled = TIMESTAMP '2025-02-01T09:00:00Z'".to_string(),
            ]
        );
    }

    #[test]
    fn test_integer_comparison_is_unquoted() {
        let predicate = inline(&INVENTORY)
            .compile_predicate(&filters(json!({"currentStock": ["<=", 10]})))
            .unwrap();
        assert_eq!(predicate.clauses(), &["currentStock <= 10".to_string()]);
    }

    #[test]
    fn test_date_and_boolean_formatting() {
        let predicate = inline(&INVENTORY)
            .compile_predicate(&filters(json!({
                "expirationDate": [">", "2025-01-01"],
                "needsReorder": true
            })))
            .unwrap();
        assert_eq!(
            predicate.where_clause().unwrap(),
            "WHERE expirationDate > DATE '2025-01-01' AND needsReorder = TRUE"
        );
    }

    #[test]
    fn test_null_with_equality_operators() {
        for op in ["=", "IS", "is"] {
            let predicate = inline(&PRESCRIPTIONS)
                .compile_predicate(&filters(json!({"dateFilled": [op, null]})))
                .unwrap();
            assert_eq!(predicate.clauses(), &["dateFilled IS NULL".to_string()], "{op}");
        }

        let predicate = inline(&PRESCRIPTIONS)
            .compile_predicate(&filters(json!({"dateFilled": null})))
            .unwrap();
        assert_eq!(predicate.clauses(), &["dateFilled IS NULL".to_string()]);
    }

    #[test]
    fn test_null_with_inequality_operators() {
        for op in ["!=", "<>", "IS NOT"] {
            let predicate = FilterCompiler::new(&PRESCRIPTIONS)
                .compile_predicate(&filters(json!({"dateFilled": [op, null]})))
                .unwrap();
            assert_eq!(
                predicate.clauses(),
                &["dateFilled IS NOT NULL".to_string()],
                "{op}"
            );
            assert!(predicate.parameters().is_empty());
        }
    }

    #[test]
    fn test_null_with_ordering_operator_fails() {
        let err = inline(&PRESCRIPTIONS)
            .compile_predicate(&filters(json!({"quantity": ["<", null]})))
            .unwrap_err();
        assert_eq!(
            err,
            FilterError::NullComparison {
                column: "quantity".to_string(),
                operator: "<".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_column_fails() {
        let err = FilterCompiler::new(&USERS)
            .compile_predicate(&filters(json!({"password": "hunter2"})))
            .unwrap_err();
        assert_eq!(
            err,
            FilterError::UnknownColumn {
                table: "Users".to_string(),
                column: "password".to_string(),
            }
        );
    }

    #[test]
    fn test_invalid_numeric_value_fails() {
        let err = FilterCompiler::new(&INVENTORY)
            .compile_predicate(&filters(json!({"costPerUnit": [">", "a lot"]})))
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidValue { .. }));
    }

    #[test]
    fn test_string_with_quote_is_escaped_inline() {
        let predicate = inline(&USERS)
            .compile_predicate(&filters(json!({"name": "x' OR '1'='1"})))
            .unwrap();
        assert_eq!(predicate.clauses(), &[r"name = 'x\' OR \'1\'=\'1'".to_string()]);
    }

    #[test]
    fn test_named_parameters_keep_values_out_of_sql() {
        let query = FilterCompiler::new(&USERS)
            .compile_select(
                &TableRef::new("p", "d", "Users").unwrap(),
                &filters(json!({
                    "name": "x' OR '1'='1",
                    "DateOfBirth": [">", "1990-01-01"]
                })),
                5,
            )
            .unwrap();

        assert_eq!(
            query.sql,
            "SELECT * FROM `p.d.Users` WHERE name = @p0 AND DateOfBirth > @p1 LIMIT 5"
        );
        assert_eq!(query.parameters.len(), 2);
        assert_eq!(query.parameters[0].name, "p0");
        assert_eq!(query.parameters[0].column_type(), ColumnType::String);
        assert_eq!(
            query.parameters[0].value,
            TypedValue::String("x' OR '1'='1".to_string())
        );
        assert_eq!(query.parameters[1].column_type(), ColumnType::Date);
    }

    #[test]
    fn test_is_with_boolean_renders_keyword() {
        let query = FilterCompiler::new(&INVENTORY)
            .compile_select(
                &inventory_ref(),
                &filters(json!({"needsReorder": ["IS NOT", false]})),
                10,
            )
            .unwrap();
        assert!(query.sql.contains("WHERE needsReorder IS NOT FALSE"));
        assert!(query.parameters.is_empty());
    }

    #[test]
    fn test_is_with_non_boolean_fails() {
        let err = FilterCompiler::new(&INVENTORY)
            .compile_predicate(&filters(json!({"name": ["IS", "Amoxicillin"]})))
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidValue { .. }));
    }

    #[test]
    fn test_zero_limit_fails() {
        let err = compile_select(&INVENTORY, &inventory_ref(), &Filters::new(), 0).unwrap_err();
        assert_eq!(err, FilterError::InvalidLimit);
    }

    #[test]
    fn test_operator_on_builder() {
        let filters = Filters::new().with(Operator::GtEq.on("maxStock", 100));
        let predicate = inline(&INVENTORY).compile_predicate(&filters).unwrap();
        assert_eq!(predicate.clauses(), &["maxStock >= 100".to_string()]);
    }

    #[test]
    fn test_table_ref_validation() {
        assert!(TableRef::new("proj", "data", "Inventory").is_ok());
        assert!(TableRef::new("proj", "data", "Inv`entory").is_err());
        assert!(TableRef::new("proj", "", "Inventory").is_err());
        assert!(TableRef::new("proj", "data", "Inventory; DROP").is_err());
    }

    #[test]
    fn test_compiled_query_serializes_parameters() {
        let query = CompiledQuery::raw("SELECT 1 WHERE x = @q")
            .with_parameter(QueryParameter::new("q", TypedValue::Integer(3)));
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(
            json,
            json!({
                "sql": "SELECT 1 WHERE x = @q",
                "parameters": [{"name": "q", "type": "INTEGER", "value": "3"}]
            })
        );
    }
}
