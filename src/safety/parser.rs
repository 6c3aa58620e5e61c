//! SQL parsing and read-only checks.
//!
//! Uses sqlparser-rs with the BigQuery dialect. A statement passes only if
//! it is a query whose body, CTEs and derived tables are SELECT, VALUES or
//! set operations over those.

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::BigQueryDialect;
use sqlparser::parser::Parser;

use crate::error::{MedeaseError, Result};

use super::Rejection;

/// Parses SQL and rejects anything that is not a single read-only query.
#[derive(Debug)]
pub struct ReadOnlyGuard {
    dialect: BigQueryDialect,
}

impl Default for ReadOnlyGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadOnlyGuard {
    pub fn new() -> Self {
        Self {
            dialect: BigQueryDialect {},
        }
    }

    /// Returns `Ok(())` when the SQL is exactly one read-only query.
    pub fn check(&self, sql: &str) -> std::result::Result<(), Rejection> {
        let statements = Parser::parse_sql(&self.dialect, sql)
            .map_err(|e| Rejection::Unparsable(e.to_string()))?;

        match statements.as_slice() {
            [] => Err(Rejection::Empty),
            [statement] => check_statement(statement),
            many => Err(Rejection::MultipleStatements(many.len())),
        }
    }
}

/// Convenience wrapper returning a [`MedeaseError::Query`] on rejection.
pub fn ensure_read_only(sql: &str) -> Result<()> {
    ReadOnlyGuard::new()
        .check(sql)
        .map_err(|rejection| MedeaseError::query(rejection.to_string()))
}

fn check_statement(statement: &Statement) -> std::result::Result<(), Rejection> {
    match statement {
        Statement::Query(query) => check_query(query),
        other => Err(Rejection::NotReadOnly(statement_kind(other))),
    }
}

fn check_query(query: &Query) -> std::result::Result<(), Rejection> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            check_query(&cte.query)?;
        }
    }
    check_set_expr(&query.body)
}

fn check_set_expr(set_expr: &SetExpr) -> std::result::Result<(), Rejection> {
    match set_expr {
        SetExpr::Select(select) => check_select(select),
        SetExpr::Query(query) => check_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left)?;
            check_set_expr(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => Ok(()),
        // INSERT / UPDATE and friends nested in a query body
        other => Err(Rejection::NotReadOnly(first_keyword(&other.to_string()))),
    }
}

fn check_select(select: &Select) -> std::result::Result<(), Rejection> {
    select.from.iter().try_for_each(check_table_with_joins)
}

fn check_table_with_joins(twj: &TableWithJoins) -> std::result::Result<(), Rejection> {
    check_table_factor(&twj.relation)?;
    twj.joins
        .iter()
        .try_for_each(|join| check_table_factor(&join.relation))
}

fn check_table_factor(factor: &TableFactor) -> std::result::Result<(), Rejection> {
    match factor {
        TableFactor::Derived { subquery, .. } => check_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => check_table_with_joins(table_with_joins),
        _ => Ok(()),
    }
}

/// Names a rejected statement by its leading keyword(s), e.g. `DELETE`, `CREATE TABLE`.
fn statement_kind(statement: &Statement) -> String {
    first_keyword(&statement.to_string())
}

fn first_keyword(sql: &str) -> String {
    let mut words = sql.split_whitespace();
    match words.next() {
        Some(first) => {
            let first = first.to_uppercase();
            match first.as_str() {
                "CREATE" | "DROP" | "ALTER" | "TRUNCATE" => match words.next() {
                    Some(second) => format!("{} {}", first, second.to_uppercase()),
                    None => first,
                },
                _ => first,
            }
        }
        None => "unknown statement".to_string(),
    }
}
