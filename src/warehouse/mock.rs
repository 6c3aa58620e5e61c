//! Mock warehouse for testing and `--mock` mode.
//!
//! Holds in-memory tables and evaluates the SELECT shapes this crate
//! generates, parsed with sqlparser: `SELECT * | cols FROM t [WHERE ...]
//! [ORDER BY col [DESC]] [LIMIT n]`. The WHERE clause may combine
//! `col <op> value`, `[LOWER(col)] LIKE value`, and
//! `col IS [NOT] NULL|TRUE|FALSE` with AND, OR and NOT, where a value is a
//! bound `@param` or a literal. Anything else needs a scripted response
//! registered with [`MockWarehouse::with_response`].

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlparser::ast::{
    BinaryOperator, Expr, FunctionArg, FunctionArgExpr, FunctionArguments, SelectItem, SetExpr,
    Statement, TableFactor, UnaryOperator, Value as SqlValue,
};
use sqlparser::dialect::BigQueryDialect;
use sqlparser::parser::Parser;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use super::{TableCatalog, Warehouse};
use crate::error::{MedeaseError, Result, WarehouseErrorKind};
use crate::query::{CompiledQuery, RawRow, RawValue, TypedValue};
use crate::schema::{ColumnType, Table};

/// A mock warehouse that answers from in-memory tables.
#[derive(Default)]
pub struct MockWarehouse {
    tables: HashMap<String, Vec<RawRow>>,
    responses: Vec<(String, Vec<RawRow>)>,
    failure: Option<(WarehouseErrorKind, String)>,
    executed: Mutex<Vec<CompiledQuery>>,
}

impl MockWarehouse {
    /// Creates a mock warehouse with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock warehouse seeded with sample pharmacy data, using the
    /// catalog's table names.
    pub fn with_sample_data(catalog: &TableCatalog) -> Self {
        let inventory = sample_inventory();
        let total: i64 = inventory
            .iter()
            .filter_map(|row| int_column(row, "currentStock"))
            .sum();
        let low = inventory
            .iter()
            .filter(|row| {
                matches!(
                    (int_column(row, "currentStock"), int_column(row, "minThreshold")),
                    (Some(stock), Some(min)) if stock < min
                )
            })
            .count() as i64;

        Self::new()
            .with_table(catalog.get(Table::Inventory).table(), inventory)
            .with_table(catalog.get(Table::Prescriptions).table(), sample_prescriptions())
            .with_table(catalog.get(Table::Users).table(), sample_users())
            .with_response(
                "COUNTIF",
                vec![vec![
                    ("total_medicines".to_string(), RawValue::Int(total)),
                    ("low_stock_items".to_string(), RawValue::Int(low)),
                ]],
            )
    }

    /// Adds (or replaces) a table.
    pub fn with_table(mut self, name: impl Into<String>, rows: Vec<RawRow>) -> Self {
        self.tables.insert(name.into(), rows);
        self
    }

    /// Adds a scripted response returned for any SQL containing `fragment`.
    ///
    /// Scripted responses are checked in insertion order before tables.
    pub fn with_response(mut self, fragment: impl Into<String>, rows: Vec<RawRow>) -> Self {
        self.responses.push((fragment.into(), rows));
        self
    }

    /// Makes every query fail with the given error.
    pub fn failing(mut self, kind: WarehouseErrorKind, message: impl Into<String>) -> Self {
        self.failure = Some((kind, message.into()));
        self
    }

    /// Returns every query run so far, in order.
    pub fn executed(&self) -> Vec<CompiledQuery> {
        self.executed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn evaluate(&self, query: &CompiledQuery) -> Result<Vec<RawRow>> {
        let plan = Plan::parse(&query.sql).ok_or_else(|| {
            MedeaseError::permanent(format!("Mock warehouse cannot run: {}", query.sql))
        })?;

        let rows = self
            .tables
            .get(&plan.table)
            .ok_or_else(|| MedeaseError::permanent(format!("Table not found: {}", plan.table)))?;

        let mut matched = Vec::new();
        for row in rows {
            if plan.matches(row, query)? {
                matched.push(row.clone());
            }
        }

        if let Some((column, descending)) = &plan.order_by {
            matched.sort_by(|a, b| {
                let ordering = compare_raw(lookup(a, column), lookup(b, column));
                if *descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        if let Some(limit) = plan.limit {
            matched.truncate(limit);
        }

        Ok(match &plan.columns {
            Some(columns) => matched
                .into_iter()
                .map(|row| {
                    columns
                        .iter()
                        .map(|c| (c.clone(), lookup(&row, c).cloned().unwrap_or_default()))
                        .collect()
                })
                .collect(),
            None => matched,
        })
    }
}

#[async_trait]
impl Warehouse for MockWarehouse {
    async fn query(&self, query: &CompiledQuery) -> Result<Vec<RawRow>> {
        self.executed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(query.clone());

        if let Some((kind, message)) = &self.failure {
            return Err(match kind {
                WarehouseErrorKind::Transient => MedeaseError::transient(message.clone()),
                WarehouseErrorKind::Permanent => MedeaseError::permanent(message.clone()),
            });
        }

        if let Some((_, rows)) = self
            .responses
            .iter()
            .find(|(fragment, _)| query.sql.contains(fragment.as_str()))
        {
            return Ok(rows.clone());
        }

        self.evaluate(query)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// The parts of a generated SELECT the mock understands.
#[derive(Debug, PartialEq)]
struct Plan {
    columns: Option<Vec<String>>,
    table: String,
    selection: Option<Expr>,
    order_by: Option<(String, bool)>,
    limit: Option<usize>,
}

impl Plan {
    fn parse(sql: &str) -> Option<Self> {
        let statements = Parser::parse_sql(&BigQueryDialect {}, sql).ok()?;
        let [Statement::Query(query)] = statements.as_slice() else {
            return None;
        };
        if query.with.is_some() || query.offset.is_some() {
            return None;
        }
        let SetExpr::Select(select) = query.body.as_ref() else {
            return None;
        };

        let columns = projection(&select.projection)?;

        let [from] = select.from.as_slice() else {
            return None;
        };
        if !from.joins.is_empty() {
            return None;
        }
        let TableFactor::Table { name, .. } = &from.relation else {
            return None;
        };
        // `p.d.T` in backticks is a single identifier.
        let table = name.0.last()?.value.rsplit('.').next()?.to_string();

        let order_by = match &query.order_by {
            Some(order_by) => match order_by.exprs.as_slice() {
                [item] => Some((column_name(&item.expr)?, item.asc == Some(false))),
                _ => return None,
            },
            None => None,
        };

        let limit = match &query.limit {
            Some(Expr::Value(SqlValue::Number(n, _))) => Some(n.parse().ok()?),
            Some(_) => return None,
            None => None,
        };

        Some(Self {
            columns,
            table,
            selection: select.selection.clone(),
            order_by,
            limit,
        })
    }

    fn matches(&self, row: &RawRow, query: &CompiledQuery) -> Result<bool> {
        match &self.selection {
            Some(expr) => predicate_holds(expr, row, query),
            None => Ok(true),
        }
    }
}

/// `None` for `*`, the column names for a plain column list.
fn projection(items: &[SelectItem]) -> Option<Option<Vec<String>>> {
    if let [SelectItem::Wildcard(_)] = items {
        return Some(None);
    }
    items
        .iter()
        .map(|item| match item {
            SelectItem::UnnamedExpr(expr) => column_name(expr),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
        .map(Some)
}

fn column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.clone()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|ident| ident.value.clone()),
        _ => None,
    }
}

/// The column inside `LOWER(col)`.
fn lowered_column(expr: &Expr) -> Option<String> {
    let Expr::Function(function) = expr else {
        return None;
    };
    if !function.name.to_string().eq_ignore_ascii_case("LOWER") {
        return None;
    }
    let FunctionArguments::List(list) = &function.args else {
        return None;
    };
    match list.args.as_slice() {
        [FunctionArg::Unnamed(FunctionArgExpr::Expr(inner))] => column_name(inner),
        _ => None,
    }
}

/// Resolves the right-hand side of a comparison to a typed value.
fn operand(expr: &Expr, query: &CompiledQuery) -> Option<TypedValue> {
    match expr {
        Expr::Nested(inner) => operand(inner, query),
        Expr::Value(SqlValue::Placeholder(placeholder)) => parameter(query, placeholder).cloned(),
        Expr::Value(SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s)) => {
            Some(TypedValue::String(s.clone()))
        }
        Expr::Value(SqlValue::Boolean(b)) => Some(TypedValue::Boolean(*b)),
        Expr::Value(SqlValue::Number(n, _)) => n
            .parse()
            .map(TypedValue::Integer)
            .ok()
            .or_else(|| Decimal::from_str(n).ok().map(TypedValue::Numeric)),
        Expr::TypedString { data_type, value } => {
            let column_type = ColumnType::parse(&data_type.to_string())?;
            TypedValue::from_json("literal", column_type, &serde_json::Value::String(value.clone()))
                .ok()
        }
        _ => None,
    }
}

fn predicate_holds(expr: &Expr, row: &RawRow, query: &CompiledQuery) -> Result<bool> {
    let unsupported = || MedeaseError::permanent(format!("Mock warehouse cannot evaluate: {}", expr));
    let column_of = |inner: &Expr| column_name(inner).ok_or_else(unsupported);
    let is_null = |value: Option<&RawValue>| matches!(value, None | Some(RawValue::Null));

    match expr {
        Expr::Nested(inner) => predicate_holds(inner, row, query),
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr: inner,
        } => Ok(!predicate_holds(inner, row, query)?),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => Ok(predicate_holds(left, row, query)? && predicate_holds(right, row, query)?),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Or,
            right,
        } => Ok(predicate_holds(left, row, query)? || predicate_holds(right, row, query)?),
        Expr::BinaryOp { left, op, right } => {
            let column = column_of(left)?;
            let expected = operand(right, query).ok_or_else(unsupported)?;
            let Some(ordering) = lookup(row, &column).and_then(|v| compare_typed(v, &expected)) else {
                return Ok(false);
            };
            Ok(match op {
                BinaryOperator::Eq => ordering == Ordering::Equal,
                BinaryOperator::NotEq => ordering != Ordering::Equal,
                BinaryOperator::Lt => ordering == Ordering::Less,
                BinaryOperator::LtEq => ordering != Ordering::Greater,
                BinaryOperator::Gt => ordering == Ordering::Greater,
                BinaryOperator::GtEq => ordering != Ordering::Less,
                _ => return Err(unsupported()),
            })
        }
        Expr::IsNull(inner) => Ok(is_null(lookup(row, &column_of(inner)?))),
        Expr::IsNotNull(inner) => Ok(!is_null(lookup(row, &column_of(inner)?))),
        Expr::IsTrue(inner) => Ok(matches!(lookup(row, &column_of(inner)?), Some(RawValue::Bool(true)))),
        Expr::IsNotTrue(inner) => Ok(!matches!(lookup(row, &column_of(inner)?), Some(RawValue::Bool(true)))),
        Expr::IsFalse(inner) => Ok(matches!(lookup(row, &column_of(inner)?), Some(RawValue::Bool(false)))),
        Expr::IsNotFalse(inner) => Ok(!matches!(lookup(row, &column_of(inner)?), Some(RawValue::Bool(false)))),
        Expr::Like {
            negated,
            expr: subject,
            pattern,
            escape_char: None,
        } => {
            let (column, fold_case) = match lowered_column(subject) {
                Some(column) => (column, true),
                None => (column_of(subject)?, false),
            };
            let Some(TypedValue::String(pattern)) = operand(pattern, query) else {
                return Err(unsupported());
            };
            let holds = match lookup(row, &column) {
                Some(RawValue::String(s)) if fold_case => like_match(&s.to_lowercase(), &pattern.to_lowercase()),
                Some(RawValue::String(s)) => like_match(s, &pattern),
                _ => return Ok(false),
            };
            Ok(holds != *negated)
        }
        _ => Err(unsupported()),
    }
}

fn parameter<'a>(query: &'a CompiledQuery, placeholder: &str) -> Option<&'a TypedValue> {
    let name = placeholder.strip_prefix('@')?;
    query
        .parameters
        .iter()
        .find(|p| p.name == name)
        .map(|p| &p.value)
}

fn lookup<'a>(row: &'a RawRow, column: &str) -> Option<&'a RawValue> {
    row.iter().find(|(c, _)| c == column).map(|(_, v)| v)
}

fn int_column(row: &RawRow, column: &str) -> Option<i64> {
    match lookup(row, column) {
        Some(RawValue::Int(i)) => Some(*i),
        _ => None,
    }
}

/// Compares a stored value with a bound parameter; `None` when incomparable or NULL.
fn compare_typed(raw: &RawValue, typed: &TypedValue) -> Option<Ordering> {
    match (raw, typed) {
        (RawValue::String(a), TypedValue::String(b)) => Some(a.as_str().cmp(b.as_str())),
        (RawValue::Int(a), TypedValue::Integer(b)) => Some(a.cmp(b)),
        (RawValue::Int(a), TypedValue::Numeric(b)) => Some(Decimal::from(*a).cmp(b)),
        (RawValue::Decimal(a), TypedValue::Numeric(b)) => Some(a.cmp(b)),
        (RawValue::Decimal(a), TypedValue::Integer(b)) => Some(a.cmp(&Decimal::from(*b))),
        (RawValue::Float(a), TypedValue::Numeric(b)) => a.partial_cmp(&b.to_f64()?),
        (RawValue::Float(a), TypedValue::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (RawValue::Date(a), TypedValue::Date(b)) => Some(a.cmp(b)),
        (RawValue::Timestamp(a), TypedValue::Timestamp(b)) => Some(a.cmp(b)),
        (RawValue::Bool(a), TypedValue::Boolean(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Orders two stored values for ORDER BY; NULLs sort first.
fn compare_raw(a: Option<&RawValue>, b: Option<&RawValue>) -> Ordering {
    match (a, b) {
        (Some(RawValue::String(x)), Some(RawValue::String(y))) => x.cmp(y),
        (Some(RawValue::Int(x)), Some(RawValue::Int(y))) => x.cmp(y),
        (Some(RawValue::Decimal(x)), Some(RawValue::Decimal(y))) => x.cmp(y),
        (Some(RawValue::Date(x)), Some(RawValue::Date(y))) => x.cmp(y),
        (Some(RawValue::Timestamp(x)), Some(RawValue::Timestamp(y))) => x.cmp(y),
        (Some(RawValue::Bool(x)), Some(RawValue::Bool(y))) => x.cmp(y),
        (None | Some(RawValue::Null), None | Some(RawValue::Null)) => Ordering::Equal,
        (None | Some(RawValue::Null), _) => Ordering::Less,
        (_, None | Some(RawValue::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// SQL LIKE with `%` and `_` wildcards.
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    like_from(&text, &pattern)
}

fn like_from(text: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => (0..=text.len()).any(|skip| like_from(&text[skip..], rest)),
        Some(('_', rest)) => !text.is_empty() && like_from(&text[1..], rest),
        Some((c, rest)) => text.first() == Some(c) && like_from(&text[1..], rest),
    }
}

fn row(cells: Vec<(&str, RawValue)>) -> RawRow {
    cells
        .into_iter()
        .map(|(column, value)| (column.to_string(), value))
        .collect()
}

fn date(y: i32, m: u32, d: u32) -> RawValue {
    NaiveDate::from_ymd_opt(y, m, d)
        .map(RawValue::Date)
        .unwrap_or_default()
}

fn timestamp(y: i32, m: u32, d: u32, h: u32) -> RawValue {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0)
        .single()
        .map(RawValue::Timestamp)
        .unwrap_or_default()
}

fn money(cents: i64) -> RawValue {
    RawValue::Decimal(Decimal::new(cents, 2))
}

#[allow(clippy::too_many_arguments)]
fn inventory_row(
    id: &str,
    name: &str,
    generic: &str,
    ndc: &str,
    stock: i64,
    min: i64,
    max: i64,
    supplier: &str,
    cost_cents: i64,
    expiration: RawValue,
    lot: &str,
    location: &str,
) -> RawRow {
    row(vec![
        ("id", id.into()),
        ("name", name.into()),
        ("genericName", generic.into()),
        ("ndc", ndc.into()),
        ("currentStock", stock.into()),
        ("minThreshold", min.into()),
        ("maxStock", max.into()),
        ("lastReorder", date(2025, 8, 1)),
        ("needsReorder", (stock < min).into()),
        ("supplier", supplier.into()),
        ("costPerUnit", money(cost_cents)),
        ("expirationDate", expiration),
        ("lotNumber", lot.into()),
        ("location", location.into()),
        ("created_at", timestamp(2025, 1, 6, 9)),
        ("updated_at", timestamp(2025, 9, 2, 17)),
    ])
}

fn sample_inventory() -> Vec<RawRow> {
    vec![
        inventory_row(
            "med-001", "Amoxicillin", "amoxicillin", "0093-4155", 120, 50, 500,
            "McKesson", 35, date(2026, 3, 31), "AMX-2291", "A1",
        ),
        inventory_row(
            "med-002", "Lisinopril", "lisinopril", "0172-3758", 8, 30, 300,
            "Cardinal Health", 12, date(2025, 12, 31), "LSN-1180", "B3",
        ),
        inventory_row(
            "med-003", "Atorvastatin", "atorvastatin calcium", "0071-0155", 45, 40, 400,
            "AmerisourceBergen", 48, date(2026, 7, 31), "ATV-5521", "B1",
        ),
        inventory_row(
            "med-004", "Metformin", "metformin hydrochloride", "0093-1048", 0, 60, 600,
            "McKesson", 9, date(2026, 1, 31), "MTF-0042", "C2",
        ),
    ]
}

#[allow(clippy::too_many_arguments)]
fn prescription_row(
    id: &str,
    patient_id: &str,
    patient_name: &str,
    medication: &str,
    dosage: &str,
    quantity: i64,
    status: &str,
    filled: RawValue,
    insurance: &str,
    priority: &str,
    copay_cents: i64,
    refills: i64,
) -> RawRow {
    row(vec![
        ("id", id.into()),
        ("patientId", patient_id.into()),
        ("patientName", patient_name.into()),
        ("medication", medication.into()),
        ("dosage", dosage.into()),
        ("quantity", quantity.into()),
        ("status", status.into()),
        ("prescribedBy", "Dr. Priya Patel".into()),
        ("dateCreated", timestamp(2025, 9, 1, 10)),
        ("dateFilled", filled),
        ("agentId", "agent-1".into()),
        ("insuranceStatus", insurance.into()),
        ("priority", priority.into()),
        ("estimatedCompletion", timestamp(2025, 9, 3, 16)),
        ("copayAmount", money(copay_cents)),
        ("refillsRemaining", refills.into()),
        ("instructions", "Take as directed".into()),
        ("warnings", RawValue::Null),
        ("created_at", timestamp(2025, 9, 1, 10)),
        ("updated_at", timestamp(2025, 9, 2, 12)),
    ])
}

fn sample_prescriptions() -> Vec<RawRow> {
    vec![
        prescription_row(
            "rx-1001", "usr-201", "Alice Rivera", "Amoxicillin", "500 mg", 30, "ready",
            timestamp(2025, 9, 2, 11), "approved", "normal", 1250, 0,
        ),
        prescription_row(
            "rx-1002", "usr-202", "Marcus Chen", "Lisinopril", "10 mg", 90, "pending",
            RawValue::Null, "pending", "high", 500, 3,
        ),
        prescription_row(
            "rx-1003", "usr-201", "Alice Rivera", "Atorvastatin", "20 mg", 30, "filled",
            timestamp(2025, 9, 2, 15), "approved", "normal", 800, 5,
        ),
    ]
}

fn user_row(id: &str, name: &str, role: &str, email: &str, phone: RawValue, dob: RawValue) -> RawRow {
    row(vec![
        ("id", id.into()),
        ("name", name.into()),
        ("role", role.into()),
        ("email", email.into()),
        ("phone", phone),
        ("DateOfBirth", dob),
        ("created_at", timestamp(2024, 11, 20, 8)),
        ("updated_at", timestamp(2025, 8, 30, 8)),
    ])
}

fn sample_users() -> Vec<RawRow> {
    vec![
        user_row(
            "usr-201", "Alice Rivera", "patient", "alice.rivera@example.com",
            "555-201-0001".into(), date(1988, 4, 12),
        ),
        user_row(
            "usr-202", "Marcus Chen", "patient", "marcus.chen@example.com",
            "(555) 201-0002".into(), date(1975, 11, 3),
        ),
        user_row(
            "usr-301", "Dana Brooks", "pharmacist", "dana.brooks@example.com",
            RawValue::Null, date(1990, 2, 20),
        ),
    ]
}
