//! Filter compiler and row normalizer tests.
//!
//! Exercises the public query API end to end: JSON filters in, SQL text and
//! typed parameters out, and warehouse values back to JSON.

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use medease::error::FilterError;
use medease::query::{
    compile_select, normalize_row, FilterCompiler, Filters, ParamStyle, RawValue, TableRef,
};
use medease::schema::{ColumnType, INVENTORY, PRESCRIPTIONS, USERS};

fn table(name: &str) -> TableRef {
    TableRef::new("med-ease-473410", "MedEase", name).unwrap()
}

fn filters(value: Value) -> Filters {
    Filters::from_json(&value).unwrap()
}

fn inline_sql(value: Value, limit: u32) -> String {
    FilterCompiler::new(&INVENTORY)
        .with_style(ParamStyle::Inline)
        .compile_select(&table("Inventory"), &filters(value), limit)
        .unwrap()
        .sql
}

#[test]
fn test_empty_filters_select_everything_up_to_limit() {
    let query = compile_select(&INVENTORY, &table("Inventory"), &filters(json!({})), 50).unwrap();
    assert_eq!(
        query.sql,
        "SELECT * FROM `med-ease-473410.MedEase.Inventory` LIMIT 50"
    );
    assert!(query.parameters.is_empty());

    let query = compile_select(&USERS, &table("Users"), &filters(Value::Null), 50).unwrap();
    assert!(!query.sql.contains("WHERE"));
}

#[test]
fn test_ordering_operator_renders_inline() {
    assert_eq!(
        inline_sql(json!({"currentStock": ["<=", 10]}), 5),
        "SELECT * FROM `med-ease-473410.MedEase.Inventory` WHERE currentStock <= 10 LIMIT 5"
    );
}

#[test]
fn test_equality_formats_value_by_column_type() {
    let sql = inline_sql(
        json!({
            "name": "Amoxicillin",
            "currentStock": "120",
            "costPerUnit": 0.35,
            "needsReorder": false,
            "expirationDate": "2026-03-31"
        }),
        50,
    );
    assert_eq!(
        sql,
        "SELECT * FROM `med-ease-473410.MedEase.Inventory` WHERE name = 'Amoxicillin' \
         AND currentStock = 120 AND costPerUnit = 0.35 AND needsReorder = FALSE \
         AND expirationDate = DATE '2026-03-31' LIMIT 50"
    );
}

#[test]
fn test_null_values_become_null_tests() {
    let sql = FilterCompiler::new(&PRESCRIPTIONS)
        .with_style(ParamStyle::Inline)
        .compile_select(
            &table("Prescriptions"),
            &filters(json!({
                "dateFilled": null,
                "warnings": ["!=", null],
                "agentId": ["IS NOT", null]
            })),
            10,
        )
        .unwrap()
        .sql;
    assert_eq!(
        sql,
        "SELECT * FROM `med-ease-473410.MedEase.Prescriptions` WHERE dateFilled IS NULL \
         AND warnings IS NOT NULL AND agentId IS NOT NULL LIMIT 10"
    );

    let err = compile_select(
        &INVENTORY,
        &table("Inventory"),
        &filters(json!({"currentStock": [">", null]})),
        10,
    )
    .unwrap_err();
    assert!(matches!(err, FilterError::NullComparison { .. }));
}

#[test]
fn test_is_takes_boolean_keywords_only() {
    assert_eq!(
        inline_sql(json!({"needsReorder": ["IS", true]}), 3),
        "SELECT * FROM `med-ease-473410.MedEase.Inventory` WHERE needsReorder IS TRUE LIMIT 3"
    );

    let err = compile_select(
        &INVENTORY,
        &table("Inventory"),
        &filters(json!({"name": ["IS", "Metformin"]})),
        3,
    )
    .unwrap_err();
    assert!(matches!(err, FilterError::InvalidValue { .. }));
}

#[test]
fn test_quotes_are_escaped_inline_and_bound_verbatim() {
    let value = json!({"name": "O'Brien's \\ tonic"});

    assert_eq!(
        inline_sql(value.clone(), 1),
        "SELECT * FROM `med-ease-473410.MedEase.Inventory` WHERE name = 'O\\'Brien\\'s \\\\ tonic' LIMIT 1"
    );

    let query = compile_select(&INVENTORY, &table("Inventory"), &filters(value), 1).unwrap();
    assert_eq!(
        query.sql,
        "SELECT * FROM `med-ease-473410.MedEase.Inventory` WHERE name = @p0 LIMIT 1"
    );
    assert_eq!(
        serde_json::to_value(&query.parameters).unwrap(),
        json!([{"name": "p0", "type": "STRING", "value": "O'Brien's \\ tonic"}])
    );
}

#[test]
fn test_named_parameters_are_typed_and_numbered() {
    let query = compile_select(
        &INVENTORY,
        &table("Inventory"),
        &filters(json!({
            "currentStock": ["<", 50],
            "expirationDate": ["<=", "2026-01-31"],
            "costPerUnit": [">", "0.10"]
        })),
        25,
    )
    .unwrap();

    assert_eq!(
        query.sql,
        "SELECT * FROM `med-ease-473410.MedEase.Inventory` WHERE currentStock < @p0 \
         AND expirationDate <= @p1 AND costPerUnit > @p2 LIMIT 25"
    );
    let types: Vec<ColumnType> = query.parameters.iter().map(|p| p.column_type()).collect();
    assert_eq!(
        types,
        vec![ColumnType::Integer, ColumnType::Date, ColumnType::Numeric]
    );
    assert_eq!(
        serde_json::to_value(&query.parameters).unwrap(),
        json!([
            {"name": "p0", "type": "INTEGER", "value": "50"},
            {"name": "p1", "type": "DATE", "value": "2026-01-31"},
            {"name": "p2", "type": "NUMERIC", "value": "0.10"}
        ])
    );
}

#[test]
fn test_rejected_filters() {
    let unknown = compile_select(
        &INVENTORY,
        &table("Inventory"),
        &filters(json!({"price": 3})),
        10,
    )
    .unwrap_err();
    assert!(matches!(unknown, FilterError::UnknownColumn { ref column, .. } if column == "price"));

    let bad_type = compile_select(
        &INVENTORY,
        &table("Inventory"),
        &filters(json!({"currentStock": "lots"})),
        10,
    )
    .unwrap_err();
    assert!(matches!(bad_type, FilterError::InvalidValue { .. }));

    let zero_limit =
        compile_select(&INVENTORY, &table("Inventory"), &Filters::new(), 0).unwrap_err();
    assert_eq!(zero_limit, FilterError::InvalidLimit);

    let bad_operator = Filters::from_json(&json!({"name": ["LIKE", "%a%"]})).unwrap_err();
    assert!(matches!(bad_operator, FilterError::UnsupportedOperator { .. }));

    assert_eq!(
        Filters::from_json(&json!(["name", "x"])).unwrap_err(),
        FilterError::NotAnObject
    );
}

#[test]
fn test_table_reference_rejects_breakout() {
    assert!(TableRef::new("p", "d", "Inventory` WHERE 1=1 --").is_err());
    assert!(TableRef::new("p", "", "Inventory").is_err());
}

#[test]
fn test_normalize_row_converts_dates_and_decimals() {
    let row = normalize_row(vec![
        (
            "expirationDate".to_string(),
            RawValue::Date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()),
        ),
        (
            "costPerUnit".to_string(),
            RawValue::Decimal(Decimal::new(35, 1)),
        ),
        ("currentStock".to_string(), RawValue::Int(8)),
        ("warnings".to_string(), RawValue::Null),
    ]);

    assert_eq!(
        Value::Object(row.clone()),
        json!({
            "expirationDate": "2025-01-01",
            "costPerUnit": 3.5,
            "currentStock": 8,
            "warnings": null
        })
    );
    let columns: Vec<&String> = row.keys().collect();
    assert_eq!(
        columns,
        vec!["expirationDate", "costPerUnit", "currentStock", "warnings"]
    );
}
