//! Pharmacy dashboard and medicine endpoints

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::api::types::{ApiError, MedicineSearchQuery};
use crate::api::AppState;
use crate::query::{
    CompiledQuery, FilterCompiler, FilterEntry, Filters, QueryParameter, Row, TypedValue,
};
use crate::schema::{Table, PRESCRIPTIONS};
use crate::warehouse;

/// Columns returned by the medicine list.
const MEDICINE_COLUMNS: &str = "id, name, currentStock, expirationDate, costPerUnit, location";

/// Columns returned for a medicine's prescriptions.
const PRESCRIPTION_STATUS_COLUMNS: &str =
    "id, patientName, status, insuranceStatus, priority, dateCreated, dateFilled";

#[derive(Debug, Serialize)]
pub struct PharmacyHome {
    pub total_medicines: Value,
    pub low_stock_items: Value,
}

/// Dashboard totals: units in stock and items below their reorder threshold.
pub async fn pharmacy_home(State(state): State<AppState>) -> Result<Json<PharmacyHome>, ApiError> {
    let query = CompiledQuery::raw(format!(
        "SELECT SUM(currentStock) AS total_medicines, \
         COUNTIF(currentStock < minThreshold) AS low_stock_items FROM {}",
        state.catalog.get(Table::Inventory)
    ));

    let mut rows = warehouse::fetch_rows(state.warehouse.as_ref(), &query).await?;
    let mut summary = if rows.is_empty() { Row::new() } else { rows.swap_remove(0) };

    Ok(Json(PharmacyHome {
        total_medicines: summary.remove("total_medicines").unwrap_or(Value::Null),
        low_stock_items: summary.remove("low_stock_items").unwrap_or(Value::Null),
    }))
}

/// Lists medicines ordered by name, optionally filtered by a case-insensitive
/// name substring.
pub async fn search_medicines(
    State(state): State<AppState>,
    Query(params): Query<MedicineSearchQuery>,
) -> Result<Json<Vec<Row>>, ApiError> {
    let limit = resolve_limit(params.limit, state.default_limit)?;
    let search = params.q.trim().to_lowercase();

    let mut sql = format!(
        "SELECT {MEDICINE_COLUMNS} FROM {}",
        state.catalog.get(Table::Inventory)
    );
    let mut query = CompiledQuery::default();
    if !search.is_empty() {
        sql.push_str(" WHERE LOWER(name) LIKE @q");
        query = query.with_parameter(QueryParameter::new(
            "q",
            TypedValue::String(format!("%{search}%")),
        ));
    }
    sql.push_str(&format!(" ORDER BY name LIMIT {limit}"));
    query.sql = sql;

    let rows = warehouse::fetch_rows(state.warehouse.as_ref(), &query).await?;
    Ok(Json(rows))
}

/// Returns one inventory row.
pub async fn get_medicine(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Row>, ApiError> {
    find_medicine(&state, &id).await.map(Json)
}

/// Returns prescription status rows for the medicine's name, newest first.
pub async fn medicine_prescriptions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Row>>, ApiError> {
    let medicine = find_medicine(&state, &id).await?;
    // A medicine without a name has no prescriptions to match.
    let name = match medicine.get("name") {
        Some(Value::String(name)) => name.clone(),
        _ => return Ok(Json(Vec::new())),
    };

    let filters = Filters::new().with(FilterEntry::eq("medication", name));
    let predicate = FilterCompiler::new(&PRESCRIPTIONS).compile_predicate(&filters)?;

    let mut sql = format!(
        "SELECT {PRESCRIPTION_STATUS_COLUMNS} FROM {}",
        state.catalog.get(Table::Prescriptions)
    );
    if let Some(where_clause) = predicate.where_clause() {
        sql.push(' ');
        sql.push_str(&where_clause);
    }
    sql.push_str(&format!(
        " ORDER BY dateCreated DESC LIMIT {}",
        state.default_limit
    ));

    let query = CompiledQuery {
        sql,
        parameters: predicate.parameters().to_vec(),
    };
    let rows = warehouse::fetch_rows(state.warehouse.as_ref(), &query).await?;
    Ok(Json(rows))
}

async fn find_medicine(state: &AppState, id: &str) -> Result<Row, ApiError> {
    let filters = Filters::new().with(FilterEntry::eq("id", id));
    let rows = warehouse::select(
        state.warehouse.as_ref(),
        &state.catalog,
        Table::Inventory,
        &filters,
        1,
    )
    .await?;

    rows.into_iter().next().ok_or_else(|| {
        ApiError::not_found("MEDICINE_NOT_FOUND", format!("No medicine with id '{id}'"))
    })
}

fn resolve_limit(limit: Option<u32>, default_limit: u32) -> Result<u32, ApiError> {
    match limit {
        Some(0) => Err(ApiError::bad_request(
            "INVALID_LIMIT",
            "limit must be at least 1",
        )),
        Some(limit) => Ok(limit),
        None => Ok(default_limit),
    }
}
