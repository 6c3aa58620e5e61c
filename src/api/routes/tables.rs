//! Generic filtered table query endpoint

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::api::types::{ApiError, TableQueryRequest};
use crate::api::AppState;
use crate::query::{compile_select, Filters, QueryParameter, Row};
use crate::schema::Table;
use crate::warehouse;

#[derive(Debug, Serialize)]
pub struct TableQueryResponse {
    pub table: Table,
    pub sql: String,
    pub parameters: Vec<QueryParameter>,
    pub rows: Vec<Row>,
}

/// Compiles `{filters, limit}` against the table's schema and runs it.
pub async fn query_table(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(request): Json<TableQueryRequest>,
) -> Result<Json<TableQueryResponse>, ApiError> {
    let table: Table = table
        .parse()
        .map_err(|_| ApiError::not_found("UNKNOWN_TABLE", format!("Unknown table '{table}'")))?;

    let filters = Filters::from_json(&request.filters)?;
    let limit = request.limit.unwrap_or(state.default_limit);
    let query = compile_select(table.schema(), state.catalog.get(table), &filters, limit)?;

    tracing::debug!(table = %table, sql = %query.sql, "Compiled table query");
    let rows = warehouse::fetch_rows(state.warehouse.as_ref(), &query).await?;

    Ok(Json(TableQueryResponse {
        table,
        sql: query.sql,
        parameters: query.parameters,
        rows,
    }))
}
