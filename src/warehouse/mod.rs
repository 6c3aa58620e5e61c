//! Warehouse abstraction layer for MedEase.
//!
//! Provides a trait-based interface for running compiled queries, so the
//! BigQuery client and the in-memory mock can be used interchangeably.

mod bigquery;
mod mock;

pub use bigquery::BigQueryClient;
pub use mock::MockWarehouse;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{TableNames, WarehouseBackend, WarehouseConfig};
use crate::error::Result;
use crate::query::{compile_select, normalize_rows, CompiledQuery, Filters, RawRow, Row, TableRef};
use crate::schema::Table;

/// Project and dataset used for table references when running against the mock.
const MOCK_PROJECT: &str = "medease-local";
const MOCK_DATASET: &str = "MedEase";

/// Trait defining the interface for warehouse clients.
///
/// All operations are async and return Results with MedeaseError. Failures
/// are classified transient or permanent so callers can decide on retries.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Runs a query and returns its rows with warehouse-native values.
    async fn query(&self, query: &CompiledQuery) -> Result<Vec<RawRow>>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Creates a warehouse client for the configured backend.
pub async fn connect(config: &WarehouseConfig) -> Result<Arc<dyn Warehouse>> {
    match config.backend {
        WarehouseBackend::BigQuery => {
            let client = BigQueryClient::connect(config).await?;
            Ok(Arc::new(client))
        }
        WarehouseBackend::Mock => {
            let catalog = TableCatalog::from_config(config)?;
            Ok(Arc::new(MockWarehouse::with_sample_data(&catalog)))
        }
    }
}

/// Fully-qualified references for every known table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCatalog {
    inventory: TableRef,
    prescriptions: TableRef,
    users: TableRef,
}

impl TableCatalog {
    pub fn new(project: &str, dataset: &str, names: &TableNames) -> Result<Self> {
        Ok(Self {
            inventory: TableRef::new(project, dataset, &names.inventory)?,
            prescriptions: TableRef::new(project, dataset, &names.prescriptions)?,
            users: TableRef::new(project, dataset, &names.users)?,
        })
    }

    /// Builds the catalog from warehouse settings.
    ///
    /// The mock backend falls back to a local project and dataset when none
    /// is configured; BigQuery requires both.
    pub fn from_config(config: &WarehouseConfig) -> Result<Self> {
        match config.backend {
            WarehouseBackend::BigQuery => Self::new(
                config.require_project()?,
                config.require_dataset()?,
                &config.tables,
            ),
            WarehouseBackend::Mock => Self::new(
                config.project_id.as_deref().unwrap_or(MOCK_PROJECT),
                config.dataset.as_deref().unwrap_or(MOCK_DATASET),
                &config.tables,
            ),
        }
    }

    pub fn get(&self, table: Table) -> &TableRef {
        match table {
            Table::Inventory => &self.inventory,
            Table::Prescriptions => &self.prescriptions,
            Table::Users => &self.users,
        }
    }
}

/// Runs a query and normalizes every returned row.
pub async fn fetch_rows(warehouse: &dyn Warehouse, query: &CompiledQuery) -> Result<Vec<Row>> {
    let start = Instant::now();
    let result = warehouse.query(query).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(rows) => {
            tracing::debug!(
                backend = warehouse.name(),
                rows = rows.len(),
                parameters = query.parameters.len(),
                duration_ms,
                "Warehouse query completed"
            );
            Ok(normalize_rows(rows))
        }
        Err(e) => {
            tracing::warn!(
                backend = warehouse.name(),
                duration_ms,
                retryable = e.is_retryable(),
                error = %e,
                "Warehouse query failed"
            );
            Err(e)
        }
    }
}

/// Compiles a filtered select for `table` and fetches its normalized rows.
pub async fn select(
    warehouse: &dyn Warehouse,
    catalog: &TableCatalog,
    table: Table,
    filters: &Filters,
    limit: u32,
) -> Result<Vec<Row>> {
    let query = compile_select(table.schema(), catalog.get(table), filters, limit)?;
    tracing::debug!(table = %table, sql = %query.sql, "Compiled filter query");
    fetch_rows(warehouse, &query).await
}
