//! BigQuery integration tests.
//!
//! These need GOOGLE_CLOUD_PROJECT and BQ_DATASET_ID, plus credentials
//! (BIGQUERY_ACCESS_TOKEN, GOOGLE_APPLICATION_CREDENTIALS or
//! application-default credentials). They skip when the dataset is not set.

use medease::config::WarehouseConfig;
use medease::error::MedeaseError;
use medease::query::{CompiledQuery, FilterEntry, Filters, Operator};
use medease::schema::Table;
use medease::warehouse::{self, BigQueryClient, TableCatalog};

/// Helper to build warehouse settings from the environment.
fn get_test_config() -> Option<WarehouseConfig> {
    let mut config = WarehouseConfig::default();
    config.apply_env_defaults();
    config.project_id.as_ref()?;
    config.dataset.as_ref()?;
    Some(config)
}

/// Helper to connect a client and catalog.
async fn get_test_client() -> Option<(BigQueryClient, TableCatalog)> {
    let config = get_test_config()?;
    let catalog = TableCatalog::from_config(&config).ok()?;
    let client = BigQueryClient::connect(&config).await.ok()?;
    Some((client, catalog))
}

#[tokio::test]
async fn test_select_inventory_with_limit() {
    let Some((client, catalog)) = get_test_client().await else {
        eprintln!("Skipping test: GOOGLE_CLOUD_PROJECT / BQ_DATASET_ID not set");
        return;
    };

    let rows = warehouse::select(&client, &catalog, Table::Inventory, &Filters::new(), 3)
        .await
        .unwrap();

    assert!(rows.len() <= 3);
    for row in &rows {
        assert!(row.contains_key("name"));
        assert!(row["currentStock"].is_number() || row["currentStock"].is_null());
    }
}

#[tokio::test]
async fn test_select_with_bound_parameters() {
    let Some((client, catalog)) = get_test_client().await else {
        eprintln!("Skipping test: GOOGLE_CLOUD_PROJECT / BQ_DATASET_ID not set");
        return;
    };

    let filters = Filters::new()
        .with(Operator::GtEq.on("currentStock", 0))
        .with(FilterEntry::new("name", Operator::NotEq, "O'Brien's \\ tonic"));
    let rows = warehouse::select(&client, &catalog, Table::Inventory, &filters, 5)
        .await
        .unwrap();

    for row in &rows {
        assert!(row["currentStock"].as_f64().unwrap_or(0.0) >= 0.0);
    }
}

#[tokio::test]
async fn test_missing_table_is_permanent() {
    let Some((client, _)) = get_test_client().await else {
        eprintln!("Skipping test: GOOGLE_CLOUD_PROJECT / BQ_DATASET_ID not set");
        return;
    };
    let config = get_test_config().unwrap();

    let query = CompiledQuery::raw(format!(
        "SELECT * FROM `{}.{}.DoesNotExist` LIMIT 1",
        config.project_id.unwrap(),
        config.dataset.unwrap()
    ));
    let err = warehouse::fetch_rows(&client, &query).await.unwrap_err();

    assert!(matches!(err, MedeaseError::Warehouse { .. }));
    assert!(!err.is_retryable());
}
