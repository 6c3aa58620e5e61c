//! HTTP API for the pharmacy gateway.
//!
//! Exposes inventory and prescription data, a generic filtered table query
//! and the streaming agent endpoint.

pub mod routes;
pub mod types;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::{Agent, Toolbox};
use crate::config::Config;
use crate::error::{MedeaseError, Result};
use crate::llm;
use crate::sms;
use crate::warehouse::{self, TableCatalog, Warehouse};

use routes::{agent, health, medicines, tables};

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub warehouse: Arc<dyn Warehouse>,
    pub catalog: Arc<TableCatalog>,
    pub agent: Arc<Agent>,
    pub default_limit: u32,
}

impl AppState {
    /// Connects every collaborator named in the configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let warehouse = warehouse::connect(&config.warehouse).await?;
        let catalog = TableCatalog::from_config(&config.warehouse)?;
        let sms = sms::connect(&config.sms)?;
        let llm = llm::create_client(&config.llm)?;

        let default_limit = config.warehouse.default_limit;
        let toolbox = Toolbox::new(warehouse.clone(), catalog.clone(), sms, default_limit);
        let agent = Agent::new(llm, toolbox, config.agent.clone());

        info!(
            warehouse = warehouse.name(),
            llm = %config.llm.provider,
            "Application state ready"
        );

        Ok(Self {
            warehouse,
            catalog: Arc::new(catalog),
            agent: Arc::new(agent),
            default_limit,
        })
    }
}

/// Builds the router with CORS and request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/pharmacy/home", get(medicines::pharmacy_home))
        .route("/api/medicines", get(medicines::search_medicines))
        .route("/api/medicines/{id}", get(medicines::get_medicine))
        .route(
            "/api/medicines/{id}/prescriptions",
            get(medicines::medicine_prescriptions),
        )
        .route("/api/{table}/query", post(tables::query_table))
        .route("/agent/respond", post(agent::respond))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the API until Ctrl-C.
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| MedeaseError::config(format!("Failed to bind {addr}: {e}")))?;

    info!(address = %addr, "MedEase gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| MedeaseError::internal(format!("Server error: {e}")))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl-C; running until killed");
            std::future::pending::<()>().await;
        }
    }
}
