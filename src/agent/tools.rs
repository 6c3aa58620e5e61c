//! Tool execution for the agent loop.
//!
//! Every tool returns a JSON value that is fed back to the model. Failures
//! never escape as errors; they become status payloads the model can read.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{MedeaseError, Result};
use crate::llm::tools::{
    self, FilterToolInput, NotifyPatientInput, QueryWarehouseInput, ToolDefinition,
    NOTIFY_PATIENT, QUERY_WAREHOUSE,
};
use crate::query::{CompiledQuery, Filters, Row};
use crate::safety::ensure_read_only;
use crate::schema::Table;
use crate::sms::{normalize_us_phone, SmsGateway};
use crate::warehouse::{self, TableCatalog, Warehouse};

/// Builds the payload reported for a failed tool.
pub fn error_payload(error: &MedeaseError) -> Value {
    json!({
        "status": "ERROR",
        "kind": error.kind(),
        "retryable": error.is_retryable(),
        "message": error.to_string(),
    })
}

/// The data-access and notification tools the agent can call.
pub struct Toolbox {
    warehouse: Arc<dyn Warehouse>,
    catalog: TableCatalog,
    sms: Arc<dyn SmsGateway>,
    default_limit: u32,
    allow_sql: bool,
}

impl Toolbox {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        catalog: TableCatalog,
        sms: Arc<dyn SmsGateway>,
        default_limit: u32,
    ) -> Self {
        Self {
            warehouse,
            catalog,
            sms,
            default_limit,
            allow_sql: true,
        }
    }

    /// Enables or disables the ad-hoc `query_warehouse` tool.
    pub fn with_sql(mut self, allow_sql: bool) -> Self {
        self.allow_sql = allow_sql;
        self
    }

    /// Returns the definitions advertised to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        tools::get_tool_definitions(self.allow_sql)
    }

    pub fn catalog(&self) -> &TableCatalog {
        &self.catalog
    }

    /// Runs the named tool with JSON `arguments` and returns its result payload.
    pub async fn dispatch(&self, name: &str, arguments: &str) -> Value {
        debug!(tool = name, "Dispatching tool call");

        let result = match (name, tools::filter_tool_table(name)) {
            (_, Some(table)) => match parse_arguments::<FilterToolInput>(name, arguments) {
                Ok(input) => self.select(table, input).await,
                Err(e) => Err(e),
            },
            (NOTIFY_PATIENT, None) => {
                return match parse_arguments::<NotifyPatientInput>(name, arguments) {
                    Ok(input) => self.notify_patient(&input.message, &input.patient_info).await,
                    Err(e) => error_payload(&e),
                };
            }
            (QUERY_WAREHOUSE, None) if self.allow_sql => {
                match parse_arguments::<QueryWarehouseInput>(name, arguments) {
                    Ok(input) => self.query_warehouse(&input.sql).await,
                    Err(e) => Err(e),
                }
            }
            _ => Err(MedeaseError::internal(format!("Unknown tool: {name}"))),
        };

        match result {
            Ok(rows) => Value::Array(rows.into_iter().map(Value::Object).collect()),
            Err(e) => {
                warn!(tool = name, error = %e, "Tool call failed");
                error_payload(&e)
            }
        }
    }

    /// Fetches rows of `table` matching the tool's filters.
    async fn select(&self, table: Table, input: FilterToolInput) -> Result<Vec<Row>> {
        let filters = Filters::try_from(input.filters)?;
        let limit = input.limit.unwrap_or(self.default_limit);
        warehouse::select(self.warehouse.as_ref(), &self.catalog, table, &filters, limit).await
    }

    /// Runs model-written SQL after the read-only check.
    async fn query_warehouse(&self, sql: &str) -> Result<Vec<Row>> {
        ensure_read_only(sql)?;
        warehouse::fetch_rows(self.warehouse.as_ref(), &CompiledQuery::raw(sql)).await
    }

    /// Sends `message` to the phone number in a Users row.
    pub async fn notify_patient(&self, message: &str, patient_info: &Map<String, Value>) -> Value {
        let phone = match patient_info.get("phone") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return json!({
                    "status": "FAILED",
                    "message": "No phone number provided",
                })
            }
        };

        let sent = match normalize_us_phone(&phone) {
            Ok(to) => self.sms.send(&to, message).await,
            Err(e) => Err(e),
        };

        match sent {
            Ok(receipt) => {
                info!(sid = %receipt.sid, status = %receipt.status, "Patient notification sent");
                json!({
                    "status": "SUCCESS",
                    "sid": receipt.sid,
                    "to": receipt.to,
                })
            }
            Err(e) => {
                warn!(error = %e, "Patient notification failed");
                error_payload(&e)
            }
        }
    }
}

fn parse_arguments<T: DeserializeOwned>(tool: &str, arguments: &str) -> Result<T> {
    let arguments = if arguments.trim().is_empty() {
        "{}"
    } else {
        arguments
    };
    serde_json::from_str(arguments)
        .map_err(|e| MedeaseError::llm(format!("Invalid arguments for {tool}: {e}")))
}
