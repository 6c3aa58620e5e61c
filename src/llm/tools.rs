//! LLM tool definitions for function calling.
//!
//! Declares the pharmacy tools the agent may call and the argument shapes
//! the toolbox decodes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::schema::Table;

/// Tool definition for LLM function calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

pub const GET_PRESCRIPTIONS: &str = "get_prescriptions";
pub const GET_USERS: &str = "get_users";
pub const CHECK_INVENTORY: &str = "check_inventory";
pub const NOTIFY_PATIENT: &str = "notify_patient";
pub const QUERY_WAREHOUSE: &str = "query_warehouse";

/// Arguments for the filter tools (`get_prescriptions`, `get_users`, `check_inventory`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterToolInput {
    #[serde(default)]
    pub filters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Arguments for `notify_patient`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyPatientInput {
    pub message: String,
    #[serde(default)]
    pub patient_info: Map<String, Value>,
}

/// Arguments for `query_warehouse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryWarehouseInput {
    pub sql: String,
}

/// Returns the table a filter tool reads, if `name` is one.
pub fn filter_tool_table(name: &str) -> Option<Table> {
    match name {
        GET_PRESCRIPTIONS => Some(Table::Prescriptions),
        GET_USERS => Some(Table::Users),
        CHECK_INVENTORY => Some(Table::Inventory),
        _ => None,
    }
}

fn filter_tool(name: &str, summary: &str, table: Table, examples: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: format!(
            "{summary}\n\n{} table schema:\n{}\n\nFilters map a column to a value (equality) \
             or to [operator, value] with operator one of =, !=, <>, <, <=, >, >=, IS, IS NOT. \
             A null value tests IS NULL / IS NOT NULL. Examples: {examples}",
            table.as_str(),
            table.schema().describe()
        ),
        parameters: json!({
            "type": "object",
            "properties": {
                "filters": {
                    "type": "object",
                    "description": "Column name to value or [operator, value]"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of rows to return (default: 50)"
                }
            },
            "required": ["filters"]
        }),
    }
}

/// Returns the tool definitions available to the LLM.
///
/// `allow_sql` adds `query_warehouse` for ad-hoc read-only SQL.
pub fn get_tool_definitions(allow_sql: bool) -> Vec<ToolDefinition> {
    let mut tools = vec![
        filter_tool(
            GET_PRESCRIPTIONS,
            "Fetch prescriptions, filtered by patient, medication, status, dates or any other column.",
            Table::Prescriptions,
            r#"{"patientName": "Alice Rivera", "status": "ready"}"#,
        ),
        filter_tool(
            GET_USERS,
            "Fetch patients and staff, filtered by role, name, email, phone or date of birth.",
            Table::Users,
            r#"{"role": "pharmacist"}, {"DateOfBirth": [">", "1990-01-01"]}"#,
        ),
        filter_tool(
            CHECK_INVENTORY,
            "Fetch inventory records, filtered by NDC, stock levels, expiration, supplier or any other column.",
            Table::Inventory,
            r#"{"ndc": "12345-6789"}, {"currentStock": ["<=", 10]}, {"expirationDate": [">", "2025-01-01"]}"#,
        ),
        ToolDefinition {
            name: NOTIFY_PATIENT.to_string(),
            description: "Send an SMS to a patient. patient_info is a Users row; its phone \
                          column is required. Returns a status payload (SUCCESS, FAILED or ERROR)."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "Text message to send"
                    },
                    "patient_info": {
                        "type": "object",
                        "description": "The patient's Users row (id, name, phone, ...)"
                    }
                },
                "required": ["message", "patient_info"]
            }),
        },
    ];

    if allow_sql {
        tools.push(ToolDefinition {
            name: QUERY_WAREHOUSE.to_string(),
            description: "Run a single read-only BigQuery SELECT for questions the filter tools \
                          cannot answer (aggregates, joins, ranges). Reference tables as \
                          `project.dataset.Table`."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "sql": {
                        "type": "string",
                        "description": "Standard SQL SELECT statement"
                    }
                },
                "required": ["sql"]
            }),
        });
    }

    tools
}
