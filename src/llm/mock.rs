//! Mock LLM client for testing.
//!
//! Provides deterministic tool calls and answers based on input patterns.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{MedeaseError, Result};
use crate::llm::tools::{
    ToolDefinition, CHECK_INVENTORY, GET_PRESCRIPTIONS, GET_USERS, NOTIFY_PATIENT,
};
use crate::llm::types::{LlmResponse, Message, Role, ToolCall};
use crate::llm::LlmClient;

/// What the mock does when the latest user input matches a pattern.
#[derive(Debug, Clone)]
enum Scripted {
    Text(String),
    Tool { name: String, arguments: Value },
}

/// Mock LLM client that returns canned responses based on input patterns.
///
/// Used for unit testing and `--mock` mode without making real API calls.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    /// Custom mappings (pattern -> response), checked before the defaults.
    custom_responses: Vec<(String, Scripted)>,
    failure: Option<String>,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom text response.
    ///
    /// When the input contains `pattern`, the mock will return `response`.
    pub fn with_response(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.custom_responses
            .push((pattern.into(), Scripted::Text(response.into())));
        self
    }

    /// Adds a custom tool call, issued once per question.
    pub fn with_tool_call(
        mut self,
        pattern: impl Into<String>,
        name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        self.custom_responses.push((
            pattern.into(),
            Scripted::Tool {
                name: name.into(),
                arguments,
            },
        ));
        self
    }

    /// Makes every completion fail with the given message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Chooses the first step for a new question.
    fn first_step(&self, input: &str, tools: &[ToolDefinition]) -> Scripted {
        let input_lower = input.to_lowercase();

        for (pattern, response) in &self.custom_responses {
            if input_lower.contains(&pattern.to_lowercase()) {
                return response.clone();
            }
        }

        let offered = |name: &str| tools.iter().any(|t| t.name == name);
        let tool = |name: &str, arguments: Value| Scripted::Tool {
            name: name.to_string(),
            arguments,
        };

        if (input_lower.contains("notify") || input_lower.contains("remind"))
            && offered(GET_USERS)
            && offered(NOTIFY_PATIENT)
        {
            return tool(GET_USERS, json!({"filters": {"role": "patient"}, "limit": 1}));
        }

        if ["low stock", "low on stock", "running low", "reorder"]
            .iter()
            .any(|phrase| input_lower.contains(phrase))
            && offered(CHECK_INVENTORY)
        {
            return tool(CHECK_INVENTORY, json!({"filters": {"needsReorder": true}}));
        }

        if input_lower.contains("inventory") && offered(CHECK_INVENTORY) {
            return tool(CHECK_INVENTORY, json!({"filters": {}, "limit": 50}));
        }

        if input_lower.contains("prescription") && offered(GET_PRESCRIPTIONS) {
            let filters = ["pending", "ready", "filled"]
                .into_iter()
                .find(|status| input_lower.contains(status))
                .map(|status| json!({"status": status}))
                .unwrap_or_else(|| json!({}));
            return tool(GET_PRESCRIPTIONS, json!({"filters": filters}));
        }

        if (input_lower.contains("pharmacist") || input_lower.contains("staff"))
            && offered(GET_USERS)
        {
            return tool(GET_USERS, json!({"filters": {"role": "pharmacist"}}));
        }

        Scripted::Text(
            "I can look up prescriptions, patients and inventory, or notify a patient. \
             What would you like to do?"
                .to_string(),
        )
    }

    /// Decides the follow-up once the previous tool calls have results.
    fn follow_up(input: &str, messages: &[Message], tools: &[ToolDefinition]) -> LlmResponse {
        let results = latest_tool_results(messages);
        let input_lower = input.to_lowercase();
        let wants_notification = input_lower.contains("notify") || input_lower.contains("remind");
        let notified = messages
            .iter()
            .flat_map(|m| &m.tool_calls)
            .any(|call| call.name == NOTIFY_PATIENT);

        if wants_notification && !notified && tools.iter().any(|t| t.name == NOTIFY_PATIENT) {
            let patient = results.iter().find_map(|(name, value)| match value {
                Value::Array(rows) if name == GET_USERS => rows.first().cloned(),
                _ => None,
            });
            if let Some(patient) = patient {
                let name = patient
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("there");
                let message = format!(
                    "Hi {name}, this is MedEase pharmacy: your prescription is ready for pickup."
                );
                let arguments = json!({
                    "message": message,
                    "patient_info": patient,
                });
                return LlmResponse::with_tool_calls(
                    "",
                    vec![ToolCall::new(
                        next_call_id(messages),
                        NOTIFY_PATIENT,
                        arguments.to_string(),
                    )],
                );
            }
        }

        let lines: Vec<String> = results
            .iter()
            .map(|(name, value)| summarize(name, value))
            .collect();
        LlmResponse::text(lines.join("\n"))
    }
}

/// Returns the latest user message content.
fn extract_user_input(messages: &[Message]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

/// Pairs each trailing tool message with the name of the call it answers.
fn latest_tool_results(messages: &[Message]) -> Vec<(String, Value)> {
    let start = messages
        .iter()
        .rposition(|m| m.role != Role::Tool)
        .map_or(0, |i| i + 1);

    messages[start..]
        .iter()
        .map(|m| {
            let name = messages[..start]
                .iter()
                .flat_map(|a| &a.tool_calls)
                .find(|call| Some(&call.id) == m.tool_call_id.as_ref())
                .map(|call| call.name.clone())
                .unwrap_or_else(|| "tool".to_string());
            let value = serde_json::from_str(&m.content)
                .unwrap_or_else(|_| Value::String(m.content.clone()));
            (name, value)
        })
        .collect()
}

fn next_call_id(messages: &[Message]) -> String {
    let made: usize = messages.iter().map(|m| m.tool_calls.len()).sum();
    format!("mock_call_{}", made + 1)
}

fn summarize(name: &str, value: &Value) -> String {
    match value {
        Value::Array(rows) if rows.is_empty() => format!("{name}: no matching records."),
        Value::Array(rows) => {
            let labels: Vec<&str> = rows
                .iter()
                .filter_map(|row| {
                    ["name", "patientName", "id"]
                        .iter()
                        .find_map(|key| row.get(*key).and_then(Value::as_str))
                })
                .collect();
            format!(
                "{name}: found {} record(s): {}.",
                rows.len(),
                labels.join(", ")
            )
        }
        Value::Object(map) => match map.get("status").and_then(Value::as_str) {
            Some("SUCCESS") => format!("{name}: message sent."),
            Some(status) => format!(
                "{name}: {status}: {}",
                map.get("message").and_then(Value::as_str).unwrap_or("no details")
            ),
            None => format!("{name}: {value}"),
        },
        other => format!("{name}: {other}"),
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        if let Some(message) = &self.failure {
            return Err(MedeaseError::llm(message.clone()));
        }

        let input = extract_user_input(messages);

        if messages.last().is_some_and(|m| m.role == Role::Tool) {
            return Ok(Self::follow_up(&input, messages, tools));
        }

        Ok(match self.first_step(&input, tools) {
            Scripted::Text(text) => LlmResponse::text(text),
            Scripted::Tool { name, arguments } => LlmResponse::with_tool_calls(
                "",
                vec![ToolCall::new(next_call_id(messages), name, arguments.to_string())],
            ),
        })
    }
}
