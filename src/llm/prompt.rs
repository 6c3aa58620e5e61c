//! Prompt construction for LLM requests.
//!
//! Builds the pharmacy assistant's system prompt with the table catalog.

use crate::llm::types::{Conversation, Message};
use crate::schema::Table;
use crate::warehouse::TableCatalog;

/// System prompt template for the pharmacy assistant.
const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are a pharmacy AI assistant for MedEase. Your tasks:

1. Monitor prescriptions: identify pending or ready-for-pickup prescriptions.
2. Manage users: look up patient or staff details (role, name, contact information).
3. Contact patients: send reminders for pickups or refills.
4. Monitor inventory: alert staff about low stock or expiring medications.

TABLES:
{tables}

INSTRUCTIONS:
- Use get_prescriptions, get_users and check_inventory with column names from the tool descriptions
- Look up a patient with get_users before calling notify_patient, and pass the whole row as patient_info
- Keep text messages to patients short and do not include other patients' data
- A tool result with "status": "ERROR" or "FAILED" did not succeed; say so instead of guessing
- Respond in clear action steps and summarize what each tool returned"#;

/// Builds the system prompt with the catalog's table references injected.
pub fn build_system_prompt(catalog: &TableCatalog) -> String {
    let tables = Table::ALL
        .iter()
        .map(|table| format!("- {}: {}", table.as_str(), catalog.get(*table)))
        .collect::<Vec<_>>()
        .join("\n");
    SYSTEM_PROMPT_TEMPLATE.replace("{tables}", &tables)
}

/// Builds the complete message list for an LLM request.
///
/// Combines the system prompt with the conversation history.
pub fn build_messages(system_prompt: &str, conversation: &Conversation) -> Vec<Message> {
    let mut messages = Vec::with_capacity(conversation.len() + 1);
    messages.push(Message::system(system_prompt));
    messages.extend(conversation.messages().iter().cloned());
    messages
}
