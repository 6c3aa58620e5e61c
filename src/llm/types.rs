//! Chat messages, tool calls and per-session history for the agent.

use serde::{Deserialize, Serialize};

/// A function call the model wants the agent to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Echoed back on the tool message that answers it.
    pub id: String,
    pub name: String,
    /// Raw JSON text; parsed by the toolbox, not here.
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// One completion: text, tool calls, or both.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    /// Often empty when the model only asks for tools.
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
        }
    }

    /// A response without tool calls ends the agent run.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Chat-completions message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// A tool result fed back to the model.
    Tool,
}

impl Role {
    /// Wire name used by the chat-completions API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// One entry of the chat history sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Set only on assistant messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set only on tool messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Creates the assistant message that requested `tool_calls`.
    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, content)
        }
    }

    /// Creates a tool result message answering the call `tool_call_id`.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }
}

/// Session history.
///
/// Keeps at most `max_turns` user turns; a turn is a user message plus
/// every assistant and tool message that follows it.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    max_turns: usize,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// Empty history with the default limit of 20 turns.
    pub fn new() -> Self {
        Self::with_max_turns(20)
    }

    /// A limit of 0 is treated as 1.
    pub fn with_max_turns(max_turns: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_turns: max_turns.max(1),
        }
    }

    /// Appends a message, dropping the oldest turns past the limit.
    pub fn add(&mut self, message: Message) {
        self.messages.push(message);
        self.trim_to_limit();
    }

    pub fn add_user(&mut self, content: impl Into<String>) {
        self.add(Message::user(content));
    }

    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.add(Message::assistant(content));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of user messages kept.
    pub fn turns(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }

    /// Drops the oldest turns until at most `max_turns` remain.
    fn trim_to_limit(&mut self) {
        let mut excess = self.turns().saturating_sub(self.max_turns);
        if excess == 0 {
            return;
        }

        // Cut just before the user message that starts the first kept turn.
        let cut = self
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == Role::User)
            .find_map(|(i, _)| {
                if excess == 0 {
                    Some(i)
                } else {
                    excess -= 1;
                    None
                }
            })
            .unwrap_or(self.messages.len());

        self.messages.drain(..cut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_as_str() {
        assert_eq!(Role::System.as_str(), "system");
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.as_str(), "assistant");
        assert_eq!(Role::Tool.as_str(), "tool");
    }

    #[test]
    fn test_message_constructors() {
        let user = Message::user("Is Lisinopril in stock?");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.content, "Is Lisinopril in stock?");
        assert!(user.tool_calls.is_empty());

        let call = ToolCall::new("call_1", "check_inventory", "{}");
        let assistant = Message::assistant_with_tool_calls("", vec![call.clone()]);
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(assistant.tool_calls, vec![call]);

        let tool = Message::tool("call_1", "[]");
        assert_eq!(tool.role, Role::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_message_serialization_skips_empty_tool_fields() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn test_llm_response_helpers() {
        assert!(!LlmResponse::text("done").has_tool_calls());
        let response =
            LlmResponse::with_tool_calls("", vec![ToolCall::new("1", "get_users", "{}")]);
        assert!(response.has_tool_calls());
    }

    #[test]
    fn test_conversation_keeps_recent_turns() {
        let mut conversation = Conversation::with_max_turns(2);

        conversation.add_user("first");
        conversation.add(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new("1", "check_inventory", "{}")],
        ));
        conversation.add(Message::tool("1", "[]"));
        conversation.add_assistant("answer one");
        conversation.add_user("second");
        conversation.add_assistant("answer two");
        assert_eq!(conversation.turns(), 2);
        assert_eq!(conversation.len(), 6);

        conversation.add_user("third");
        assert_eq!(conversation.turns(), 2);
        assert_eq!(conversation.messages()[0].content, "second");
        assert_eq!(conversation.len(), 3);
    }

    #[test]
    fn test_conversation_zero_limit_keeps_one_turn() {
        let mut conversation = Conversation::with_max_turns(0);
        conversation.add_user("a");
        conversation.add_user("b");
        assert_eq!(conversation.messages().len(), 1);
        assert_eq!(conversation.messages()[0].content, "b");
    }
}
