//! Conversational pharmacy agent.
//!
//! A plain tool-calling loop: the model sees the system prompt and session
//! history, asks for tools, gets their results back, and stops once it
//! answers with text only or after `max_steps` round-trips.

mod tools;

pub use tools::{error_payload, Toolbox};

use async_stream::stream;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::MedeaseError;
use crate::llm::{build_messages, build_system_prompt, Conversation, LlmClient, Message};

/// A question for the agent, scoped to a user's session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub question: String,
    pub user_id: String,
    pub session_id: String,
}

/// One step of an agent run, streamed to the caller as it happens.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// The model asked for a tool.
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
    /// The tool's result, as fed back to the model.
    ToolResult {
        id: String,
        name: String,
        result: Value,
    },
    /// Text from the model; `final` marks the answer that ends the run.
    Message {
        content: String,
        #[serde(rename = "final")]
        is_final: bool,
    },
    /// The run stopped without an answer.
    Error { kind: String, message: String },
}

impl AgentEvent {
    fn from_error(error: &MedeaseError) -> Self {
        Self::Error {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

type SessionKey = (String, String);

#[derive(Debug, Clone)]
struct Session {
    conversation: Conversation,
    latest_action: Option<String>,
    last_used: u64,
}

/// In-memory sessions, evicting the least recently used past `capacity`.
#[derive(Debug, Default)]
struct SessionStore {
    sessions: HashMap<SessionKey, Session>,
    clock: u64,
}

impl SessionStore {
    fn get(&self, user_id: &str, session_id: &str) -> Option<&Session> {
        self.sessions
            .get(&(user_id.to_string(), session_id.to_string()))
    }

    /// Returns the session for `key`, creating it if needed and marking it used.
    fn touch(&mut self, key: &SessionKey, config: &AgentConfig) -> &mut Session {
        self.clock += 1;
        let capacity = config.max_sessions.max(1);
        if !self.sessions.contains_key(key) {
            while self.sessions.len() >= capacity {
                let Some(oldest) = self
                    .sessions
                    .iter()
                    .min_by_key(|(_, session)| session.last_used)
                    .map(|(key, _)| key.clone())
                else {
                    break;
                };
                debug!(user_id = %oldest.0, session_id = %oldest.1, "Evicting idle session");
                self.sessions.remove(&oldest);
            }
        }

        let clock = self.clock;
        let session = self.sessions.entry(key.clone()).or_insert_with(|| Session {
            conversation: Conversation::with_max_turns(config.max_turns),
            latest_action: None,
            last_used: clock,
        });
        session.last_used = clock;
        session
    }
}

/// The agent: an LLM, its toolbox, and in-memory sessions.
pub struct Agent {
    llm: Arc<dyn LlmClient>,
    toolbox: Arc<Toolbox>,
    system_prompt: String,
    config: AgentConfig,
    sessions: Mutex<SessionStore>,
}

impl Agent {
    pub fn new(llm: Arc<dyn LlmClient>, toolbox: Toolbox, config: AgentConfig) -> Self {
        let system_prompt = build_system_prompt(toolbox.catalog());
        Self {
            llm,
            toolbox: Arc::new(toolbox),
            system_prompt,
            config,
            sessions: Mutex::new(SessionStore::default()),
        }
    }

    /// Returns the last final answer given in a session.
    pub async fn latest_action(&self, user_id: &str, session_id: &str) -> Option<String> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(user_id, session_id)
            .and_then(|s| s.latest_action.clone())
    }

    /// Number of sessions currently held in memory.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.sessions.len()
    }

    /// Returns a copy of a session's history.
    pub async fn history(&self, user_id: &str, session_id: &str) -> Vec<Message> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(user_id, session_id)
            .map(|s| s.conversation.messages().to_vec())
            .unwrap_or_default()
    }

    /// Answers a question, yielding each tool call, tool result and message.
    ///
    /// The session lock is only held to load and store history. Concurrent
    /// runs on the same session each see the history as it was when they
    /// started; the last one to finish is kept.
    pub fn respond(self: Arc<Self>, request: AgentRequest) -> impl Stream<Item = AgentEvent> + Send + 'static {
        stream! {
            let key = (request.user_id.clone(), request.session_id.clone());
            let mut conversation = {
                let mut sessions = self.sessions.lock().await;
                sessions.touch(&key, &self.config).conversation.clone()
            };
            conversation.add_user(request.question.clone());

            let tools = self.toolbox.definitions();
            let mut answer = None;
            let mut failed = false;
            let mut steps = 0;

            while steps < self.config.max_steps {
                steps += 1;
                let messages = build_messages(&self.system_prompt, &conversation);

                let response = match self.llm.complete_with_tools(&messages, &tools).await {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(user_id = %request.user_id, step = steps, error = %e, "LLM request failed");
                        yield AgentEvent::from_error(&e);
                        failed = true;
                        break;
                    }
                };

                if !response.has_tool_calls() {
                    conversation.add_assistant(response.content.clone());
                    yield AgentEvent::Message {
                        content: response.content.clone(),
                        is_final: true,
                    };
                    answer = Some(response.content);
                    break;
                }

                if !response.content.is_empty() {
                    yield AgentEvent::Message {
                        content: response.content.clone(),
                        is_final: false,
                    };
                }

                conversation.add(Message::assistant_with_tool_calls(
                    response.content,
                    response.tool_calls.clone(),
                ));

                for call in response.tool_calls {
                    debug!(tool = %call.name, id = %call.id, "Agent tool call");
                    yield AgentEvent::ToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: serde_json::from_str(&call.arguments)
                            .unwrap_or_else(|_| Value::String(call.arguments.clone())),
                    };

                    let result = self.toolbox.dispatch(&call.name, &call.arguments).await;
                    conversation.add(Message::tool(call.id.clone(), result.to_string()));

                    yield AgentEvent::ToolResult {
                        id: call.id,
                        name: call.name,
                        result,
                    };
                }
            }

            if answer.is_none() && !failed {
                yield AgentEvent::Error {
                    kind: "max_steps".to_string(),
                    message: format!(
                        "Stopped after {} steps without a final answer",
                        self.config.max_steps
                    ),
                };
            }

            info!(
                user_id = %request.user_id,
                session_id = %request.session_id,
                steps,
                answered = answer.is_some(),
                "Agent run finished"
            );

            let mut sessions = self.sessions.lock().await;
            let session = sessions.touch(&key, &self.config);
            session.conversation = conversation;
            if answer.is_some() {
                session.latest_action = answer;
            }
        }
    }
}
