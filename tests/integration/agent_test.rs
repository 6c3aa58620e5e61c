//! Agent loop tests against the mock LLM.

use std::sync::Arc;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;

use medease::agent::{Agent, AgentEvent, AgentRequest, Toolbox};
use medease::config::{AgentConfig, TableNames};
use medease::llm::{MockLlmClient, Role};
use medease::sms::MockSmsGateway;
use medease::warehouse::{MockWarehouse, TableCatalog};

fn agent(llm: MockLlmClient, config: AgentConfig) -> Arc<Agent> {
    let catalog = TableCatalog::new("medease-local", "MedEase", &TableNames::default()).unwrap();
    let warehouse = Arc::new(MockWarehouse::with_sample_data(&catalog));
    let toolbox = Toolbox::new(warehouse, catalog, Arc::new(MockSmsGateway::new()), 50);
    Arc::new(Agent::new(Arc::new(llm), toolbox, config))
}

fn ask(question: &str, session_id: &str) -> AgentRequest {
    AgentRequest {
        question: question.to_string(),
        user_id: "pharm-7".to_string(),
        session_id: session_id.to_string(),
    }
}

async fn run(agent: &Arc<Agent>, request: AgentRequest) -> Vec<AgentEvent> {
    agent.clone().respond(request).collect().await
}

#[tokio::test]
async fn test_low_stock_question() {
    let agent = agent(MockLlmClient::new(), AgentConfig::default());
    let events = run(&agent, ask("What needs a reorder?", "s1")).await;

    assert_eq!(events.len(), 3);
    match &events[0] {
        AgentEvent::ToolCall { name, arguments, .. } => {
            assert_eq!(name, "check_inventory");
            assert_eq!(arguments, &json!({"filters": {"needsReorder": true}}));
        }
        other => panic!("expected a tool call, got {other:?}"),
    }
    assert_eq!(
        events[2],
        AgentEvent::Message {
            content: "check_inventory: found 2 record(s): Lisinopril, Metformin.".to_string(),
            is_final: true,
        }
    );
}

#[tokio::test]
async fn test_session_history_carries_between_questions() {
    let agent = agent(MockLlmClient::new(), AgentConfig::default());

    run(&agent, ask("Show the inventory", "s1")).await;
    run(&agent, ask("Hello", "s1")).await;

    let history = agent.history("pharm-7", "s1").await;
    let questions: Vec<&str> = history
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(questions, vec!["Show the inventory", "Hello"]);
    assert!(history.iter().any(|m| m.role == Role::Tool));

    let latest = agent.latest_action("pharm-7", "s1").await.unwrap();
    assert!(latest.starts_with("I can look up prescriptions"));

    assert!(agent.history("pharm-7", "s2").await.is_empty());
    assert_eq!(agent.latest_action("someone-else", "s1").await, None);
}

#[tokio::test]
async fn test_llm_failure_ends_run_with_error_event() {
    let agent = agent(MockLlmClient::failing("quota exceeded"), AgentConfig::default());
    let events = run(&agent, ask("Which prescriptions are ready?", "s1")).await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        AgentEvent::Error { kind, message } => {
            assert_eq!(kind, "llm");
            assert!(message.contains("quota exceeded"));
        }
        other => panic!("expected an error, got {other:?}"),
    }
    assert_eq!(agent.latest_action("pharm-7", "s1").await, None);
}

#[tokio::test]
async fn test_step_limit_stops_the_run() {
    let config = AgentConfig {
        max_steps: 1,
        ..AgentConfig::default()
    };
    let agent = agent(MockLlmClient::new(), config);
    let events = run(&agent, ask("Which prescriptions are filled?", "s1")).await;

    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            AgentEvent::ToolCall { .. } => "tool_call",
            AgentEvent::ToolResult { .. } => "tool_result",
            AgentEvent::Message { .. } => "message",
            AgentEvent::Error { .. } => "error",
        })
        .collect();
    assert_eq!(kinds, vec!["tool_call", "tool_result", "error"]);
    assert!(matches!(
        events.last(),
        Some(AgentEvent::Error { kind, .. }) if kind == "max_steps"
    ));
}

#[tokio::test]
async fn test_tool_errors_are_reported_to_the_model() {
    let llm = MockLlmClient::new().with_tool_call(
        "drop",
        "query_warehouse",
        json!({"sql": "DROP TABLE `medease-local.MedEase.Inventory`"}),
    );
    let agent = agent(llm, AgentConfig::default());
    let events = run(&agent, ask("drop the inventory table", "s1")).await;

    let result = events
        .iter()
        .find_map(|e| match e {
            AgentEvent::ToolResult { result, .. } => Some(result.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(result["status"], "ERROR");
    assert_eq!(result["kind"], "query");
    assert_eq!(result["retryable"], false);

    match events.last() {
        Some(AgentEvent::Message { content, is_final }) => {
            assert!(is_final);
            assert!(content.starts_with("query_warehouse: ERROR:"));
        }
        other => panic!("expected a final message, got {other:?}"),
    }
}
