//! HTTP API tests.
//!
//! Drives the router in-process with the mock warehouse, SMS gateway and
//! LLM, so no network or credentials are needed.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use medease::agent::{Agent, Toolbox};
use medease::api::{router, AppState};
use medease::config::{AgentConfig, TableNames};
use medease::error::WarehouseErrorKind;
use medease::llm::MockLlmClient;
use medease::query::RawValue;
use medease::sms::MockSmsGateway;
use medease::warehouse::{MockWarehouse, TableCatalog, Warehouse};

struct TestApp {
    router: Router,
    sms: Arc<MockSmsGateway>,
}

fn catalog() -> TableCatalog {
    TableCatalog::new("medease-local", "MedEase", &TableNames::default()).unwrap()
}

fn app_with(warehouse: Arc<dyn Warehouse>) -> TestApp {
    let catalog = catalog();
    let sms = Arc::new(MockSmsGateway::new());
    let toolbox = Toolbox::new(warehouse.clone(), catalog.clone(), sms.clone(), 50);
    let agent = Agent::new(
        Arc::new(MockLlmClient::new()),
        toolbox,
        AgentConfig::default(),
    );

    let state = AppState {
        warehouse,
        catalog: Arc::new(catalog),
        agent: Arc::new(agent),
        default_limit: 50,
    };
    TestApp {
        router: router(state),
        sms,
    }
}

fn app() -> TestApp {
    app_with(Arc::new(MockWarehouse::with_sample_data(&catalog())))
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (status, body) = send(router, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, request).await
}

async fn post_json(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let (status, body) = post(router, uri, body).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn names(rows: &Value) -> Vec<&str> {
    rows.as_array()
        .unwrap()
        .iter()
        .map(|row| row["name"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = get(&app.router, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["warehouse"], "mock");
}

#[tokio::test]
async fn test_pharmacy_home_totals() {
    let app = app();
    let (status, body) = get(&app.router, "/api/pharmacy/home").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"total_medicines": 173, "low_stock_items": 2}));
}

#[tokio::test]
async fn test_list_medicines_ordered_by_name() {
    let app = app();
    let (status, body) = get(&app.router, "/api/medicines").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        names(&body),
        vec!["Amoxicillin", "Atorvastatin", "Lisinopril", "Metformin"]
    );
    assert_eq!(
        body[0].as_object().unwrap().keys().collect::<Vec<_>>(),
        vec!["id", "name", "currentStock", "expirationDate", "costPerUnit", "location"]
    );
}

#[tokio::test]
async fn test_search_medicines_is_case_insensitive() {
    let app = app();
    let (status, body) = get(&app.router, "/api/medicines?q=MOX").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&body), vec!["Amoxicillin"]);

    let (_, body) = get(&app.router, "/api/medicines?limit=2").await;
    assert_eq!(names(&body), vec!["Amoxicillin", "Atorvastatin"]);

    let (status, body) = get(&app.router, "/api/medicines?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_LIMIT");
}

#[tokio::test]
async fn test_get_medicine() {
    let app = app();
    let (status, body) = get(&app.router, "/api/medicines/med-002").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Lisinopril");
    assert_eq!(body["costPerUnit"], json!(0.12));
    assert_eq!(body["expirationDate"], "2025-12-31");
    assert_eq!(body["needsReorder"], true);

    let (status, body) = get(&app.router, "/api/medicines/med-999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["code"], "MEDICINE_NOT_FOUND");
}

#[tokio::test]
async fn test_medicine_prescriptions() {
    let app = app();
    let (status, body) = get(&app.router, "/api/medicines/med-002/prescriptions").await;

    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], "rx-1002");
    assert_eq!(rows[0]["status"], "pending");
    assert_eq!(rows[0]["dateFilled"], Value::Null);

    let (status, _) = get(&app.router, "/api/medicines/med-999/prescriptions").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unnamed_medicine_has_no_prescriptions() {
    let cell = |column: &str, value: RawValue| (column.to_string(), value);
    let warehouse = Arc::new(
        MockWarehouse::new()
            .with_table(
                "Inventory",
                vec![vec![cell("id", "med-900".into()), cell("name", RawValue::Null)]],
            )
            .with_table(
                "Prescriptions",
                vec![vec![
                    cell("id", "rx-9001".into()),
                    cell("medication", RawValue::Null),
                    cell("dateCreated", RawValue::Null),
                ]],
            ),
    );
    let app = app_with(warehouse.clone());

    let (status, body) = get(&app.router, "/api/medicines/med-900/prescriptions").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
    assert_eq!(warehouse.executed().len(), 1);
}

#[tokio::test]
async fn test_table_query_returns_sql_parameters_and_rows() {
    let app = app();
    let (status, body) = post_json(
        &app.router,
        "/api/inventory/query",
        json!({"filters": {"needsReorder": true}, "limit": 10}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["table"], "inventory");
    assert_eq!(
        body["sql"],
        "SELECT * FROM `medease-local.MedEase.Inventory` WHERE needsReorder = @p0 LIMIT 10"
    );
    assert_eq!(
        body["parameters"],
        json!([{"name": "p0", "type": "BOOLEAN", "value": "true"}])
    );
    assert_eq!(names(&body["rows"]), vec!["Lisinopril", "Metformin"]);
}

#[tokio::test]
async fn test_table_query_without_filters_uses_default_limit() {
    let app = app();
    let (status, body) = post_json(&app.router, "/api/users/query", json!({})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["sql"],
        "SELECT * FROM `medease-local.MedEase.Users` LIMIT 50"
    );
    assert_eq!(body["rows"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_table_query_rejections() {
    let app = app();

    let (status, body) = post_json(&app.router, "/api/orders/query", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "UNKNOWN_TABLE");

    let (status, body) = post_json(
        &app.router,
        "/api/inventory/query",
        json!({"filters": {"price": 3}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
    assert_eq!(body["code"], "INVALID_FILTER");

    let (status, body) = post_json(
        &app.router,
        "/api/prescriptions/query",
        json!({"filters": ["status", "pending"]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_FILTER");

    let (status, _) = post_json(
        &app.router,
        "/api/inventory/query",
        json!({"filters": {}, "limit": 0}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_warehouse_failures_map_to_gateway_statuses() {
    let transient = app_with(Arc::new(
        MockWarehouse::new().failing(WarehouseErrorKind::Transient, "backend timeout"),
    ));
    let (status, body) = get(&transient.router, "/api/pharmacy/home").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "WAREHOUSE_UNAVAILABLE");

    let permanent = app_with(Arc::new(
        MockWarehouse::new().failing(WarehouseErrorKind::Permanent, "Access Denied"),
    ));
    let (status, body) = get(&permanent.router, "/api/medicines").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "WAREHOUSE_ERROR");
    assert_eq!(body["message"], "Access Denied");
}

fn events(body: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(body)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_agent_streams_tool_calls_and_answer() {
    let app = app();
    let (status, body) = post(
        &app.router,
        "/agent/respond",
        json!({
            "question": "Which prescriptions are pending?",
            "user_id": "pharm-7",
            "session_id": "morning"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let events = events(&body);
    let kinds: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
    assert_eq!(kinds, vec!["tool_call", "tool_result", "message"]);

    assert_eq!(events[0]["name"], "get_prescriptions");
    assert_eq!(events[0]["arguments"], json!({"filters": {"status": "pending"}}));
    assert_eq!(events[1]["id"], events[0]["id"]);
    assert_eq!(events[1]["result"][0]["id"], "rx-1002");
    assert_eq!(events[2]["final"], true);
    assert_eq!(
        events[2]["content"],
        "get_prescriptions: found 1 record(s): Marcus Chen."
    );
}

#[tokio::test]
async fn test_agent_notifies_patient() {
    let app = app();
    let (status, body) = post(
        &app.router,
        "/agent/respond",
        json!({
            "question": "Remind the patient about their pickup",
            "user_id": "pharm-7",
            "session_id": "afternoon"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let events = events(&body);
    let calls: Vec<&str> = events
        .iter()
        .filter(|e| e["type"] == "tool_call")
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(calls, vec!["get_users", "notify_patient"]);

    let last = events.last().unwrap();
    assert_eq!(last["content"], "notify_patient: message sent.");

    let sent = app.sms.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "+15552010001");
    assert!(sent[0].body.starts_with("Hi Alice Rivera"));
}

#[tokio::test]
async fn test_agent_rejects_empty_question() {
    let app = app();
    let (status, body) = post(
        &app.router,
        "/agent/respond",
        json!({"question": "   ", "user_id": "u", "session_id": "s"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["code"], "EMPTY_QUESTION");
}
