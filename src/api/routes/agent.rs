//! Agent endpoint streaming newline-delimited JSON events

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;

use crate::agent::{AgentEvent, AgentRequest};
use crate::api::types::ApiError;
use crate::api::AppState;

/// Runs the agent and streams one JSON event per line.
pub async fn respond(
    State(state): State<AppState>,
    Json(request): Json<AgentRequest>,
) -> Result<Response, ApiError> {
    if request.question.trim().is_empty() {
        return Err(ApiError::bad_request(
            "EMPTY_QUESTION",
            "question must not be empty",
        ));
    }

    tracing::info!(
        user_id = %request.user_id,
        session_id = %request.session_id,
        "Agent request"
    );

    let lines = state
        .agent
        .clone()
        .respond(request)
        .map(|event| Ok::<_, Infallible>(encode_event(&event)));

    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(lines),
    )
        .into_response())
}

fn encode_event(event: &AgentEvent) -> String {
    let mut line = serde_json::to_string(event).unwrap_or_else(|e| {
        serde_json::json!({"type": "error", "kind": "internal", "message": e.to_string()})
            .to_string()
    });
    line.push('\n');
    line
}
