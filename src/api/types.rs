//! Shared API types
//!
//! Error responses and the request bodies shared by several routes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{MedeaseError, WarehouseErrorKind};

/// Standard API error response, rendered as `{error, code, message}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: String, message: String },
    NotFound { code: String, message: String },
    BadGateway { message: String },
    ServiceUnavailable { message: String },
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MedeaseError> for ApiError {
    fn from(error: MedeaseError) -> Self {
        match error {
            MedeaseError::Filter(e) => Self::bad_request("INVALID_FILTER", e.to_string()),
            MedeaseError::Query(message) => Self::bad_request("INVALID_QUERY", message),
            MedeaseError::Warehouse {
                kind: WarehouseErrorKind::Transient,
                message,
            } => {
                tracing::warn!(error = %message, "Warehouse unavailable");
                Self::ServiceUnavailable { message }
            }
            MedeaseError::Warehouse {
                kind: WarehouseErrorKind::Permanent,
                message,
            } => {
                tracing::error!(error = %message, "Warehouse rejected query");
                Self::BadGateway { message }
            }
            other => {
                tracing::error!(error = %other, category = other.category(), "Request failed");
                Self::Internal {
                    message: other.to_string(),
                }
            }
        }
    }
}

impl From<crate::error::FilterError> for ApiError {
    fn from(error: crate::error::FilterError) -> Self {
        MedeaseError::from(error).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_type, code, message) = match self {
            Self::BadRequest { code, message } => ("bad_request", code, message),
            Self::NotFound { code, message } => ("not_found", code, message),
            Self::BadGateway { message } => ("bad_gateway", "WAREHOUSE_ERROR".to_string(), message),
            Self::ServiceUnavailable { message } => (
                "service_unavailable",
                "WAREHOUSE_UNAVAILABLE".to_string(),
                message,
            ),
            Self::Internal { message } => ("internal_error", "INTERNAL".to_string(), message),
        };
        (
            status,
            Json(serde_json::json!({
                "error": error_type,
                "code": code,
                "message": message
            })),
        )
            .into_response()
    }
}

/// Body of `POST /api/{table}/query`.
#[derive(Debug, Default, Deserialize)]
pub struct TableQueryRequest {
    #[serde(default = "empty_object")]
    pub filters: Value,
    pub limit: Option<u32>,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// Query string of `GET /api/medicines`.
#[derive(Debug, Default, Deserialize)]
pub struct MedicineSearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FilterError;

    #[test]
    fn test_status_mapping() {
        let filter: ApiError = FilterError::InvalidLimit.into();
        assert_eq!(filter.status(), StatusCode::BAD_REQUEST);

        let transient: ApiError = MedeaseError::transient("timeout").into();
        assert_eq!(transient.status(), StatusCode::SERVICE_UNAVAILABLE);

        let permanent: ApiError = MedeaseError::permanent("Access Denied").into();
        assert_eq!(permanent.status(), StatusCode::BAD_GATEWAY);

        let other: ApiError = MedeaseError::sms("down").into();
        assert_eq!(other.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            ApiError::not_found("UNKNOWN_TABLE", "nope").status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_table_query_request_defaults() {
        let request: TableQueryRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.filters, serde_json::json!({}));
        assert_eq!(request.limit, None);
    }
}
