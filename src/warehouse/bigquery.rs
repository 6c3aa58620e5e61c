//! BigQuery warehouse client.
//!
//! Talks to the BigQuery v2 REST API: `jobs.query` to start a query, then
//! `jobs.getQueryResults` until the job completes and every page is read.
//! Cells arrive as strings and are decoded by field type into raw values.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::Warehouse;
use crate::config::WarehouseConfig;
use crate::error::{MedeaseError, Result};
use crate::query::{normalize_value, CompiledQuery, QueryParameter, RawRow, RawValue};
use crate::schema::ColumnType;

/// OAuth scope for BigQuery.
const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

/// Maximum number of retry attempts for transient errors.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// How long a single `jobs.query` / `getQueryResults` call waits server-side.
const SERVER_WAIT_MS: u64 = 10_000;

/// Upper bound on polling a job that keeps reporting `jobComplete: false`.
const JOB_DEADLINE: Duration = Duration::from_secs(300);

/// Error reasons BigQuery reports for failures that may succeed on retry.
const TRANSIENT_REASONS: &[&str] = &[
    "backendError",
    "internalError",
    "rateLimitExceeded",
    "jobBackendError",
    "jobInternalError",
];

/// Where access tokens come from.
enum Credentials {
    /// A fixed token, e.g. from `gcloud auth print-access-token`.
    Static(String),
    /// Service-account key or application-default credentials.
    Provider(Arc<dyn TokenProvider>),
}

/// BigQuery REST client.
pub struct BigQueryClient {
    client: Client,
    credentials: Credentials,
    endpoint: String,
    project_id: String,
    location: Option<String>,
    job_deadline: Duration,
}

impl BigQueryClient {
    /// Creates a client from warehouse settings, resolving credentials.
    ///
    /// Precedence: explicit access token, then the service-account key file,
    /// then application-default credentials.
    pub async fn connect(config: &WarehouseConfig) -> Result<Self> {
        let credentials = if let Some(token) = &config.access_token {
            Credentials::Static(token.clone())
        } else if let Some(path) = &config.credentials_file {
            let account = CustomServiceAccount::from_file(path).map_err(|e| {
                MedeaseError::config(format!(
                    "Failed to load service account key {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Credentials::Provider(Arc::new(account))
        } else {
            let provider = gcp_auth::provider().await.map_err(|e| {
                MedeaseError::config(format!("No Google Cloud credentials found: {}", e))
            })?;
            Credentials::Provider(provider)
        };

        Self::new(config, credentials)
    }

    /// Creates a client that sends the given bearer token on every request.
    pub fn with_access_token(config: &WarehouseConfig, token: impl Into<String>) -> Result<Self> {
        Self::new(config, Credentials::Static(token.into()))
    }

    fn new(config: &WarehouseConfig, credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MedeaseError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            credentials,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            project_id: config.require_project()?.to_string(),
            location: config.location.clone(),
            job_deadline: JOB_DEADLINE,
        })
    }

    /// Overrides how long a query may wait for its job to complete.
    pub fn with_job_deadline(mut self, deadline: Duration) -> Self {
        self.job_deadline = deadline;
        self
    }

    async fn access_token(&self) -> Result<String> {
        match &self.credentials {
            Credentials::Static(token) => Ok(token.clone()),
            Credentials::Provider(provider) => provider
                .token(&[BIGQUERY_SCOPE])
                .await
                .map(|token| token.as_str().to_string())
                .map_err(|e| MedeaseError::transient(format!("Failed to obtain access token: {}", e))),
        }
    }

    /// Sends one request with retries for transient failures.
    async fn send_with_retry<F>(&self, build: F) -> Result<QueryResponse>
    where
        F: Fn(&Client, &str) -> reqwest::RequestBuilder,
    {
        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!(attempt, max = MAX_RETRY_ATTEMPTS, "BigQuery request");

            let error = match self.send_once(&build).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            let retryable = error.is_retryable();
            last_error = Some(error);
            if !retryable || attempt >= MAX_RETRY_ATTEMPTS {
                break;
            }

            warn!(
                "BigQuery request failed (attempt {}), retrying in {:?}",
                attempt, delay
            );
            tokio::time::sleep(delay).await;
            delay *= 2;
        }

        Err(last_error.unwrap_or_else(|| MedeaseError::internal("BigQuery request never ran")))
    }

    async fn send_once<F>(&self, build: &F) -> Result<QueryResponse>
    where
        F: Fn(&Client, &str) -> reqwest::RequestBuilder,
    {
        let token = self.access_token().await?;
        let response = build(&self.client, &token)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(request_error)?;

        if !status.is_success() {
            return Err(parse_error(status, &body));
        }

        let parsed: QueryResponse = serde_json::from_str(&body)
            .map_err(|e| MedeaseError::permanent(format!("Failed to parse BigQuery response: {}", e)))?;

        // Job-level entries here can be warnings; fatal job errors come back as HTTP errors.
        for e in parsed.errors.iter().flatten() {
            warn!(reason = %e.reason, "BigQuery reported: {}", e.message);
        }
        Ok(parsed)
    }

    /// Polls `getQueryResults` until the job completes, reading every page.
    async fn collect_rows(&self, job: &JobReference, mut response: QueryResponse) -> Result<Vec<RawRow>> {
        let mut schema = response.schema.take();
        let mut rows: Vec<RawRow> = Vec::new();

        loop {
            if response.job_complete {
                if schema.is_none() {
                    schema = response.schema.take();
                }
                if let Some(fields) = schema.as_ref().map(|s| s.fields.as_slice()) {
                    for row in response.rows.take().unwrap_or_default() {
                        rows.push(decode_row(fields, &row));
                    }
                }
                if response.page_token.is_none() {
                    break;
                }
            }

            let page_token = response.page_token.take();
            let results_url = format!(
                "{}/projects/{}/queries/{}",
                self.endpoint, job.project_id, job.job_id
            );
            let location = job.location.clone().or_else(|| self.location.clone());

            response = self
                .send_with_retry(|client, token| {
                    let mut params: Vec<(&str, String)> = vec![
                        ("timeoutMs", SERVER_WAIT_MS.to_string()),
                        ("formatOptions.useInt64Timestamp", "true".to_string()),
                    ];
                    if let Some(location) = &location {
                        params.push(("location", location.clone()));
                    }
                    if let Some(token) = &page_token {
                        params.push(("pageToken", token.clone()));
                    }
                    client.get(&results_url).bearer_auth(token).query(&params)
                })
                .await?;
        }

        Ok(rows)
    }

    fn start_request(&self, query: &CompiledQuery) -> QueryRequest {
        QueryRequest {
            query: query.sql.clone(),
            use_legacy_sql: false,
            parameter_mode: (!query.parameters.is_empty()).then_some("NAMED"),
            query_parameters: query.parameters.iter().map(ApiParameter::from).collect(),
            location: self.location.clone(),
            timeout_ms: SERVER_WAIT_MS,
            format_options: FormatOptions {
                use_int64_timestamp: true,
            },
        }
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    async fn query(&self, query: &CompiledQuery) -> Result<Vec<RawRow>> {
        let url = format!("{}/projects/{}/queries", self.endpoint, self.project_id);
        let request = self.start_request(query);

        let response = self
            .send_with_retry(|client, token| client.post(&url).bearer_auth(token).json(&request))
            .await?;

        let job = response.job_reference.clone().ok_or_else(|| {
            MedeaseError::permanent("BigQuery response did not include a job reference")
        })?;

        let rows = tokio::time::timeout(self.job_deadline, self.collect_rows(&job, response))
            .await
            .map_err(|_| {
                warn!(job_id = %job.job_id, "BigQuery job timed out");
                MedeaseError::transient(format!(
                    "BigQuery job {} did not complete within {:?}",
                    job.job_id, self.job_deadline
                ))
            })??;

        debug!(job_id = %job.job_id, rows = rows.len(), "BigQuery job finished");
        Ok(rows)
    }

    fn name(&self) -> &'static str {
        "bigquery"
    }
}

/// Maps a reqwest failure to a warehouse error.
fn request_error(e: reqwest::Error) -> MedeaseError {
    if e.is_timeout() {
        MedeaseError::transient("Request to BigQuery timed out")
    } else if e.is_connect() {
        MedeaseError::transient("Failed to connect to BigQuery. Check your network.")
    } else {
        MedeaseError::permanent(format!("BigQuery request failed: {}", e))
    }
}

/// Parses an error response into a classified warehouse error.
fn parse_error(status: StatusCode, body: &str) -> MedeaseError {
    let detail = serde_json::from_str::<ApiErrorResponse>(body).ok();
    let message = detail
        .as_ref()
        .map(|d| d.error.message.clone())
        .unwrap_or_else(|| format!("BigQuery API error ({}): {}", status, body));

    let reason_is_transient = detail
        .as_ref()
        .map(|d| has_transient_reason(&d.error.errors))
        .unwrap_or(false);

    if status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
        || reason_is_transient
    {
        MedeaseError::transient(message)
    } else {
        MedeaseError::permanent(message)
    }
}

fn has_transient_reason(errors: &[ErrorProto]) -> bool {
    errors
        .iter()
        .any(|e| TRANSIENT_REASONS.contains(&e.reason.as_str()))
}

fn parameter_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::String => "STRING",
        ColumnType::Integer => "INT64",
        ColumnType::Numeric => "NUMERIC",
        ColumnType::Date => "DATE",
        ColumnType::Timestamp => "TIMESTAMP",
        ColumnType::Boolean => "BOOL",
    }
}

fn decode_row(fields: &[FieldSchema], row: &ApiRow) -> RawRow {
    fields
        .iter()
        .zip(row.f.iter())
        .map(|(field, cell)| (field.name.clone(), decode_field(field, &cell.v)))
        .collect()
}

/// Decodes one cell, honouring REPEATED mode and RECORD nesting.
fn decode_field(field: &FieldSchema, value: &Value) -> RawValue {
    if field.mode.as_deref() == Some("REPEATED") {
        let items = match value {
            Value::Array(items) => items
                .iter()
                .map(|item| normalize_value(decode_scalar(field, item.get("v").unwrap_or(item))))
                .collect(),
            _ => Vec::new(),
        };
        return RawValue::Json(Value::Array(items));
    }
    decode_scalar(field, value)
}

fn decode_scalar(field: &FieldSchema, value: &Value) -> RawValue {
    if let Some(sub_fields) = field.fields.as_deref() {
        return decode_record(sub_fields, value);
    }

    let text = match value {
        Value::Null => return RawValue::Null,
        Value::String(s) => s.as_str(),
        other => return RawValue::Json(other.clone()),
    };

    let decoded = match ColumnType::parse(&field.field_type) {
        Some(ColumnType::String) => Some(RawValue::String(text.to_string())),
        Some(ColumnType::Integer) => text.parse::<i64>().ok().map(RawValue::Int),
        Some(ColumnType::Numeric) => Decimal::from_str(text)
            .or_else(|_| Decimal::from_scientific(text))
            .ok()
            .map(RawValue::Decimal),
        Some(ColumnType::Boolean) => match text {
            "true" => Some(RawValue::Bool(true)),
            "false" => Some(RawValue::Bool(false)),
            _ => None,
        },
        Some(ColumnType::Date) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .map(RawValue::Date),
        Some(ColumnType::Timestamp) => parse_timestamp(text).map(RawValue::Timestamp),
        // Warehouse types no filter column is declared with.
        None => match field.field_type.as_str() {
            "FLOAT" | "FLOAT64" => parse_float(text).map(RawValue::Float),
            "BYTES" => BASE64.decode(text).ok().map(RawValue::Bytes),
            "DATETIME" => NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
                .ok()
                .map(RawValue::DateTime),
            "TIME" => NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
                .ok()
                .map(RawValue::Time),
            "JSON" => serde_json::from_str(text).ok().map(RawValue::Json),
            _ => None,
        },
    };

    decoded.unwrap_or_else(|| RawValue::String(text.to_string()))
}

fn decode_record(fields: &[FieldSchema], value: &Value) -> RawValue {
    let cells = match value.get("f").and_then(Value::as_array) {
        Some(cells) => cells,
        None if value.is_null() => return RawValue::Null,
        None => return RawValue::Json(value.clone()),
    };

    let object = fields
        .iter()
        .zip(cells.iter())
        .map(|(field, cell)| {
            let v = cell.get("v").unwrap_or(&Value::Null);
            (field.name.clone(), normalize_value(decode_field(field, v)))
        })
        .collect();
    RawValue::Json(Value::Object(object))
}

/// With `useInt64Timestamp`, timestamps are microseconds since the epoch.
fn parse_timestamp(text: &str) -> Option<DateTime<chrono::Utc>> {
    if let Ok(micros) = text.parse::<i64>() {
        return DateTime::from_timestamp_micros(micros);
    }
    // Older responses use float seconds.
    let seconds = text.parse::<f64>().ok()?;
    DateTime::from_timestamp_micros((seconds * 1_000_000.0).round() as i64)
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => text.parse().ok(),
    }
}

// BigQuery API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    query: String,
    use_legacy_sql: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameter_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    query_parameters: Vec<ApiParameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    timeout_ms: u64,
    format_options: FormatOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FormatOptions {
    use_int64_timestamp: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiParameter {
    name: String,
    parameter_type: ApiParameterType,
    parameter_value: ApiParameterValue,
}

#[derive(Debug, Serialize)]
struct ApiParameterType {
    #[serde(rename = "type")]
    type_name: &'static str,
}

#[derive(Debug, Serialize)]
struct ApiParameterValue {
    value: String,
}

impl From<&QueryParameter> for ApiParameter {
    fn from(p: &QueryParameter) -> Self {
        Self {
            name: p.name.clone(),
            parameter_type: ApiParameterType {
                type_name: parameter_type(p.column_type()),
            },
            parameter_value: ApiParameterValue {
                value: p.value.to_parameter_value(),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<TableSchemaResponse>,
    rows: Option<Vec<ApiRow>>,
    page_token: Option<String>,
    errors: Option<Vec<ErrorProto>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableSchemaResponse {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    mode: Option<String>,
    fields: Option<Vec<FieldSchema>>,
}

#[derive(Debug, Deserialize)]
struct ApiRow {
    #[serde(default)]
    f: Vec<ApiCell>,
}

#[derive(Debug, Deserialize)]
struct ApiCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}
