//! HTTP request handlers.

use super::error::{ApiError, StatusBody};
use super::AppState;
use crate::db::Target;
use crate::metrics::{
    availability_table, latency_series, status_histogram, Availability, LatencySeries,
    StatusHistogram,
};
use crate::tsdb::query::{build_query, Aggregation, Field, Window};
use crate::tsdb::QueryRecords;

use axum::{
    body::Bytes,
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;

// ============================================================================
// API: Targets
// ============================================================================

/// Interval as sent by the dashboard form (a string) or by API clients
/// (a number).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IntervalValue {
    Number(i64),
    Text(String),
}

impl IntervalValue {
    fn seconds(&self) -> Option<u64> {
        let secs = match self {
            IntervalValue::Number(n) => *n,
            IntervalValue::Text(s) => s.trim().parse().ok()?,
        };
        u64::try_from(secs).ok().filter(|s| *s > 0)
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterTargetRequest {
    pub url: String,
    pub collectioninterval: IntervalValue,
}

impl RegisterTargetRequest {
    fn into_target(self) -> Result<Target, ApiError> {
        let url = parse_target_url(self.url.trim())?;

        let interval = self.collectioninterval.seconds().ok_or_else(|| {
            ApiError::InvalidTarget("collection interval must be a whole number of seconds > 0".to_string())
        })?;

        Ok(Target::new(url, interval))
    }
}

/// Accept absolute http(s) URLs with a host and return their normalized form.
/// Control characters are refused outright because the URL parser would
/// silently drop tabs and newlines.
fn parse_target_url(raw: &str) -> Result<String, ApiError> {
    let invalid = |reason: &str| ApiError::InvalidTarget(format!("url {:?} {}", raw, reason));

    if raw.chars().any(char::is_control) {
        return Err(invalid("contains control characters"));
    }

    let url = reqwest::Url::parse(raw).map_err(|e| invalid(&format!("is not valid: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("must use http:// or https://"));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("has no host"));
    }

    Ok(url.into())
}

pub async fn handle_register_target(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<StatusBody>, ApiError> {
    let req: RegisterTargetRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::InvalidTarget(format!("malformed body: {}", e)))?;
    let target = req.into_target()?;

    let id = state.scheduler.register(target.clone()).await?;
    if let Err(e) = state.registry.insert_target(&target) {
        state.scheduler.stop(id).await;
        return Err(e.into());
    }

    Ok(Json(StatusBody::success("Target successfully added")))
}

// ============================================================================
// API: Metrics
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    #[serde(default)]
    pub duration: Option<String>,
}

async fn fetch_records(
    state: &AppState,
    field: Field,
    aggregation: Option<Aggregation>,
    duration: Option<&str>,
) -> Result<QueryRecords, ApiError> {
    let window = Window::parse(duration)?;
    let query = build_query(&state.config.tsdb.bucket, field, &window, aggregation);
    Ok(state.tsdb.query(&query).await?)
}

pub async fn handle_latency(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<LatencySeries>, ApiError> {
    let records = fetch_records(&state, Field::ResponseTime, None, query.duration.as_deref()).await?;
    Ok(Json(latency_series(records)))
}

pub async fn handle_availability(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Vec<Availability>>, ApiError> {
    let records = fetch_records(
        &state,
        Field::Status,
        Some(Aggregation::Mean),
        query.duration.as_deref(),
    )
    .await?;
    Ok(Json(availability_table(records)))
}

pub async fn handle_http_status(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<StatusHistogram>, ApiError> {
    let records = fetch_records(&state, Field::StatusCode, None, query.duration.as_deref()).await?;
    Ok(Json(status_histogram(records)))
}
