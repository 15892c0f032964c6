//! HTTP handlers.
//!
//! Bodies are taken as raw bytes and decoded here, so every malformed
//! payload is a 400 regardless of content type.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Html;
use bytes::Bytes;
use meter_core::MetricPayload;
use serde::de::DeserializeOwned;

use crate::dispatcher::RequestDispatcher;
use crate::error::{DispatchError, DispatchResult};

fn decode<T: DeserializeOwned>(body: &[u8]) -> DispatchResult<T> {
    serde_json::from_slice(body).map_err(|e| DispatchError::Validation(format!("invalid JSON: {e}")))
}

// ── Updates ────────────────────────────────────────────────────

/// POST /update/{kind}/{name}/{value}
pub async fn update_by_path(
    State(dispatcher): State<RequestDispatcher>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> DispatchResult<StatusCode> {
    dispatcher.update_by_path(&kind, &name, &value).await?;
    Ok(StatusCode::OK)
}

/// POST /update
pub async fn update_by_body(
    State(dispatcher): State<RequestDispatcher>,
    body: Bytes,
) -> DispatchResult<Json<MetricPayload>> {
    let payload: MetricPayload = decode(&body)?;
    Ok(Json(dispatcher.update_by_body(payload).await?))
}

/// POST /updates
pub async fn batch_update(
    State(dispatcher): State<RequestDispatcher>,
    body: Bytes,
) -> DispatchResult<Json<Vec<MetricPayload>>> {
    let payloads: Vec<MetricPayload> = decode(&body)?;
    Ok(Json(dispatcher.batch_update(payloads).await?))
}

// ── Reads ──────────────────────────────────────────────────────

/// GET /value/{kind}/{name}
pub async fn get_by_path(
    State(dispatcher): State<RequestDispatcher>,
    Path((kind, name)): Path<(String, String)>,
) -> DispatchResult<String> {
    let value = dispatcher.get_by_path(&kind, &name).await?;
    Ok(value.to_string())
}

/// POST /value
pub async fn get_by_body(
    State(dispatcher): State<RequestDispatcher>,
    body: Bytes,
) -> DispatchResult<Json<MetricPayload>> {
    let query: MetricPayload = decode(&body)?;
    Ok(Json(dispatcher.get_by_body(query).await?))
}

/// GET /
pub async fn list_all(State(dispatcher): State<RequestDispatcher>) -> DispatchResult<Html<String>> {
    let listing = dispatcher.list_all().await?;
    Ok(meter_dashboard::metrics_page(&listing))
}

/// GET /ping
pub async fn ping(State(dispatcher): State<RequestDispatcher>) -> DispatchResult<StatusCode> {
    dispatcher.ping().await?;
    Ok(StatusCode::OK)
}
