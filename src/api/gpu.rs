use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    admission::{self, AdmissionError},
    error::TrackerError,
    memory::DeviceId,
    resources::{pod_requests_and_limits, Container},
};

use super::AppState;

#[derive(Deserialize)]
pub struct AddRequestBody {
    pub device_index: Option<usize>,
    pub device_id: Option<DeviceId>,
    pub amount: u64,
}

#[derive(Deserialize)]
pub struct AdmitBody {
    pub containers: Vec<Container>,
    #[serde(default)]
    pub init_containers: Vec<Container>,
}

fn error_response(status: StatusCode, message: String) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

fn rejection_response(rejection: JsonRejection) -> axum::response::Response {
    error_response(StatusCode::BAD_REQUEST, rejection.body_text())
}

fn tracker_status(e: &TrackerError) -> StatusCode {
    match e {
        TrackerError::Provider(_) => StatusCode::BAD_GATEWAY,
        TrackerError::DeviceSetChanged(_) => StatusCode::CONFLICT,
        TrackerError::IndexOutOfRange { .. } | TrackerError::UnknownDevice(_) => {
            StatusCode::BAD_REQUEST
        }
        TrackerError::Initialization(_) | TrackerError::InvalidStaticInfo(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn tracker_error(e: TrackerError) -> axum::response::Response {
    tracing::warn!("GPU query failed: {}", e);
    error_response(tracker_status(&e), e.to_string())
}

/// GET /api/gpu — availability as reported by the device monitor
pub async fn get_availability(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let tracker = state.tracker.clone();
    match tokio::task::spawn_blocking(move || tracker.availability()).await {
        Ok(Ok(devices)) => Json(serde_json::json!({
            "count": devices.len(),
            "devices": devices,
        }))
        .into_response(),
        Ok(Err(e)) => tracker_error(e),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/gpu/buffered — availability minus recent local reservations
pub async fn get_buffered_availability(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let tracker = state.tracker.clone();
    match tokio::task::spawn_blocking(move || tracker.buffered_availability()).await {
        Ok(Ok(devices)) => Json(serde_json::json!({
            "count": devices.len(),
            "devices": devices,
        }))
        .into_response(),
        Ok(Err(e)) => tracker_error(e),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// POST /api/gpu/requests — record a reservation by device index or id
pub async fn add_request(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AddRequestBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    let result = match (body.device_index, &body.device_id) {
        (Some(index), None) => state.tracker.add_request(index, body.amount),
        (None, Some(id)) => state.tracker.add_request_for(id, body.amount),
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "exactly one of device_index or device_id is required".into(),
            )
        }
    };

    match result {
        Ok(()) => Json(serde_json::json!({ "ok": true, "amount": body.amount })).into_response(),
        Err(e) => tracker_error(e),
    }
}

/// GET /api/gpu/requests — reservations currently held (not swept)
pub async fn list_pending(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let tracker = &state.tracker;
    let pending = tracker.pending_by_device();
    let devices: Vec<_> = tracker
        .devices()
        .iter()
        .zip(&pending)
        .enumerate()
        .map(|(index, (d, pending))| {
            serde_json::json!({
                "index": index,
                "id": d.id,
                "path": d.path,
                "pending": pending,
            })
        })
        .collect();

    Json(serde_json::json!({
        "window_secs": tracker.window().as_secs(),
        "pending_total": pending.iter().fold(0u64, |acc, p| acc.saturating_add(*p)),
        "devices": devices,
    }))
}

/// POST /api/gpu/admit — check a pod's per-GPU memory requests and reserve them
pub async fn admit(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AdmitBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };
    let (requests, _limits) = pod_requests_and_limits(&body.containers, &body.init_containers);
    let tracker = state.tracker.clone();
    let result = tokio::task::spawn_blocking(move || {
        admission::admit(&tracker, &requests).map(|placements| (placements, requests))
    })
    .await;

    match result {
        Ok(Ok((placements, requests))) => Json(serde_json::json!({
            "ok": true,
            "placements": placements,
            "requests": requests,
        }))
        .into_response(),
        Ok(Err(AdmissionError::Tracker(e))) => tracker_error(e),
        Ok(Err(e @ AdmissionError::UnknownDevicePath(_))) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Ok(Err(e @ AdmissionError::Insufficient { .. })) => {
            tracing::info!("Rejected workload: {}", e);
            error_response(StatusCode::CONFLICT, e.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
