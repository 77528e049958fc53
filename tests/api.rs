use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use std::sync::Arc;
use tower::ServiceExt;

use gpu_availability::api::{build_router, AppState};
use gpu_availability::memory::fixed::{parse_device_list, FixedProvider};
use gpu_availability::GpuAvailabilityTracker;

fn app() -> (Arc<FixedProvider>, Router) {
    let devices =
        parse_device_list("GPU-a:Tesla T4:/dev/nvidia0:1000;GPU-b:Tesla T4:/dev/nvidia1:2000")
            .unwrap();
    let provider = Arc::new(FixedProvider::new(devices));
    let tracker = GpuAvailabilityTracker::new(provider.clone()).unwrap();
    let state = Arc::new(AppState {
        tracker: Arc::new(tracker),
    });
    (provider, build_router(state))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn raw_and_buffered_availability() {
    let (_, app) = app();

    let (status, body) = send(&app, post("/api/gpu/requests", serde_json::json!({
        "device_index": 1,
        "amount": 500,
    })))
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (status, raw) = send(&app, get("/api/gpu")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(raw["count"], 2);
    assert_eq!(raw["devices"][1]["available_memory"], 2000);

    let (_, buffered) = send(&app, get("/api/gpu/buffered")).await;
    assert_eq!(buffered["devices"][0]["available_memory"], 1000);
    assert_eq!(buffered["devices"][1]["available_memory"], 1500);
    assert_eq!(buffered["devices"][1]["id"], "GPU-b");
}

#[tokio::test]
async fn request_by_id_and_listing() {
    let (_, app) = app();
    let (status, _) = send(&app, post("/api/gpu/requests", serde_json::json!({
        "device_id": "GPU-a",
        "amount": 42,
    })))
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, pending) = send(&app, get("/api/gpu/requests")).await;
    assert_eq!(pending["pending_total"], 42);
    assert_eq!(pending["window_secs"], 10);
    assert_eq!(pending["devices"][0]["pending"], 42);
    assert_eq!(pending["devices"][1]["pending"], 0);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let (_, app) = app();

    let (status, body) = send(&app, post("/api/gpu/requests", serde_json::json!({
        "device_index": 2,
        "amount": 1,
    })))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("out of range"));

    let (status, _) = send(&app, post("/api/gpu/requests", serde_json::json!({
        "device_id": "GPU-z",
        "amount": 1,
    })))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, post("/api/gpu/requests", serde_json::json!({ "amount": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_bodies_get_json_errors() {
    let (_, app) = app();

    for body in [
        serde_json::json!({ "device_index": -1, "amount": 1 }),
        serde_json::json!({ "device_index": 0, "amount": -5 }),
    ] {
        let (status, resp) = send(&app, post("/api/gpu/requests", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(resp["error"].is_string());
    }

    let (status, resp) = send(&app, post("/api/gpu/admit", serde_json::json!({ "pods": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(resp["error"].is_string());

    let (_, pending) = send(&app, get("/api/gpu/requests")).await;
    assert_eq!(pending["pending_total"], 0);
}

#[tokio::test]
async fn provider_failure_maps_to_bad_gateway() {
    let (provider, app) = app();
    provider.fail_with("connection refused");

    let (status, body) = send(&app, get("/api/gpu/buffered")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn admit_reserves_then_rejects_when_full() {
    let (_, app) = app();
    let workload = serde_json::json!({
        "containers": [
            { "name": "trainer", "resources": { "requests": { "/dev/nvidia0": 600, "cpu": 1000 } } },
        ],
        "init_containers": [
            { "name": "fetch", "resources": { "requests": { "cpu": 250 } } },
        ],
    });

    let (status, body) = send(&app, post("/api/gpu/admit", workload.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["placements"][0]["device_id"], "GPU-a");
    assert_eq!(body["placements"][0]["amount"], 600);
    assert_eq!(body["requests"]["cpu"], 1000);

    let (status, _) = send(&app, post("/api/gpu/admit", workload)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, buffered) = send(&app, get("/api/gpu/buffered")).await;
    assert_eq!(buffered["devices"][0]["available_memory"], 400);
}
