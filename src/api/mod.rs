use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::tracker::GpuAvailabilityTracker;

pub mod gpu;

#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<GpuAvailabilityTracker>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/gpu", get(gpu::get_availability))
        .route("/api/gpu/buffered", get(gpu::get_buffered_availability))
        .route("/api/gpu/requests", get(gpu::list_pending).post(gpu::add_request))
        .route("/api/gpu/admit", post(gpu::admit))
        .with_state(state)
}
