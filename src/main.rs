use anyhow::{Context, Result};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gpu_availability::{
    api::{self, AppState},
    config::Config,
    memory, GpuAvailabilityTracker,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gpu_availability=debug,server=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("=== GPU availability tracker starting ===");

    let config = Config::from_env();

    // Provider + tracker (static info capture blocks on the monitor)
    let tracker = tokio::task::spawn_blocking({
        let config = config.clone();
        move || -> Result<GpuAvailabilityTracker> {
            let provider = memory::detect_provider(&config).context("no GPU provider")?;
            let tracker = GpuAvailabilityTracker::with_config(provider, &config.tracker)?;
            Ok(tracker)
        }
    })
    .await??;

    for (i, d) in tracker.devices().iter().enumerate() {
        tracing::info!(
            "GPU {}: {} {} at {} ({} MiB)",
            i,
            d.id,
            d.name,
            d.path,
            d.total_memory / (1024 * 1024)
        );
    }

    let state = Arc::new(AppState {
        tracker: Arc::new(tracker),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = api::build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
