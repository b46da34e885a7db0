use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use predict_gateway::app_state::AppState;
use predict_gateway::config::AppConfig;
use predict_gateway::routes;
use predict_gateway::services::reconciler;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing predict-gateway server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_metrics();

    let state = AppState::from_config(&config)
        .await
        .expect("Failed to initialize application state");

    // An in-memory store is invisible to the standalone reconciler, so sweep here.
    if config.database_url.is_none() {
        let store = state.store.clone();
        let artifacts = state.artifacts.clone();
        let interval = config.reconcile_interval();
        let stale_after = chrono::Duration::from_std(config.stale_after())
            .expect("STALE_JOB_SECS out of range");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let cutoff = Utc::now() - stale_after;
                if let Err(e) =
                    reconciler::reconcile_stale_jobs(store.as_ref(), artifacts.as_ref(), cutoff).await
                {
                    tracing::error!(error = %e, "Reconciliation pass failed");
                }
            }
        });
    }

    let app = routes::router(state)
        .merge(routes::metrics::router(prometheus_handle))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
