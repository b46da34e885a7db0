use chrono::Utc;
use tracing_subscriber::EnvFilter;

use predict_gateway::{app_state, config::AppConfig, services::reconciler};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting prediction job reconciler");

    let config = AppConfig::from_env().expect("Failed to load configuration");
    if config.database_url.is_none() {
        tracing::error!("DATABASE_URL is required; in-memory jobs are swept by the server itself");
        std::process::exit(1);
    }

    let store = app_state::open_job_store(&config)
        .await
        .expect("Failed to open job store");
    let artifacts =
        app_state::open_artifact_store(&config).expect("Failed to open artifact store");

    let stale_after =
        chrono::Duration::from_std(config.stale_after()).expect("STALE_JOB_SECS out of range");
    let mut ticker = tokio::time::interval(config.reconcile_interval());

    tracing::info!(
        stale_job_secs = config.stale_job_secs,
        interval_secs = config.reconcile_interval_secs,
        "Reconciler ready"
    );

    loop {
        ticker.tick().await;
        let cutoff = Utc::now() - stale_after;
        match reconciler::reconcile_stale_jobs(store.as_ref(), artifacts.as_ref(), cutoff).await {
            Ok(0) => tracing::trace!("No abandoned jobs"),
            Ok(closed) => tracing::info!(closed, "Reconciliation pass complete"),
            Err(e) => tracing::error!(error = %e, "Reconciliation pass failed, will retry"),
        }
    }
}
