use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

pub mod health;
pub mod metrics;
pub mod predict;

/// API routes backed by the shared application state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/predict/video", post(predict::predict_video))
        .route("/predict/video/{id}", get(predict::get_annotated_video))
        .route("/predict/image", post(predict::predict_image))
        .route("/predict/image/{id}", get(predict::get_annotated_image))
        .route("/predict/jobs/{id}", get(predict::get_job_status))
        .with_state(state)
}
