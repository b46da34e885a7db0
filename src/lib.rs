//! Prediction gateway
//!
//! Accepts image and video uploads, relays them to an external violence
//! detection service, records each request as a prediction job, and serves
//! the annotated output once the job completes.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
