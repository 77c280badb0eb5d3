//! HTTP request handlers

use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::serving::{
    HealthStatus, LoggedInput, PredictionResponse, Record, RequestLogRecord,
};

use super::error::{Result, ServerError};
use super::state::AppState;

/// Batch body; `records` is accepted as well as `inputs`
#[derive(Deserialize)]
pub struct BatchPredictRequest {
    #[serde(alias = "records")]
    inputs: Vec<Record>,
}

pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Welcome to the Churn Prediction API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(state.service.health())
}

pub async fn predict(
    State(state): State<Arc<AppState>>,
    Json(record): Json<Record>,
) -> Result<Json<PredictionResponse>> {
    let start = Instant::now();
    let response = state.service.predict(std::slice::from_ref(&record))?;
    log_request(&state, LoggedInput::Single(record), &response, start);
    Ok(Json(response))
}

pub async fn predict_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchPredictRequest>,
) -> Result<Json<PredictionResponse>> {
    let start = Instant::now();
    let response = state.service.predict(&request.inputs)?;
    log_request(&state, LoggedInput::Batch(request.inputs), &response, start);
    Ok(Json(response))
}

pub async fn reload_model(State(state): State<Arc<AppState>>) -> Result<Json<HealthStatus>> {
    let version = state
        .service
        .reload()
        .map_err(|err| ServerError::Unavailable(format!("model reload failed: {}", err)))?;
    info!(version, "Model reloaded on request");
    Ok(Json(state.service.health()))
}

fn log_request(state: &AppState, input: LoggedInput, response: &PredictionResponse, start: Instant) {
    if let Some(logger) = &state.logger {
        let record = RequestLogRecord::new(input, response, start.elapsed().as_secs_f64());
        logger.log(&record);
    }
}
