//! HTTP request handlers

use std::sync::Arc;

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::error::{Result, ServerError};
use super::state::AppState;
use crate::error::IrisError;

/// Accuracy reported for the published model versions
pub const ACCURACY_HINT: &str = "v1: ~0.97, v2: 1.0";

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub features: Vec<f64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PredictResponse {
    pub prediction: String,
    pub class_id: usize,
    pub model_version: String,
}

pub async fn root(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "message": format!("Iris API - model loaded: {}", state.model.version()),
        "accuracy_hint": ACCURACY_HINT,
    }))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let uptime = chrono::Utc::now().signed_duration_since(state.started_at);
    Json(json!({
        "status": "healthy",
        "model_version": state.model.version(),
        "model_path": state.model.path().display().to_string(),
        "uptime_secs": uptime.num_seconds(),
    }))
}

pub async fn predict(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>> {
    let Json(request) = payload?;
    let prediction = state.model.predict_slice(&request.features).map_err(|e| match e {
        IrisError::ShapeError { expected, actual } => {
            ServerError::Unprocessable(format!("expected {}, got {}", expected, actual))
        }
        other => ServerError::Model(other),
    })?;

    debug!(
        features = ?request.features,
        class_id = prediction.class_id,
        "Prediction served"
    );

    Ok(Json(PredictResponse {
        prediction: prediction.name.to_string(),
        class_id: prediction.class_id,
        model_version: state.model.version().to_string(),
    }))
}
