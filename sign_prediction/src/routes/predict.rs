use crate::{frame::Frame, response::PredictionResult, server::SharedState};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

const PREDICT_ROUTE: &str = "/predict";
const PREDICT_RAW_ROUTE: &str = "/predict/raw";

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    image: Option<String>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No image provided")]
    MissingImage,
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

#[instrument(skip_all)]
pub async fn predict(
    State(state): State<SharedState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    state.metrics.record_request(PREDICT_ROUTE);
    let start = Instant::now();

    let Json(request) = payload.map_err(|e| ApiError::InvalidBody(e.body_text()))?;
    let image = request
        .image
        .filter(|image| !image.trim().is_empty())
        .ok_or(ApiError::MissingImage)?;

    let result = match Frame::from_base64(&image) {
        Ok(frame) => state.dispatcher.predict(frame).await,
        Err(e) => {
            tracing::warn!("Rejecting unreadable frame: {}", e);
            PredictionResult::failure(e.to_string())
        }
    };

    state
        .metrics
        .record_prediction_duration(start.elapsed().as_millis() as u64, PREDICT_ROUTE);
    Ok(Json(result))
}

#[instrument(skip_all, fields(bytes = body.len()))]
pub async fn predict_raw(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<PredictionResult>, ApiError> {
    state.metrics.record_request(PREDICT_RAW_ROUTE);
    let start = Instant::now();

    if body.is_empty() {
        return Err(ApiError::MissingImage);
    }

    let result = match Frame::decode(&body) {
        Ok(frame) => state.dispatcher.predict(frame).await,
        Err(e) => {
            tracing::warn!("Rejecting unreadable frame: {}", e);
            PredictionResult::failure(e.to_string())
        }
    };

    state
        .metrics
        .record_prediction_duration(start.elapsed().as_millis() as u64, PREDICT_RAW_ROUTE);
    Ok(Json(result))
}
