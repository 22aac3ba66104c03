use crate::server::SharedState;
use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthReport {
    status: String,
    models_loaded: BTreeMap<String, bool>,
    any_model_loaded: bool,
    load_errors: BTreeMap<String, String>,
    hand_detector_loaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hand_detector_error: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct Status {
    message: String,
    status: String,
}

/// Healthy as long as at least one backend loaded. The service keeps running
/// without any, but every prediction then fails.
pub async fn healthcheck(State(state): State<SharedState>) -> impl IntoResponse {
    state.metrics.record_request("/health");

    let registry = state.dispatcher.registry();
    let extractor = state.dispatcher.extractor();

    let mut models_loaded = BTreeMap::new();
    let mut load_errors = BTreeMap::new();
    for handle in registry.handles() {
        // A duplicated id is reported loaded if any of its entries loaded.
        *models_loaded.entry(handle.id().to_string()).or_insert(false) |= handle.is_loaded();
        if let Some(reason) = handle.failure() {
            load_errors
                .entry(handle.id().to_string())
                .or_insert_with(|| reason.to_string());
        }
    }
    let any_model_loaded = registry.is_healthy();

    Json(HealthReport {
        status: if any_model_loaded { "healthy" } else { "degraded" }.into(),
        models_loaded,
        any_model_loaded,
        load_errors,
        hand_detector_loaded: extractor.is_available(),
        hand_detector_error: extractor.unavailable_reason().map(str::to_string),
    })
}

pub async fn liveness() -> impl IntoResponse {
    Json(Status {
        message: "Sign prediction service is running".into(),
        status: "ok".into(),
    })
}
