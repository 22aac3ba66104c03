use crate::server::SharedState;
use axum::{extract::State, response::IntoResponse, Json};
use std::collections::BTreeMap;

/// Ordered class labels of every loaded backend.
pub async fn labels_handler(State(state): State<SharedState>) -> impl IntoResponse {
    state.metrics.record_request("/labels");

    let labels: BTreeMap<&str, &[String]> = state
        .dispatcher
        .registry()
        .live()
        .map(|(id, backend)| (id, backend.labels.labels()))
        .collect();

    Json(labels).into_response()
}
