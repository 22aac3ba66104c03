use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

mod health;
mod labels;
mod metrics;
mod predict;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/predict", post(predict::predict))
        .route("/predict/raw", post(predict::predict_raw))
        .route("/health", get(health::healthcheck))
        .route("/test", get(health::liveness))
        .route("/labels", get(labels::labels_handler))
        .route("/metrics", get(metrics::metrics_handler))
}
