use crate::{
    config::{Config, ServerConfig},
    dispatcher::{DispatchSettings, PredictionDispatcher},
    extractor::{FeatureExtractor, LANDMARK_VECTOR_LEN},
    ort_detector::OrtHandDetector,
    ort_service::OrtBackendLoader,
    registry::ModelRegistry,
    routes::api_routes,
    telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct SharedState {
    pub dispatcher: Arc<PredictionDispatcher>,
    pub metrics: Arc<Metrics>,
}

pub fn router(state: SharedState, max_request_bytes: usize) -> Router {
    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_request_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(state: SharedState, config: &ServerConfig) -> anyhow::Result<Self> {
        let router = router(state, config.max_request_bytes);
        let listener = TcpListener::bind(config.get_address()).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!("Sign prediction service listening on {}", self.listener.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async {
                shutdown_signal().await;
                tracing::info!("Shutdown signal received, starting graceful shutdown");
            })
            .await?;

        Ok(())
    }
}

/// Loads the detector and every configured backend, then serves until a
/// shutdown signal. Missing models degrade the service instead of stopping it.
pub async fn start_server(config: Config) -> anyhow::Result<()> {
    let metrics = Arc::new(Metrics::new()?);

    let extractor = match &config.detector {
        Some(detector) => match OrtHandDetector::new(detector, &config.models) {
            Ok(detector_model) => {
                FeatureExtractor::new(Arc::new(detector_model), detector.landmark_len)
            }
            Err(e) => {
                tracing::error!("Hand detector failed to load: {}", e);
                FeatureExtractor::unavailable(e.to_string())
            }
        },
        None => {
            tracing::warn!("No hand detector configured");
            FeatureExtractor::unavailable(format!(
                "no hand detector configured, expected {} landmark values per hand",
                LANDMARK_VECTOR_LEN
            ))
        }
    };

    let loader = OrtBackendLoader::new(&config.models);
    let registry = ModelRegistry::load_all(&config.models.backends, &loader);

    let dispatcher = PredictionDispatcher::new(
        Arc::new(extractor),
        Arc::new(registry),
        DispatchSettings::new(&config.dispatch, &config.labels),
        metrics.clone(),
    );

    let state = SharedState {
        dispatcher: Arc::new(dispatcher),
        metrics,
    };

    HttpServer::new(state, &config.server).await?.run().await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
