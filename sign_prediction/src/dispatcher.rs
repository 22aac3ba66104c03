use crate::{
    classifier::{argmax, BackendError},
    config::{DispatchConfig, LabelsConfig},
    extractor::{FeatureExtractor, LandmarkVector},
    frame::Frame,
    labels::LabelMapper,
    registry::{LoadedBackend, ModelRegistry},
    response::{InvocationOutcome, Prediction, PredictionResult},
    telemetry::Metrics,
};
use std::{sync::Arc, time::Duration};
use tracing::instrument;

pub const NO_BACKEND_AVAILABLE: &str = "no classifier backend available";

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub backend_timeout: Duration,
    pub min_confidence: f32,
    pub semantic_words: bool,
}

impl DispatchSettings {
    pub fn new(dispatch: &DispatchConfig, labels: &LabelsConfig) -> Self {
        Self {
            backend_timeout: dispatch.backend_timeout(),
            min_confidence: dispatch.min_confidence,
            semantic_words: labels.semantic_words,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::new(&DispatchConfig::default(), &LabelsConfig::default())
    }
}

/// Turns a frame into a [`PredictionResult`] by running every loaded landmark
/// backend on every detected hand. Each (hand, backend) invocation succeeds or
/// fails on its own; a failure only removes that one prediction.
pub struct PredictionDispatcher {
    extractor: Arc<FeatureExtractor>,
    registry: Arc<ModelRegistry>,
    mapper: LabelMapper,
    settings: DispatchSettings,
    metrics: Arc<Metrics>,
}

impl PredictionDispatcher {
    pub fn new(
        extractor: Arc<FeatureExtractor>,
        registry: Arc<ModelRegistry>,
        settings: DispatchSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        let mapper = LabelMapper::from_registry(&registry, settings.semantic_words);
        metrics.set_backends_available(registry.backends_available().len());
        Self {
            extractor,
            registry,
            mapper,
            settings,
            metrics,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    #[instrument(skip_all, fields(width = frame.width(), height = frame.height()))]
    pub async fn predict(&self, frame: Frame) -> PredictionResult {
        if !self.registry.is_healthy() {
            tracing::warn!("Rejecting prediction: {}", NO_BACKEND_AVAILABLE);
            return PredictionResult::failure(NO_BACKEND_AVAILABLE);
        }

        let extractor = self.extractor.clone();
        let hands = match tokio::task::spawn_blocking(move || extractor.extract(&frame)).await {
            Ok(Ok(hands)) => hands,
            Ok(Err(e)) => {
                tracing::warn!("Feature extraction failed: {}", e);
                return PredictionResult::failure(e.to_string());
            }
            Err(e) => {
                tracing::error!("Feature extraction task aborted: {}", e);
                return PredictionResult::failure(format!("Feature extraction aborted: {}", e));
            }
        };

        if hands.is_empty() {
            return PredictionResult::no_hands();
        }

        let invocations = hands.iter().enumerate().flat_map(move |(hand_index, hand)| {
            self.registry
                .landmark_backends()
                .map(move |(backend_id, backend)| self.invoke(hand_index, backend_id, backend, hand))
        });
        let outcomes = futures::future::join_all(invocations).await;

        for outcome in &outcomes {
            if let Err(e) = &outcome.result {
                tracing::warn!(
                    hand = outcome.hand,
                    backend = %outcome.backend,
                    kind = e.kind(),
                    "Backend produced no prediction: {}",
                    e
                );
                self.metrics.record_backend_failure(&outcome.backend, e.kind());
            }
        }

        let result = PredictionResult::from_outcomes(outcomes);
        self.metrics.record_hands_detected(result.hands_detected);
        tracing::debug!(
            "Returning {} prediction(s) for {} hand(s)",
            result.predictions.len(),
            result.hands_detected
        );
        result
    }

    async fn invoke(
        &self,
        hand_index: usize,
        backend_id: &str,
        backend: &LoadedBackend,
        hand: &LandmarkVector,
    ) -> InvocationOutcome {
        let result = self
            .run_backend(backend, hand.clone())
            .await
            .and_then(|distribution| self.decode(backend_id, &distribution));

        InvocationOutcome {
            hand: hand_index,
            backend: backend_id.to_string(),
            result,
        }
    }

    /// Runs the blocking inference on the blocking pool, bounded by the
    /// backend timeout. A timed out task keeps running in the background but
    /// its answer is discarded.
    async fn run_backend(
        &self,
        backend: &LoadedBackend,
        hand: LandmarkVector,
    ) -> Result<Vec<f32>, BackendError> {
        let classifier = backend.classifier.clone();
        let task = tokio::task::spawn_blocking(move || classifier.predict(&hand));

        match tokio::time::timeout(self.settings.backend_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(BackendError::Aborted(e.to_string())),
            Err(_) => Err(BackendError::Timeout(
                self.settings.backend_timeout.as_millis() as u64,
            )),
        }
    }

    fn decode(&self, backend_id: &str, distribution: &[f32]) -> Result<Prediction, BackendError> {
        let (class_index, confidence) = argmax(distribution)?;

        let label = self.mapper.decode(backend_id, class_index).ok_or_else(|| {
            BackendError::ShapeMismatch(format!(
                "class {} outside the label index of `{}`",
                class_index, backend_id
            ))
        })?;

        if confidence < self.settings.min_confidence {
            return Err(BackendError::BelowThreshold(confidence));
        }

        Ok(Prediction {
            label: label.to_string(),
            confidence,
            backend: backend_id.to_string(),
            word: self.mapper.word_for(label),
        })
    }
}
