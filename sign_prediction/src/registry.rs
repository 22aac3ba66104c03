use crate::classifier::{Classifier, InputContract};
use crate::config::BackendConfig;
use crate::labels::{LabelIndex, LabelIndexError};
use std::{collections::HashSet, path::PathBuf, sync::Arc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Model artifact not found: {0:?}")]
    MissingArtifact(PathBuf),
    #[error("Failed to create model session: {0}")]
    Session(#[from] ort::Error),
    #[error("Failed to load label index: {0}")]
    Labels(#[from] LabelIndexError),
    #[error("Model outputs {model} classes but the label index has {labels}")]
    CardinalityMismatch { model: usize, labels: usize },
    #[error("Input contract mismatch: {0}")]
    ContractMismatch(String),
    #[error("Unusable model: {0}")]
    Model(String),
    #[error("Backend `{0}` is configured more than once")]
    DuplicateBackend(String),
}

#[derive(Clone)]
pub struct LoadedBackend {
    pub classifier: Arc<dyn Classifier>,
    pub labels: Arc<LabelIndex>,
}

impl std::fmt::Debug for LoadedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedBackend")
            .field("contract", &self.classifier.contract())
            .field("num_classes", &self.classifier.num_classes())
            .finish()
    }
}

#[derive(Debug)]
pub enum LoadStatus {
    Loaded(LoadedBackend),
    Failed { reason: String },
}

/// One configured backend and the outcome of loading it. Never mutated after
/// the registry is built; reloading means building a new registry.
#[derive(Debug)]
pub struct ModelHandle {
    id: String,
    contract: InputContract,
    status: LoadStatus,
}

impl ModelHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn contract(&self) -> InputContract {
        self.contract
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.status, LoadStatus::Loaded(_))
    }

    pub fn backend(&self) -> Option<&LoadedBackend> {
        match &self.status {
            LoadStatus::Loaded(backend) => Some(backend),
            LoadStatus::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match &self.status {
            LoadStatus::Loaded(_) => None,
            LoadStatus::Failed { reason } => Some(reason),
        }
    }
}

pub trait BackendLoader {
    fn load(&self, config: &BackendConfig) -> Result<LoadedBackend, LoadError>;
}

#[derive(Debug, Default)]
pub struct ModelRegistry {
    handles: Vec<ModelHandle>,
}

impl ModelRegistry {
    /// Loads every configured backend independently. A backend that fails to
    /// load is recorded with its cause and never stops the others.
    pub fn load_all(configs: &[BackendConfig], loader: &impl BackendLoader) -> Self {
        let mut seen = HashSet::new();
        let mut handles = Vec::with_capacity(configs.len());

        for config in configs {
            let result = if seen.insert(config.id.clone()) {
                loader
                    .load(config)
                    .and_then(|backend| check_backend(config, backend))
            } else {
                Err(LoadError::DuplicateBackend(config.id.clone()))
            };

            let status = match result {
                Ok(backend) => {
                    tracing::info!(
                        backend = %config.id,
                        classes = backend.labels.len(),
                        input = config.input.name(),
                        "Backend loaded"
                    );
                    LoadStatus::Loaded(backend)
                }
                Err(e) => {
                    tracing::warn!(backend = %config.id, error = %e, "Backend failed to load");
                    LoadStatus::Failed {
                        reason: e.to_string(),
                    }
                }
            };

            handles.push(ModelHandle {
                id: config.id.clone(),
                contract: config.input,
                status,
            });
        }

        let registry = Self { handles };
        if registry.is_healthy() {
            tracing::info!(
                "{} of {} backends available",
                registry.backends_available().len(),
                registry.handles.len()
            );
        } else {
            tracing::error!("No classifier backend available, predictions will fail");
        }
        registry
    }

    pub fn handles(&self) -> &[ModelHandle] {
        &self.handles
    }

    pub fn get(&self, backend_id: &str) -> Option<&ModelHandle> {
        self.handles.iter().find(|handle| handle.id == backend_id)
    }

    /// Ids of loaded backends, in configuration order.
    pub fn backends_available(&self) -> Vec<&str> {
        self.live().map(|(id, _)| id).collect()
    }

    pub fn live(&self) -> impl Iterator<Item = (&str, &LoadedBackend)> {
        self.handles
            .iter()
            .filter_map(|handle| handle.backend().map(|backend| (handle.id(), backend)))
    }

    /// Loaded backends that take a landmark vector, in configuration order.
    /// These are the ones invoked for every detected hand.
    pub fn landmark_backends(&self) -> impl Iterator<Item = (&str, &LoadedBackend)> {
        self.handles
            .iter()
            .filter(|handle| handle.contract().is_landmarks())
            .filter_map(|handle| handle.backend().map(|backend| (handle.id(), backend)))
    }

    pub fn is_healthy(&self) -> bool {
        self.handles.iter().any(ModelHandle::is_loaded)
    }
}

fn check_backend(config: &BackendConfig, backend: LoadedBackend) -> Result<LoadedBackend, LoadError> {
    let contract = backend.classifier.contract();
    if contract != config.input {
        return Err(LoadError::ContractMismatch(format!(
            "configured {:?}, model takes {:?}",
            config.input, contract
        )));
    }

    let model = backend.classifier.num_classes();
    let labels = backend.labels.len();
    if model != labels {
        return Err(LoadError::CardinalityMismatch { model, labels });
    }

    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        alphabet, backend_config, loaded, FakeClassifier, FakeLoader, ENHANCED_IMAGE, LANDMARK,
    };

    fn configs() -> Vec<BackendConfig> {
        vec![
            backend_config("landmark", LANDMARK),
            backend_config("enhanced-image", ENHANCED_IMAGE),
        ]
    }

    #[test]
    fn test_one_failure_does_not_block_others() {
        let loader = FakeLoader::default().with(
            "landmark",
            loaded(FakeClassifier::new(LANDMARK, vec![0.5, 0.5]), alphabet(2)),
        );

        let registry = ModelRegistry::load_all(&configs(), &loader);

        assert_eq!(registry.backends_available(), vec!["landmark"]);
        assert!(registry.is_healthy());
        let failed = registry.get("enhanced-image").unwrap();
        assert!(!failed.is_loaded());
        assert!(failed.failure().unwrap().contains("not found"));
    }

    #[test]
    fn test_cardinality_mismatch_fails_only_that_backend() {
        let loader = FakeLoader::default()
            .with(
                "landmark",
                loaded(FakeClassifier::new(LANDMARK, vec![0.2; 5]), alphabet(5)),
            )
            .with(
                "enhanced-image",
                loaded(
                    FakeClassifier::new(ENHANCED_IMAGE, vec![0.1; 10]).claiming_classes(29),
                    alphabet(26),
                ),
            );

        let registry = ModelRegistry::load_all(&configs(), &loader);

        assert_eq!(registry.backends_available(), vec!["landmark"]);
        let failure = registry.get("enhanced-image").unwrap().failure().unwrap();
        assert!(failure.contains("29"));
        assert!(failure.contains("26"));
    }

    #[test]
    fn test_contract_mismatch_is_a_load_failure() {
        let loader = FakeLoader::default().with(
            "enhanced-image",
            loaded(FakeClassifier::new(LANDMARK, vec![0.5, 0.5]), alphabet(2)),
        );

        let registry = ModelRegistry::load_all(&configs(), &loader);

        assert!(registry.backends_available().is_empty());
        assert!(!registry.is_healthy());
        assert!(registry
            .get("enhanced-image")
            .unwrap()
            .failure()
            .unwrap()
            .contains("contract"));
    }

    #[test]
    fn test_duplicate_backend_id_is_rejected() {
        let loader = FakeLoader::default().with(
            "landmark",
            loaded(FakeClassifier::new(LANDMARK, vec![0.5, 0.5]), alphabet(2)),
        );
        let configs = vec![
            backend_config("landmark", LANDMARK),
            backend_config("landmark", LANDMARK),
        ];

        let registry = ModelRegistry::load_all(&configs, &loader);

        assert_eq!(registry.handles().len(), 2);
        assert_eq!(registry.backends_available(), vec!["landmark"]);
        assert!(registry.handles()[1]
            .failure()
            .unwrap()
            .contains("more than once"));
    }

    #[test]
    fn test_image_backends_are_loaded_but_not_dispatched() {
        let loader = FakeLoader::default()
            .with(
                "landmark",
                loaded(FakeClassifier::new(LANDMARK, vec![0.5, 0.5]), alphabet(2)),
            )
            .with(
                "enhanced-image",
                loaded(FakeClassifier::new(ENHANCED_IMAGE, vec![0.5, 0.5]), alphabet(2)),
            );

        let registry = ModelRegistry::load_all(&configs(), &loader);

        assert_eq!(
            registry.backends_available(),
            vec!["landmark", "enhanced-image"]
        );
        let dispatched: Vec<_> = registry.landmark_backends().map(|(id, _)| id).collect();
        assert_eq!(dispatched, vec!["landmark"]);
    }

    #[test]
    fn test_empty_registry_is_degraded() {
        let registry = ModelRegistry::load_all(&[], &FakeLoader::default());

        assert!(!registry.is_healthy());
        assert!(registry.get("landmark").is_none());
    }

    #[test]
    fn test_available_backends_follow_configuration_order() {
        let loader = FakeLoader::default()
            .with(
                "enhanced-image",
                loaded(FakeClassifier::new(ENHANCED_IMAGE, vec![0.5, 0.5]), alphabet(2)),
            )
            .with(
                "landmark",
                loaded(FakeClassifier::new(LANDMARK, vec![0.5, 0.5]), alphabet(2)),
            );

        let registry = ModelRegistry::load_all(&configs(), &loader);

        assert_eq!(
            registry.backends_available(),
            vec!["landmark", "enhanced-image"]
        );
    }
}
