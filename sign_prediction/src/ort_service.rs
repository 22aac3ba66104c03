use crate::{
    classifier::{BackendError, Classifier, InputContract},
    config::{BackendConfig, ModelsConfig},
    extractor::LandmarkVector,
    labels::LabelIndex,
    registry::{BackendLoader, LoadError, LoadedBackend},
};
use ndarray::{Array2, ArrayD, IxDyn};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use parking_lot::Mutex;
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// An ONNX classifier served from a small pool of sessions. Requests pick a
/// session round-robin; each session runs one inference at a time.
pub struct OrtClassifier {
    sessions: Vec<Mutex<Session>>,
    counter: AtomicUsize,
    output_name: String,
    contract: InputContract,
    num_classes: usize,
}

impl OrtClassifier {
    pub fn load(
        model_path: &Path,
        contract: InputContract,
        num_instances: usize,
        intra_threads: usize,
    ) -> Result<Self, LoadError> {
        if !model_path.exists() {
            return Err(LoadError::MissingArtifact(model_path.to_path_buf()));
        }

        let sessions = (0..num_instances.max(1))
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .with_intra_threads(intra_threads)?
                    .commit_from_file(model_path)?;
                Ok(Mutex::new(session))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        let output_name = sessions[0]
            .lock()
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| LoadError::Model("model has no outputs".to_string()))?;

        let mut classifier = Self {
            sessions,
            counter: AtomicUsize::new(0),
            output_name,
            contract,
            num_classes: 0,
        };
        classifier.num_classes = classifier.probe_num_classes()?;

        tracing::info!(
            "Created {} ONNX session(s) for {:?} with {} classes",
            classifier.sessions.len(),
            model_path,
            classifier.num_classes
        );

        Ok(classifier)
    }

    /// Runs one inference on an all-zero input shaped by the contract. This
    /// both proves the model accepts the contract and reveals the class count.
    fn probe_num_classes(&self) -> Result<usize, LoadError> {
        let shape = match self.contract {
            InputContract::Landmarks { len } => vec![1, len],
            InputContract::Image {
                height,
                width,
                channels,
            } => vec![1, height as usize, width as usize, channels as usize],
        };
        let probe = ArrayD::<f32>::zeros(IxDyn(&shape));

        let distribution = self.run_inference(&probe).map_err(|e| {
            LoadError::ContractMismatch(format!(
                "model rejected a {:?} input: {}",
                shape, e
            ))
        })?;

        if distribution.is_empty() {
            return Err(LoadError::Model("model produced an empty output".to_string()));
        }
        Ok(distribution.len())
    }

    pub fn run_inference(&self, input: &ArrayD<f32>) -> Result<Vec<f32>, BackendError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[index].lock();

        tracing::trace!("Handling request with session {}", index);
        let input = input.as_standard_layout();
        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| BackendError::ShapeMismatch(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| BackendError::Inference(e.to_string()))?;

        let (_shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| BackendError::Inference(format!("failed to extract tensor: {}", e)))?;

        Ok(data.to_vec())
    }
}

impl Classifier for OrtClassifier {
    fn contract(&self) -> InputContract {
        self.contract
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn predict(&self, hand: &LandmarkVector) -> Result<Vec<f32>, BackendError> {
        self.contract.accepts(hand)?;

        let input = Array2::from_shape_vec((1, hand.len()), hand.as_slice().to_vec())
            .map_err(|e| BackendError::ShapeMismatch(e.to_string()))?
            .into_dyn();
        let distribution = self.run_inference(&input)?;
        if distribution.len() != self.num_classes {
            return Err(BackendError::ShapeMismatch(format!(
                "expected {} class probabilities, got {}",
                self.num_classes,
                distribution.len()
            )));
        }
        Ok(distribution)
    }
}

/// Loads classifier artifacts and their sibling label indices from the model
/// directory.
pub struct OrtBackendLoader {
    models: ModelsConfig,
}

impl OrtBackendLoader {
    pub fn new(models: &ModelsConfig) -> Self {
        Self {
            models: models.clone(),
        }
    }
}

impl BackendLoader for OrtBackendLoader {
    fn load(&self, config: &BackendConfig) -> Result<LoadedBackend, LoadError> {
        let labels_path = self.models.resolve(&config.labels_file);
        if !labels_path.exists() {
            return Err(LoadError::MissingArtifact(labels_path));
        }
        let labels = LabelIndex::from_file(&labels_path)?;

        let classifier = OrtClassifier::load(
            &self.models.resolve(&config.model_file),
            config.input,
            self.models.num_instances,
            self.models.intra_threads,
        )?;

        Ok(LoadedBackend {
            classifier: Arc::new(classifier),
            labels: Arc::new(labels),
        })
    }
}
