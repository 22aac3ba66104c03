//! Fakes shared by the unit tests.

use crate::classifier::{BackendError, Classifier, InputContract};
use crate::config::BackendConfig;
use crate::extractor::{DetectorError, HandDetector, LandmarkVector, LANDMARK_VECTOR_LEN};
use crate::labels::LabelIndex;
use crate::registry::{BackendLoader, LoadError, LoadedBackend};
use image::RgbImage;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const LANDMARK: InputContract = InputContract::Landmarks {
    len: LANDMARK_VECTOR_LEN,
};

pub const ENHANCED_IMAGE: InputContract = InputContract::Image {
    height: 64,
    width: 64,
    channels: 3,
};

/// Landmarks of a hand whose wrist sits at `x`. The wrist x coordinate is
/// what fakes use to tell hands apart.
pub fn hand(x: f32) -> Vec<f32> {
    (0..21)
        .flat_map(|joint| [x + joint as f32 * 0.01, 0.3 + joint as f32 * 0.01, 0.0])
        .collect()
}

pub fn alphabet(n: usize) -> Vec<String> {
    (b'A'..=b'Z')
        .take(n)
        .map(|c| (c as char).to_string())
        .collect()
}

pub struct ScriptedDetector {
    result: Result<Vec<Vec<f32>>, DetectorError>,
}

impl ScriptedDetector {
    pub fn hands(hands: Vec<Vec<f32>>) -> Self {
        Self { result: Ok(hands) }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            result: Err(DetectorError::Inference(reason.to_string())),
        }
    }
}

impl HandDetector for ScriptedDetector {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<Vec<f32>>, DetectorError> {
        self.result.clone()
    }
}

enum Behaviour {
    Answer,
    Fail(String),
    Sleep(Duration),
    Panic,
}

pub struct FakeClassifier {
    contract: InputContract,
    distribution: Vec<f32>,
    num_classes: usize,
    fail_for_wrist: Option<f32>,
    behaviour: Behaviour,
}

impl FakeClassifier {
    pub fn new(contract: InputContract, distribution: Vec<f32>) -> Self {
        let num_classes = distribution.len();
        Self {
            contract,
            distribution,
            num_classes,
            fail_for_wrist: None,
            behaviour: Behaviour::Answer,
        }
    }

    /// Fails only for the hand whose wrist sits at `x`.
    pub fn failing_for_wrist(mut self, x: f32) -> Self {
        self.fail_for_wrist = Some(x);
        self
    }

    pub fn failing(mut self, reason: &str) -> Self {
        self.behaviour = Behaviour::Fail(reason.to_string());
        self
    }

    pub fn sleeping(mut self, duration: Duration) -> Self {
        self.behaviour = Behaviour::Sleep(duration);
        self
    }

    pub fn panicking(mut self) -> Self {
        self.behaviour = Behaviour::Panic;
        self
    }

    pub fn claiming_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }
}

impl Classifier for FakeClassifier {
    fn contract(&self) -> InputContract {
        self.contract
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn predict(&self, hand: &LandmarkVector) -> Result<Vec<f32>, BackendError> {
        self.contract.accepts(hand)?;
        if self.fail_for_wrist == Some(hand.as_slice()[0]) {
            return Err(BackendError::Inference("scripted failure".to_string()));
        }
        match &self.behaviour {
            Behaviour::Answer => Ok(self.distribution.clone()),
            Behaviour::Fail(reason) => Err(BackendError::Inference(reason.clone())),
            Behaviour::Sleep(duration) => {
                std::thread::sleep(*duration);
                Ok(self.distribution.clone())
            }
            Behaviour::Panic => panic!("classifier blew up"),
        }
    }
}

pub fn loaded(classifier: FakeClassifier, labels: Vec<String>) -> LoadedBackend {
    LoadedBackend {
        classifier: Arc::new(classifier),
        labels: Arc::new(LabelIndex::new(labels).unwrap()),
    }
}

/// Serves prepared backends by id; ids without an entry fail to load.
#[derive(Default)]
pub struct FakeLoader {
    backends: HashMap<String, LoadedBackend>,
}

impl FakeLoader {
    pub fn with(mut self, id: &str, backend: LoadedBackend) -> Self {
        self.backends.insert(id.to_string(), backend);
        self
    }
}

impl BackendLoader for FakeLoader {
    fn load(&self, config: &BackendConfig) -> Result<LoadedBackend, LoadError> {
        self.backends
            .get(&config.id)
            .cloned()
            .ok_or_else(|| LoadError::MissingArtifact(config.model_file.clone().into()))
    }
}

pub fn backend_config(id: &str, input: InputContract) -> BackendConfig {
    BackendConfig {
        id: id.to_string(),
        model_file: format!("{}.onnx", id),
        labels_file: format!("{}.txt", id),
        input,
    }
}
