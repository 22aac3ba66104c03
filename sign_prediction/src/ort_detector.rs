use crate::{
    config::{DetectorConfig, ModelsConfig},
    extractor::{DetectorError, HandDetector},
    registry::LoadError,
};
use image::{imageops, imageops::FilterType, RgbImage};
use ndarray::{Array, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use parking_lot::Mutex;

/// Hand landmark model in the MediaPipe layout: a `[1, S, S, 3]` RGB input
/// and, as outputs, `landmarks` (`[N, 63]`, input pixel space) plus an
/// optional presence score per hand (`[N]` or `[N, 1]`).
pub struct OrtHandDetector {
    session: Mutex<Session>,
    input_size: u32,
    decoder: HandDecoder,
    landmarks_output: String,
    presence_output: Option<String>,
}

/// Splits the raw landmark output into hands, gates each hand on its own
/// presence score and normalizes coordinates to `[0, 1]`.
#[derive(Debug, Clone, Copy)]
struct HandDecoder {
    landmark_len: usize,
    scale: f32,
    min_detection_confidence: f32,
    max_hands: usize,
}

impl HandDecoder {
    fn from_config(config: &DetectorConfig) -> Self {
        Self {
            landmark_len: config.landmark_len,
            scale: config.input_size as f32,
            min_detection_confidence: config.min_detection_confidence,
            max_hands: config.max_hands,
        }
    }

    /// Hands come back in model output order, at most `max_hands` of them.
    fn decode(
        &self,
        landmarks: &[f32],
        presence: Option<&[f32]>,
    ) -> Result<Vec<Vec<f32>>, DetectorError> {
        if landmarks.len() % self.landmark_len != 0 {
            return Err(DetectorError::Output(format!(
                "{} landmark values do not split into hands of {}",
                landmarks.len(),
                self.landmark_len
            )));
        }

        let rows = landmarks.chunks_exact(self.landmark_len);
        if let Some(scores) = presence {
            if scores.len() != rows.len() {
                return Err(DetectorError::Output(format!(
                    "{} presence scores for {} hands",
                    scores.len(),
                    rows.len()
                )));
            }
        }

        let hands = rows
            .enumerate()
            .filter(|(index, _)| match presence {
                Some(scores) => {
                    let score = scores[*index];
                    let present = score >= self.min_detection_confidence;
                    if !present {
                        tracing::debug!("Dropping hand {}, presence score {:.3}", index, score);
                    }
                    present
                }
                None => true,
            })
            .take(self.max_hands)
            .map(|(_, row)| row.iter().map(|value| value / self.scale).collect())
            .collect();
        Ok(hands)
    }
}

impl OrtHandDetector {
    pub fn new(config: &DetectorConfig, models: &ModelsConfig) -> Result<Self, LoadError> {
        let model_path = models.resolve(&config.model_file);
        if !model_path.exists() {
            return Err(LoadError::MissingArtifact(model_path));
        }

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(models.intra_threads)?
            .commit_from_file(&model_path)?;

        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        let landmarks_output = match &config.landmarks_output {
            Some(name) if output_names.contains(name) => name.clone(),
            Some(name) => {
                return Err(LoadError::Model(format!(
                    "landmark output `{}` not found, available: {:?}",
                    name, output_names
                )))
            }
            None => output_names
                .first()
                .cloned()
                .ok_or_else(|| LoadError::Model("detector has no outputs".to_string()))?,
        };
        let presence_output = match &config.presence_output {
            Some(name) if output_names.contains(name) => Some(name.clone()),
            Some(name) => {
                return Err(LoadError::Model(format!(
                    "presence output `{}` not found, available: {:?}",
                    name, output_names
                )))
            }
            None => output_names.get(1).cloned(),
        };

        tracing::info!(
            "Hand detector loaded from {:?}, landmarks=`{}`, presence={:?}",
            model_path,
            landmarks_output,
            presence_output
        );

        Ok(Self {
            session: Mutex::new(session),
            input_size: config.input_size,
            decoder: HandDecoder::from_config(config),
            landmarks_output,
            presence_output,
        })
    }

    fn to_input(&self, image: &RgbImage) -> Array<f32, Ix4> {
        let size = self.input_size;
        let resized = imageops::resize(image, size, size, FilterType::Triangle);

        let mut input = Array::zeros((1, size as usize, size as usize, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            let [r, g, b] = pixel.0;
            input[[0, y, x, 0]] = (r as f32) / 255.;
            input[[0, y, x, 1]] = (g as f32) / 255.;
            input[[0, y, x, 2]] = (b as f32) / 255.;
        }
        input
    }
}

impl HandDetector for OrtHandDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Vec<f32>>, DetectorError> {
        let input = self.to_input(image);
        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| DetectorError::Inference(format!("failed to build tensor: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| DetectorError::Inference(e.to_string()))?;

        let presence = match &self.presence_output {
            Some(name) => {
                let (_, scores) = outputs[name.as_str()]
                    .try_extract_tensor::<f32>()
                    .map_err(|e| DetectorError::Output(e.to_string()))?;
                Some(scores)
            }
            None => None,
        };
        let (_, landmarks) = outputs[self.landmarks_output.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::Output(e.to_string()))?;

        self.decoder.decode(landmarks, presence)
    }
}
