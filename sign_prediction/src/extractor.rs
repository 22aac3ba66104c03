use crate::frame::{Frame, FrameError};
use image::RgbImage;
use std::sync::Arc;
use thiserror::Error;

pub const HAND_JOINTS: usize = 21;
pub const LANDMARK_DIMS: usize = 3;
pub const LANDMARK_VECTOR_LEN: usize = HAND_JOINTS * LANDMARK_DIMS;

#[derive(Error, Debug, Clone)]
pub enum DetectorError {
    #[error("Hand detector inference failed: {0}")]
    Inference(String),
    #[error("Hand detector returned malformed output: {0}")]
    Output(String),
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Unreadable frame: {0}")]
    Frame(#[from] FrameError),
    #[error("Hand detection failed: {0}")]
    Detector(#[from] DetectorError),
    #[error("Hand detector unavailable: {0}")]
    Unavailable(String),
}

/// Flattened `[x, y, z]` joint coordinates of one hand. `x` and `y` are
/// normalized to the frame, `z` is depth relative to the wrist.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkVector(Vec<f32>);

impl LandmarkVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The external landmark detection capability. Implementations receive RGB
/// pixels and return one raw coordinate vector per detected hand.
pub trait HandDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Vec<f32>>, DetectorError>;
}

pub struct FeatureExtractor {
    detector: Result<Arc<dyn HandDetector>, String>,
    vector_len: usize,
}

impl FeatureExtractor {
    pub fn new(detector: Arc<dyn HandDetector>, vector_len: usize) -> Self {
        Self {
            detector: Ok(detector),
            vector_len,
        }
    }

    /// An extractor whose detector could not be loaded; every extraction fails
    /// with `reason`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            detector: Err(reason.into()),
            vector_len: LANDMARK_VECTOR_LEN,
        }
    }

    pub fn is_available(&self) -> bool {
        self.detector.is_ok()
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        self.detector.as_ref().err().map(String::as_str)
    }

    /// One landmark vector per detected hand, in detector order. No hands is
    /// an empty list, not an error.
    pub fn extract(&self, frame: &Frame) -> Result<Vec<LandmarkVector>, ExtractionError> {
        let detector = self
            .detector
            .as_ref()
            .map_err(|reason| ExtractionError::Unavailable(reason.clone()))?;

        let image = frame.to_rgb()?;
        let raw_hands = detector.detect(&image)?;

        let hands = raw_hands
            .into_iter()
            .enumerate()
            .filter_map(|(i, values)| {
                if values.len() == self.vector_len {
                    Some(LandmarkVector::new(values))
                } else {
                    tracing::warn!(
                        "Dropping hand {}: expected {} landmark values, got {}",
                        i,
                        self.vector_len,
                        values.len()
                    );
                    None
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!("Extracted {} hand(s)", hands.len());
        Ok(hands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ChannelOrder;
    use crate::testing::{hand, ScriptedDetector};

    fn frame() -> Frame {
        Frame::from_raw(4, 4, ChannelOrder::Rgb, vec![0; 48])
    }

    #[test]
    fn test_zero_hands_is_not_an_error() {
        let extractor = FeatureExtractor::new(
            Arc::new(ScriptedDetector::hands(vec![])),
            LANDMARK_VECTOR_LEN,
        );

        let hands = extractor.extract(&frame()).unwrap();

        assert!(hands.is_empty());
    }

    #[test]
    fn test_hands_keep_detection_order() {
        let extractor = FeatureExtractor::new(
            Arc::new(ScriptedDetector::hands(vec![hand(0.7), hand(0.2)])),
            LANDMARK_VECTOR_LEN,
        );

        let hands = extractor.extract(&frame()).unwrap();

        assert_eq!(hands.len(), 2);
        assert_eq!(hands[0].as_slice()[0], 0.7);
        assert_eq!(hands[1].as_slice()[0], 0.2);
    }

    #[test]
    fn test_wrong_length_hand_is_dropped() {
        let extractor = FeatureExtractor::new(
            Arc::new(ScriptedDetector::hands(vec![vec![0.5; 10], hand(0.3)])),
            LANDMARK_VECTOR_LEN,
        );

        let hands = extractor.extract(&frame()).unwrap();

        assert_eq!(hands.len(), 1);
        assert_eq!(hands[0].len(), LANDMARK_VECTOR_LEN);
    }

    #[test]
    fn test_malformed_frame_is_reported() {
        let extractor = FeatureExtractor::new(
            Arc::new(ScriptedDetector::hands(vec![hand(0.5)])),
            LANDMARK_VECTOR_LEN,
        );
        let broken = Frame::from_raw(0, 0, ChannelOrder::Rgb, vec![]);

        assert!(matches!(
            extractor.extract(&broken),
            Err(ExtractionError::Frame(_))
        ));
    }

    #[test]
    fn test_detector_failure_is_reported() {
        let extractor = FeatureExtractor::new(
            Arc::new(ScriptedDetector::failing("model crashed")),
            LANDMARK_VECTOR_LEN,
        );

        assert!(matches!(
            extractor.extract(&frame()),
            Err(ExtractionError::Detector(_))
        ));
    }

    #[test]
    fn test_unavailable_detector() {
        let extractor = FeatureExtractor::unavailable("hand_landmark.onnx not found");

        assert!(!extractor.is_available());
        let err = extractor.extract(&frame()).unwrap_err();
        assert!(err.to_string().contains("hand_landmark.onnx not found"));
    }
}
