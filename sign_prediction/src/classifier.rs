use crate::extractor::LandmarkVector;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a backend expects as input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputContract {
    Landmarks { len: usize },
    Image { height: u32, width: u32, channels: u32 },
}

impl InputContract {
    pub fn name(&self) -> &'static str {
        match self {
            InputContract::Landmarks { .. } => "landmarks",
            InputContract::Image { .. } => "image",
        }
    }

    /// Only landmark backends take part in dispatch. Image backends are
    /// loaded and reported, but never invoked per hand.
    pub fn is_landmarks(&self) -> bool {
        matches!(self, InputContract::Landmarks { .. })
    }

    pub fn accepts(&self, hand: &LandmarkVector) -> Result<(), BackendError> {
        match *self {
            InputContract::Landmarks { len } if hand.len() == len => Ok(()),
            InputContract::Landmarks { len } => Err(BackendError::ShapeMismatch(format!(
                "expected {} landmark values, got {}",
                len,
                hand.len()
            ))),
            InputContract::Image { .. } => Err(BackendError::ShapeMismatch(
                "backend takes an image tensor, not landmarks".to_string(),
            )),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Input shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("Numeric error in backend output: {0}")]
    Numeric(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Inference timed out after {0} ms")]
    Timeout(u64),
    #[error("Inference task aborted: {0}")]
    Aborted(String),
    #[error("Confidence {0:.3} below threshold")]
    BelowThreshold(f32),
}

impl BackendError {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::ShapeMismatch(_) => "shape_mismatch",
            BackendError::Numeric(_) => "numeric",
            BackendError::Inference(_) => "inference",
            BackendError::Timeout(_) => "timeout",
            BackendError::Aborted(_) => "aborted",
            BackendError::BelowThreshold(_) => "below_threshold",
        }
    }
}

/// A loaded classifier. Implementations must be safe to call from many
/// threads at once; `predict` returns a probability distribution over
/// `num_classes()` classes for one hand.
pub trait Classifier: Send + Sync + 'static {
    fn contract(&self) -> InputContract;

    fn num_classes(&self) -> usize;

    fn predict(&self, hand: &LandmarkVector) -> Result<Vec<f32>, BackendError>;
}

/// Index and value of the highest probability. Ties go to the lowest index.
pub fn argmax(distribution: &[f32]) -> Result<(usize, f32), BackendError> {
    if let Some(bad) = distribution.iter().find(|p| !p.is_finite()) {
        return Err(BackendError::Numeric(format!(
            "distribution contains {}",
            bad
        )));
    }

    let (index, confidence) = distribution
        .iter()
        .copied()
        .enumerate()
        .reduce(|accum, row| if row.1 > accum.1 { row } else { accum })
        .ok_or_else(|| BackendError::Numeric("empty distribution".to_string()))?;

    if !(0.0..=1.0).contains(&confidence) {
        return Err(BackendError::Numeric(format!(
            "confidence {} is not a probability",
            confidence
        )));
    }

    Ok((index, confidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::LANDMARK_VECTOR_LEN;
    use crate::testing::hand;

    #[test]
    fn test_argmax_picks_highest_probability() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Ok((1, 0.7)));
    }

    #[test]
    fn test_argmax_ties_resolve_to_lowest_index() {
        assert_eq!(argmax(&[0.4, 0.4, 0.2]), Ok((0, 0.4)));
    }

    #[test]
    fn test_argmax_rejects_degenerate_distributions() {
        assert!(matches!(argmax(&[]), Err(BackendError::Numeric(_))));
        assert!(matches!(
            argmax(&[0.2, f32::NAN]),
            Err(BackendError::Numeric(_))
        ));
        assert!(matches!(argmax(&[3.5, 0.1]), Err(BackendError::Numeric(_))));
    }

    #[test]
    fn test_landmark_contract_checks_length() {
        let contract = InputContract::Landmarks {
            len: LANDMARK_VECTOR_LEN,
        };

        assert!(contract.accepts(&LandmarkVector::new(hand(0.4))).is_ok());
        assert!(matches!(
            contract.accepts(&LandmarkVector::new(vec![0.1; 12])),
            Err(BackendError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_image_contract_never_takes_landmarks() {
        let contract = InputContract::Image {
            height: 64,
            width: 64,
            channels: 3,
        };

        assert!(!contract.is_landmarks());
        assert!(matches!(
            contract.accepts(&LandmarkVector::new(hand(0.4))),
            Err(BackendError::ShapeMismatch(_))
        ));
    }
}
