use crate::classifier::BackendError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(rename = "sign")]
    pub label: String,
    pub confidence: f32,
    #[serde(rename = "model")]
    pub backend: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub success: bool,
    pub predictions: Vec<Prediction>,
    pub hands_detected: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The result of running one backend on one detected hand.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationOutcome {
    pub hand: usize,
    pub backend: String,
    pub result: Result<Prediction, BackendError>,
}

impl PredictionResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            predictions: vec![],
            hands_detected: 0,
            error: Some(error.into()),
        }
    }

    pub fn no_hands() -> Self {
        Self::from_outcomes(vec![])
    }

    /// Keeps successful predictions in outcome order; a hand counts as
    /// detected once at least one backend produced a prediction for it.
    pub fn from_outcomes(outcomes: Vec<InvocationOutcome>) -> Self {
        let mut hands = BTreeSet::new();
        let mut predictions = Vec::with_capacity(outcomes.len());

        for outcome in outcomes {
            if let Ok(prediction) = outcome.result {
                hands.insert(outcome.hand);
                predictions.push(prediction);
            }
        }

        Self {
            success: true,
            predictions,
            hands_detected: hands.len(),
            error: None,
        }
    }
}
