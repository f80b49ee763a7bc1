//! Uniform inference interface over loaded models

use crate::error::PredictionError;
use crate::types::FeatureRecord;
use serde::Deserialize;
use std::fmt;

/// Declared model kind. Selects the artifact codec and the vote rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Classifier predicting a discrete label; votes when the label is 0 (the benign class)
    ClassifierVote,
    /// Autoencoder; votes when the reconstruction error exceeds the anomaly threshold
    ReconstructionAnomaly,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClassifierVote => "classifier_vote",
            Self::ReconstructionAnomaly => "reconstruction_anomaly",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw output of one model for one record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PredictionResult {
    /// Predicted class label
    Label(i64),
    /// Mean squared difference between the record and its reconstruction
    ReconstructionError(f64),
}

/// A loaded model.
///
/// `predict` is called concurrently from many connections; implementations
/// must not change observable state between calls.
pub trait Predictor: Send + Sync {
    /// Kind of result this predictor produces
    fn kind(&self) -> ModelKind;

    fn predict(&self, record: &FeatureRecord) -> Result<PredictionResult, PredictionError>;
}

/// Derive a 0/1 vote from a prediction.
///
/// The two kinds vote for opposite things: a classifier votes when it sees
/// the benign class, an autoencoder votes when it sees an anomaly. Both feed
/// the same accumulator.
pub fn vote(
    model: &str,
    kind: ModelKind,
    result: PredictionResult,
    anomaly_threshold: f64,
) -> Result<u32, PredictionError> {
    match (kind, result) {
        (ModelKind::ClassifierVote, PredictionResult::Label(label)) => Ok(u32::from(label == 0)),
        (ModelKind::ReconstructionAnomaly, PredictionResult::ReconstructionError(error)) => {
            if !error.is_finite() {
                return Err(PredictionError::UnexpectedOutput {
                    model: model.to_string(),
                    reason: format!("reconstruction error is {}", error),
                });
            }
            Ok(u32::from(error > anomaly_threshold))
        }
        (kind, result) => Err(PredictionError::UnexpectedOutput {
            model: model.to_string(),
            reason: format!("{} model produced {:?}", kind, result),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_votes_on_label_zero() {
        let kind = ModelKind::ClassifierVote;
        assert_eq!(vote("rf", kind, PredictionResult::Label(0), 5.0).unwrap(), 1);
        assert_eq!(vote("rf", kind, PredictionResult::Label(1), 5.0).unwrap(), 0);
    }

    #[test]
    fn test_anomaly_votes_strictly_above_threshold() {
        let kind = ModelKind::ReconstructionAnomaly;
        let at = |e| vote("ae", kind, PredictionResult::ReconstructionError(e), 5.0).unwrap();
        assert_eq!(at(10.0), 1);
        assert_eq!(at(5.0), 0);
        assert_eq!(at(0.1), 0);
    }

    #[test]
    fn test_mismatched_result_is_an_error() {
        let err = vote(
            "rf",
            ModelKind::ClassifierVote,
            PredictionResult::ReconstructionError(1.0),
            5.0,
        )
        .unwrap_err();
        assert!(matches!(err, PredictionError::UnexpectedOutput { .. }));

        let err = vote(
            "ae",
            ModelKind::ReconstructionAnomaly,
            PredictionResult::ReconstructionError(f64::NAN),
            5.0,
        )
        .unwrap_err();
        assert!(err.to_string().contains("NaN"));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ModelKind::ClassifierVote.to_string(), "classifier_vote");
        assert_eq!(ModelKind::ReconstructionAnomaly.as_str(), "reconstruction_anomaly");
    }
}
