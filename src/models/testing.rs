//! Deterministic predictors for tests

use crate::error::PredictionError;
use crate::models::predictor::{ModelKind, PredictionResult, Predictor};
use crate::types::FeatureRecord;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Classifier that always predicts the same label
pub struct FixedLabel(pub i64);

impl Predictor for FixedLabel {
    fn kind(&self) -> ModelKind {
        ModelKind::ClassifierVote
    }

    fn predict(&self, _record: &FeatureRecord) -> Result<PredictionResult, PredictionError> {
        Ok(PredictionResult::Label(self.0))
    }
}

/// Autoencoder that always reports the same reconstruction error
pub struct FixedError(pub f64);

impl Predictor for FixedError {
    fn kind(&self) -> ModelKind {
        ModelKind::ReconstructionAnomaly
    }

    fn predict(&self, _record: &FeatureRecord) -> Result<PredictionResult, PredictionError> {
        Ok(PredictionResult::ReconstructionError(self.0))
    }
}

/// Classifier whose label is `0` when the first feature is negative
pub struct SignOfFirst;

impl Predictor for SignOfFirst {
    fn kind(&self) -> ModelKind {
        ModelKind::ClassifierVote
    }

    fn predict(&self, record: &FeatureRecord) -> Result<PredictionResult, PredictionError> {
        let first = record.values().first().copied().unwrap_or_default();
        Ok(PredictionResult::Label(i64::from(first >= 0.0)))
    }
}

/// Always fails
pub struct Failing;

impl Predictor for Failing {
    fn kind(&self) -> ModelKind {
        ModelKind::ClassifierVote
    }

    fn predict(&self, _record: &FeatureRecord) -> Result<PredictionResult, PredictionError> {
        Err(PredictionError::Runtime {
            model: "failing".into(),
            reason: "boom".into(),
        })
    }
}

/// Wraps a predictor and counts how often it is called
pub struct Counting<P> {
    pub inner: P,
    pub calls: Arc<AtomicUsize>,
}

impl<P: Predictor> Counting<P> {
    pub fn new(inner: P) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl<P: Predictor> Predictor for Counting<P> {
    fn kind(&self) -> ModelKind {
        self.inner.kind()
    }

    fn predict(&self, record: &FeatureRecord) -> Result<PredictionResult, PredictionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.predict(record)
    }
}

pub fn record(values: &[f64]) -> FeatureRecord {
    FeatureRecord::from_pairs(values.iter().enumerate().map(|(i, &v)| (format!("V{}", i + 1), v)))
        .unwrap()
}

/// Wraps a predictor and blocks for `delay` before answering
pub struct Slow<P> {
    pub inner: P,
    pub delay: std::time::Duration,
}

impl<P: Predictor> Predictor for Slow<P> {
    fn kind(&self) -> ModelKind {
        self.inner.kind()
    }

    fn predict(&self, record: &FeatureRecord) -> Result<PredictionResult, PredictionError> {
        std::thread::sleep(self.delay);
        self.inner.predict(record)
    }
}
