//! ONNX Runtime backed predictors.
//!
//! Classifiers (e.g. an exported random forest) report a class label;
//! autoencoders report a reconstruction of their input, from which the mean
//! squared error is computed.

use crate::error::{ArtifactLoadError, PredictionError};
use crate::models::predictor::{ModelKind, PredictionResult, Predictor};
use crate::types::FeatureRecord;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// A committed ONNX session with its resolved input and output names.
///
/// The runtime needs exclusive access to run a session, so runs are
/// serialized per model. Weights are never modified after load.
struct OnnxSession {
    model: String,
    session: Mutex<Session>,
    input_name: String,
    output_names: Vec<String>,
}

impl OnnxSession {
    fn from_bytes(
        model: &str,
        path: &Path,
        kind: ModelKind,
        bytes: &[u8],
        threads: usize,
    ) -> Result<Self, ArtifactLoadError> {
        let incompatible = |reason: String| ArtifactLoadError::Incompatible {
            model: model.to_string(),
            path: path.to_path_buf(),
            kind: kind.as_str(),
            reason,
        };

        let session = Session::builder()
            .map_err(|e| incompatible(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| incompatible(e.to_string()))?
            .with_intra_threads(threads)
            .map_err(|e| incompatible(e.to_string()))?
            .commit_from_memory(bytes)
            .map_err(|e| incompatible(e.to_string()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| incompatible("graph declares no inputs".into()))?;

        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        if output_names.is_empty() {
            return Err(incompatible("graph declares no outputs".into()));
        }

        info!(
            model = %model,
            kind = %kind,
            input = %input_name,
            outputs = ?output_names,
            threads = threads,
            "ONNX session ready"
        );

        Ok(Self {
            model: model.to_string(),
            session: Mutex::new(session),
            input_name,
            output_names,
        })
    }

    /// Run the graph on one row and hand the outputs to `extract`
    fn run<T>(
        &self,
        features: Vec<f32>,
        extract: impl FnOnce(&SessionOutputs) -> Result<T, PredictionError>,
    ) -> Result<T, PredictionError> {
        let shape = vec![1_i64, features.len() as i64];
        let input = Tensor::from_array((shape, features)).map_err(|e| self.runtime(e))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| self.runtime("session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs![&self.input_name => input])
            .map_err(|e| self.runtime(e))?;

        extract(&outputs)
    }

    fn runtime(&self, reason: impl ToString) -> PredictionError {
        PredictionError::Runtime {
            model: self.model.clone(),
            reason: reason.to_string(),
        }
    }

    fn unexpected(&self, reason: impl Into<String>) -> PredictionError {
        PredictionError::UnexpectedOutput {
            model: self.model.clone(),
            reason: reason.into(),
        }
    }
}

/// Classifier graph producing a class label
pub struct OnnxClassifier {
    inner: OnnxSession,
    /// Output carrying the int64 label, if the graph names one
    label_output: Option<String>,
}

impl OnnxClassifier {
    pub fn from_bytes(
        model: &str,
        path: &Path,
        bytes: &[u8],
        threads: usize,
    ) -> Result<Self, ArtifactLoadError> {
        let inner = OnnxSession::from_bytes(model, path, ModelKind::ClassifierVote, bytes, threads)?;
        let label_output = inner
            .output_names
            .iter()
            .find(|name| name.contains("label"))
            .cloned();
        Ok(Self {
            inner,
            label_output,
        })
    }

    fn extract_label(&self, outputs: &SessionOutputs) -> Result<i64, PredictionError> {
        if let Some(name) = &self.label_output {
            if let Some(output) = outputs.get(name.as_str()) {
                if let Ok((_, data)) = output.try_extract_tensor::<i64>() {
                    if let Some(&label) = data.first() {
                        return Ok(label);
                    }
                }
            }
        }

        // No named label: first int64 output, then a probability/score tensor
        for name in &self.inner.output_names {
            let Some(output) = outputs.get(name.as_str()) else {
                continue;
            };
            if let Ok((_, data)) = output.try_extract_tensor::<i64>() {
                if let Some(&label) = data.first() {
                    return Ok(label);
                }
            }
        }
        for name in &self.inner.output_names {
            let Some(output) = outputs.get(name.as_str()) else {
                continue;
            };
            if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
                let dims: Vec<i64> = shape.iter().copied().collect();
                if let Some(label) = label_from_scores(&dims, data) {
                    debug!(model = %self.inner.model, output = %name, label = label, "Label derived from scores");
                    return Ok(label);
                }
            }
        }

        Err(self.inner.unexpected("no label or score output found"))
    }
}

impl Predictor for OnnxClassifier {
    fn kind(&self) -> ModelKind {
        ModelKind::ClassifierVote
    }

    fn predict(&self, record: &FeatureRecord) -> Result<PredictionResult, PredictionError> {
        let label = self
            .inner
            .run(record.to_f32(), |outputs| self.extract_label(outputs))?;
        Ok(PredictionResult::Label(label))
    }
}

/// Autoencoder graph reconstructing its input
pub struct OnnxAutoencoder {
    inner: OnnxSession,
}

impl OnnxAutoencoder {
    pub fn from_bytes(
        model: &str,
        path: &Path,
        bytes: &[u8],
        threads: usize,
    ) -> Result<Self, ArtifactLoadError> {
        let inner =
            OnnxSession::from_bytes(model, path, ModelKind::ReconstructionAnomaly, bytes, threads)?;
        Ok(Self { inner })
    }
}

impl Predictor for OnnxAutoencoder {
    fn kind(&self) -> ModelKind {
        ModelKind::ReconstructionAnomaly
    }

    fn predict(&self, record: &FeatureRecord) -> Result<PredictionResult, PredictionError> {
        let features = record.to_f32();
        let reconstruction = self.inner.run(features.clone(), |outputs| {
            let name = &self.inner.output_names[0];
            let output = outputs
                .get(name.as_str())
                .ok_or_else(|| self.inner.unexpected(format!("missing output '{}'", name)))?;
            let (_, data) = output
                .try_extract_tensor::<f32>()
                .map_err(|e| self.inner.unexpected(e.to_string()))?;
            Ok(data.to_vec())
        })?;

        if reconstruction.len() != features.len() {
            return Err(PredictionError::ArityMismatch {
                model: self.inner.model.clone(),
                expected: features.len(),
                actual: reconstruction.len(),
            });
        }
        Ok(PredictionResult::ReconstructionError(mean_squared_error(
            &features,
            &reconstruction,
        )))
    }
}

/// Mean of squared element-wise differences
pub fn mean_squared_error(input: &[f32], reconstruction: &[f32]) -> f64 {
    if input.is_empty() {
        return 0.0;
    }
    let sum: f64 = input
        .iter()
        .zip(reconstruction)
        .map(|(&x, &y)| (x as f64 - y as f64).powi(2))
        .sum();
    sum / input.len() as f64
}

/// Label from a score tensor: argmax over `[1, n >= 2]` or `[n >= 2]`,
/// `score > 0.5` for a single value
fn label_from_scores(dims: &[i64], data: &[f32]) -> Option<i64> {
    let classes = match dims {
        [_, n] | [n] => *n as usize,
        _ => data.len(),
    };
    let row = data.get(..classes)?;
    match row.len() {
        0 => None,
        1 => Some(i64::from(row[0] > 0.5)),
        _ => row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, _)| idx as i64),
    }
}
