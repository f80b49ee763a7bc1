//! Model artifact loader

use crate::config::ModelSpec;
use crate::error::ArtifactLoadError;
use crate::models::onnx::{OnnxAutoencoder, OnnxClassifier};
use crate::models::predictor::{ModelKind, Predictor};
use crate::models::registry::ModelRegistry;
use std::fs;
use tracing::{error, info};

/// Turns model specs into predictors.
///
/// The codec is chosen from the declared kind, never from the file name.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModelLoader;

impl ModelLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a single model
    pub fn load(&self, spec: &ModelSpec) -> Result<Box<dyn Predictor>, ArtifactLoadError> {
        let path = spec.artifact_path.as_path();

        info!(
            model = %spec.name,
            kind = %spec.kind,
            path = %path.display(),
            "Loading model artifact"
        );

        if !path.exists() {
            return Err(ArtifactLoadError::Missing {
                model: spec.name.clone(),
                path: path.to_path_buf(),
            });
        }

        let bytes = fs::read(path).map_err(|source| ArtifactLoadError::Unreadable {
            model: spec.name.clone(),
            path: path.to_path_buf(),
            source,
        })?;

        let predictor: Box<dyn Predictor> = match spec.kind {
            ModelKind::ClassifierVote => Box::new(OnnxClassifier::from_bytes(
                &spec.name,
                path,
                &bytes,
                spec.threads,
            )?),
            ModelKind::ReconstructionAnomaly => Box::new(OnnxAutoencoder::from_bytes(
                &spec.name,
                path,
                &bytes,
                spec.threads,
            )?),
        };

        info!(model = %spec.name, bytes = bytes.len(), "Model loaded successfully");
        Ok(predictor)
    }

    /// Load every model in order. The first failure aborts the whole load;
    /// a registry is never built from a subset of the configured models.
    pub fn load_all(&self, specs: &[ModelSpec]) -> Result<ModelRegistry, ArtifactLoadError> {
        let mut registry = ModelRegistry::new();

        for spec in specs {
            match self.load(spec) {
                Ok(predictor) => registry.register(spec.name.clone(), predictor),
                Err(e) => {
                    error!(model = %spec.name, error = %e, "Failed to load model");
                    return Err(e);
                }
            }
        }

        info!(
            count = registry.len(),
            models = ?registry.names(),
            "Model registry ready"
        );

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ModelSpec::new(
            "Random forest",
            ModelKind::ClassifierVote,
            dir.path().join("model1.onnx"),
        );

        let err = ModelLoader::new().load(&spec).err().unwrap();
        assert!(matches!(err, ArtifactLoadError::Missing { .. }));
        assert_eq!(err.model(), "Random forest");
    }

    #[test]
    fn test_unreadable_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ModelSpec::new("ae", ModelKind::ReconstructionAnomaly, dir.path());

        let err = ModelLoader::new().load(&spec).err().unwrap();
        assert!(matches!(err, ArtifactLoadError::Unreadable { .. }));
    }

    #[test]
    fn test_corrupt_artifact_is_incompatible() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fraud_dl.h5");
        fs::write(&path, b"\x89HDF\r\n\x1a\n not an onnx graph").unwrap();
        let spec = ModelSpec::new("Autoencoder", ModelKind::ReconstructionAnomaly, &path);

        let err = ModelLoader::new().load(&spec).err().unwrap();
        assert!(matches!(
            err,
            ArtifactLoadError::Incompatible {
                kind: "reconstruction_anomaly",
                ..
            }
        ));
    }

    #[test]
    fn test_load_all_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let specs = vec![
            ModelSpec::new("first", ModelKind::ClassifierVote, dir.path().join("a.onnx")),
            ModelSpec::new("second", ModelKind::ClassifierVote, dir.path().join("b.onnx")),
        ];

        let err = ModelLoader::new().load_all(&specs).err().unwrap();
        assert_eq!(err.model(), "first");
    }
}
