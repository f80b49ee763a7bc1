//! Model loading, registry and ensemble scoring

pub mod loader;
pub mod onnx;
pub mod predictor;
pub mod registry;
pub mod scorer;

#[cfg(test)]
pub(crate) mod testing;

pub use loader::ModelLoader;
pub use predictor::{ModelKind, PredictionResult, Predictor};
pub use registry::{ModelRegistry, RegisteredModel};
pub use scorer::{EnsembleScorer, ScoreOutcome};
