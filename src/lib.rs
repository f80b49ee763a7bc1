//! Ensemble Scoring Server Library
//!
//! Loads several independently trained models, listens for scoring requests
//! over TCP, lets every model vote on the submitted record and answers with a
//! pass/fail verdict plus the vote count.

pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod models;
pub mod server;
pub mod types;

pub use config::{AppConfig, ModelSpec, ScoringConfig, ServerConfig};
pub use error::{ArtifactLoadError, HandlerError, PredictionError, RequestDecodeError, ServerError};
pub use handler::ConnectionHandler;
pub use models::{EnsembleScorer, ModelKind, ModelLoader, ModelRegistry, PredictionResult, Predictor};
pub use server::{ScoringServer, ServerHandle};
pub use types::{FeatureRecord, Verdict};
