//! Error types for model loading, request decoding and scoring

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A model artifact could not be turned into a predictor.
///
/// Always fatal at startup: the server never accepts connections with a
/// partially loaded registry.
#[derive(Debug, Error)]
pub enum ArtifactLoadError {
    #[error("model '{model}': artifact not found at {path}")]
    Missing { model: String, path: PathBuf },

    #[error("model '{model}': cannot read artifact {path}: {source}")]
    Unreadable {
        model: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("model '{model}': artifact {path} is not a valid {kind} model: {reason}")]
    Incompatible {
        model: String,
        path: PathBuf,
        kind: &'static str,
        reason: String,
    },
}

impl ArtifactLoadError {
    /// Name of the model whose artifact failed to load
    pub fn model(&self) -> &str {
        match self {
            Self::Missing { model, .. }
            | Self::Unreadable { model, .. }
            | Self::Incompatible { model, .. } => model,
        }
    }
}

/// The request bytes could not be decoded into a feature record.
#[derive(Debug, Error, PartialEq)]
pub enum RequestDecodeError {
    #[error("empty request")]
    Empty,

    #[error("request exceeds {limit} bytes")]
    Oversized { limit: usize },

    #[error("request is not valid UTF-8")]
    InvalidUtf8,

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request contains no rows")]
    NoRows,

    #[error("request contains {0} rows, expected exactly one")]
    MultipleRows(usize),

    #[error("field '{0}' is not numeric")]
    NonNumeric(String),

    #[error("field '{0}' is not a finite number")]
    NonFinite(String),

    #[error("field '{0}' is outside the single-precision range")]
    OutOfRange(String),
}

/// A predictor failed while evaluating a record.
#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("model '{model}': inference failed: {reason}")]
    Runtime { model: String, reason: String },

    #[error("model '{model}': reconstruction has {actual} values for {expected} features")]
    ArityMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },

    #[error("model '{model}': unexpected output: {reason}")]
    UnexpectedOutput { model: String, reason: String },
}

/// Configuration could not be loaded or is semantically invalid.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The server could not be started.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Artifact(#[from] ArtifactLoadError),

    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Failure of a single connection. Never escapes the connection's task.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Decode(#[from] RequestDecodeError),

    #[error(transparent)]
    Prediction(#[from] PredictionError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("scoring task failed: {0}")]
    Task(String),
}

impl HandlerError {
    /// Short label used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Prediction(_) => "inference",
            Self::Io(_) | Self::Timeout(_) => "io",
            Self::Task(_) => "task",
        }
    }
}
