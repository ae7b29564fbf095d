//! Error types for training, checkpointing and experiment tracking.
//!
//! Only [`ConfigError`] and [`EpochExhausted`] ever end a run early. Everything
//! else is recovered from where it happens and surfaced through `tracing`.

use std::path::PathBuf;

use thiserror::Error;

/// Invalid or missing configuration. Raised before any epoch executes.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown optimizer `{0}` (expected `sgd` or `adam`)")]
    UnknownOptimizer(String),

    #[error("unknown scheduler `{0}` (expected `none`, `step`, `cosine` or `plateau`)")]
    UnknownScheduler(String),

    #[error("unknown tracking backend `{0}` (expected `none`, `local`, `remote-a` or `remote-b`)")]
    UnknownTracker(String),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue { field, reason: reason.into() }
    }
}

/// A single batch could not be used for an update. The batch is skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BatchError {
    #[error("non-finite loss ({0})")]
    NonFiniteLoss(f64),

    #[error("non-finite gradient norm ({0})")]
    NonFiniteGradient(f64),

    #[error("shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },

    #[error("label {label} out of range for {classes} classes")]
    LabelOutOfRange { label: usize, classes: usize },

    #[error("empty batch")]
    Empty,
}

/// Which data split a pass was iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Validation,
    Test,
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Split::Train => "train",
            Split::Validation => "validation",
            Split::Test => "test",
        })
    }
}

/// An epoch pass produced zero valid batches.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("epoch {epoch}: {split} pass yielded no valid batches ({skipped} skipped)")]
pub struct EpochExhausted {
    pub epoch: usize,
    pub split: Split,
    pub skipped: usize,
}

/// Reading or writing a checkpoint failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("checkpoint I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint encoding error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("state does not match model: {0}")]
    StateMismatch(String),

    #[error("no checkpoint has been captured yet")]
    NoCheckpoint,
}

impl PersistenceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// A tracking backend call failed. Isolated at the facade boundary.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server rejected request to {endpoint} with status {status}: {body}")]
    Rejected { endpoint: String, status: u16, body: String },

    #[error("backend is closed")]
    Closed,

    #[error("flush did not complete within {0:?}")]
    FlushTimeout(std::time::Duration),

    #[error("{0}")]
    Backend(String),
}

/// Writing the end-of-run reports failed. Logged, never fatal.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("nothing to plot: {0}")]
    Empty(&'static str),
}

/// Errors that end `Trainer::run` without a report. An exhausted epoch is
/// not one of them: it returns the partial report with `StopReason::Aborted`.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}
