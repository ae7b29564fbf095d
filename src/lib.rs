pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod metrics;
pub mod optim;
pub mod data;
pub mod checkpoint;
pub mod tracking;
pub mod report;
pub mod train;
pub mod error;

// Convenience re-exports
pub use math::matrix::Matrix;
pub use activation::activation::ActivationFunction;
pub use network::{Mlp, Model, NetworkSpec};
pub use data::{Batch, DataSource, InMemoryDataset};
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use tracking::{Tracker, TrackerBackend, TrackingConfig};
pub use train::{run, EpochResult, StopReason, Trainer, TrainingConfig, TrainingHistory, TrainingReport};
pub use error::{BatchError, ConfigError, EpochExhausted, PersistenceError, TrackerError, TrainError};
