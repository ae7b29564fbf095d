//! Scalar and aggregate statistics over predictions and labels.

pub mod classification;
pub mod meter;

pub use classification::{
    accuracy, classification_report, ClassScores, ClassificationMetrics, ConfusionMatrix,
};
pub use meter::AverageMeter;
