use std::path::Path;

use crate::error::TrackerError;
use crate::tracking::backend::{Metrics, Params, TrackerBackend};
use crate::tracking::histogram::Histogram;

/// Accepts and discards everything. Selected by `"none"`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpTracker;

impl TrackerBackend for NoOpTracker {
    fn name(&self) -> &str {
        "none"
    }

    fn log_params(&mut self, _params: &Params) -> Result<(), TrackerError> {
        Ok(())
    }

    fn log_metrics(&mut self, _metrics: &Metrics, _step: usize) -> Result<(), TrackerError> {
        Ok(())
    }

    fn log_histogram(&mut self, _name: &str, _histogram: &Histogram, _step: usize) -> Result<(), TrackerError> {
        Ok(())
    }

    fn log_artifact(&mut self, _path: &Path) -> Result<(), TrackerError> {
        Ok(())
    }

    fn log_image(&mut self, _name: &str, _png: &[u8]) -> Result<(), TrackerError> {
        Ok(())
    }

    fn finish(&mut self) -> Result<(), TrackerError> {
        Ok(())
    }
}
