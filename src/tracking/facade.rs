use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{ConfigError, TrackerError};
use crate::tracking::backend::{BackendKind, Metrics, Params, TrackerBackend};
use crate::tracking::config::TrackingConfig;
use crate::tracking::histogram::{Histogram, DEFAULT_BINS};
use crate::tracking::local::LocalTracker;
use crate::tracking::noop::NoOpTracker;
use crate::tracking::queue::QueuedBackend;
use crate::tracking::remote_a::RemoteTrackerA;
use crate::tracking::remote_b::RemoteTrackerB;

/// Fans every call out to the active backends.
///
/// Backend errors are logged and swallowed per backend and per call, so one
/// failing integration never hides events from the others and never reaches
/// the training loop. After [`finish`](Tracker::finish) every method is a
/// silent no-op. Dropping an unfinished tracker finishes it.
pub struct Tracker {
    backends: Vec<Box<dyn TrackerBackend>>,
    histogram_bins: usize,
    finished: bool,
}

impl Tracker {
    pub fn new(backends: Vec<Box<dyn TrackerBackend>>) -> Self {
        Tracker { backends, histogram_bins: DEFAULT_BINS, finished: false }
    }

    /// A facade with a single [`NoOpTracker`].
    pub fn disabled() -> Self {
        Tracker::new(vec![Box::new(NoOpTracker)])
    }

    pub fn with_histogram_bins(mut self, bins: usize) -> Self {
        self.histogram_bins = bins.max(1);
        self
    }

    /// Opens every backend named in `config.backends`.
    ///
    /// An unknown tag is a [`ConfigError`]. A backend whose session cannot
    /// be opened is logged and left out; the run proceeds with the rest.
    pub fn from_config(config: &TrackingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut backends: Vec<Box<dyn TrackerBackend>> = Vec::new();
        for kind in config.selection()? {
            match open_backend(kind, config) {
                Ok(backend) => {
                    info!(backend = %kind, "tracking backend ready");
                    backends.push(backend);
                }
                Err(err) => warn!(backend = %kind, error = %err, "could not open tracking backend, continuing without it"),
            }
        }
        Ok(Tracker::new(backends).with_histogram_bins(config.histogram_bins))
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn log_params(&mut self, params: &Params) {
        self.dispatch("log_params", |b| b.log_params(params));
    }

    pub fn log_metrics(&mut self, metrics: &Metrics, step: usize) {
        self.dispatch("log_metrics", |b| b.log_metrics(metrics, step));
    }

    /// Summarises `values` into a fixed-bucket histogram once and forwards
    /// the summary; the tensor itself is only borrowed.
    pub fn log_histogram<'a, I>(&mut self, name: &str, values: I, step: usize)
    where
        I: IntoIterator<Item = &'a f64>,
        I::IntoIter: Clone,
    {
        if self.finished {
            return;
        }
        let histogram = Histogram::from_values(values.into_iter(), self.histogram_bins);
        self.dispatch("log_histogram", |b| b.log_histogram(name, &histogram, step));
    }

    pub fn log_artifact(&mut self, path: &Path) {
        self.dispatch("log_artifact", |b| b.log_artifact(path));
    }

    pub fn log_image(&mut self, name: &str, png: &[u8]) {
        self.dispatch("log_image", |b| b.log_image(name, png));
    }

    /// Closes every backend exactly once. Later calls do nothing.
    pub fn finish(&mut self) {
        self.dispatch("finish", |b| b.finish());
        self.finished = true;
    }

    fn dispatch<F>(&mut self, op: &'static str, mut call: F)
    where
        F: FnMut(&mut dyn TrackerBackend) -> Result<(), TrackerError>,
    {
        if self.finished {
            return;
        }
        for backend in self.backends.iter_mut() {
            if let Err(err) = call(backend.as_mut()) {
                warn!(backend = backend.name(), op, error = %err, "tracking call failed");
            }
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.finish();
    }
}

fn open_backend(kind: BackendKind, config: &TrackingConfig) -> Result<Box<dyn TrackerBackend>, TrackerError> {
    let run_name = config.run_name.as_deref();
    let backend: Box<dyn TrackerBackend> = match kind {
        BackendKind::None => return Ok(Box::new(NoOpTracker)),
        BackendKind::Local => Box::new(LocalTracker::create(
            &config.local_dir,
            &config.experiment_name,
            run_name,
            &config.tags,
        )?),
        BackendKind::RemoteA => Box::new(RemoteTrackerA::open(
            &config.remote_a,
            &config.experiment_name,
            run_name,
            &config.tags,
        )?),
        BackendKind::RemoteB => Box::new(RemoteTrackerB::open(
            &config.remote_b,
            &config.experiment_name,
            run_name,
            &config.tags,
        )?),
    };
    if config.async_dispatch {
        let queued = QueuedBackend::spawn(backend, Duration::from_secs(config.flush_timeout_secs))?;
        return Ok(Box::new(queued));
    }
    Ok(backend)
}
