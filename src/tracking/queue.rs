use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::warn;

use crate::error::TrackerError;
use crate::tracking::backend::{Metrics, Params, TrackerBackend};
use crate::tracking::histogram::Histogram;

enum Command {
    Params(Params),
    Metrics(Metrics, usize),
    Histogram(String, Histogram, usize),
    Artifact(PathBuf),
    Image(String, Vec<u8>),
    Finish(Sender<Result<(), TrackerError>>),
}

/// Moves a backend onto its own worker thread.
///
/// Calls are enqueued in order on an unbounded channel and return
/// immediately; the worker applies them in the same order, logging any
/// failure. `finish` blocks until the queue is drained or `flush_timeout`
/// elapses.
pub struct QueuedBackend {
    name: String,
    tx: Option<Sender<Command>>,
    worker: Option<JoinHandle<()>>,
    flush_timeout: Duration,
}

impl QueuedBackend {
    pub fn spawn(backend: Box<dyn TrackerBackend>, flush_timeout: Duration) -> Result<Self, TrackerError> {
        let name = backend.name().to_string();
        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name(format!("tracker-{name}"))
            .spawn(move || drain(backend, rx))?;
        Ok(QueuedBackend { name, tx: Some(tx), worker: Some(worker), flush_timeout })
    }

    fn enqueue(&self, command: Command) -> Result<(), TrackerError> {
        self.tx
            .as_ref()
            .ok_or(TrackerError::Closed)?
            .send(command)
            .map_err(|_| TrackerError::Closed)
    }
}

fn drain(mut backend: Box<dyn TrackerBackend>, rx: Receiver<Command>) {
    for command in rx {
        let (op, result) = match command {
            Command::Params(p) => ("log_params", backend.log_params(&p)),
            Command::Metrics(m, step) => ("log_metrics", backend.log_metrics(&m, step)),
            Command::Histogram(name, h, step) => ("log_histogram", backend.log_histogram(&name, &h, step)),
            Command::Artifact(path) => ("log_artifact", backend.log_artifact(&path)),
            Command::Image(name, png) => ("log_image", backend.log_image(&name, &png)),
            Command::Finish(reply) => {
                let _ = reply.send(backend.finish());
                return;
            }
        };
        if let Err(err) = result {
            warn!(backend = backend.name(), op, error = %err, "queued tracker call failed");
        }
    }
}

impl TrackerBackend for QueuedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn log_params(&mut self, params: &Params) -> Result<(), TrackerError> {
        self.enqueue(Command::Params(params.clone()))
    }

    fn log_metrics(&mut self, metrics: &Metrics, step: usize) -> Result<(), TrackerError> {
        self.enqueue(Command::Metrics(metrics.clone(), step))
    }

    fn log_histogram(&mut self, name: &str, histogram: &Histogram, step: usize) -> Result<(), TrackerError> {
        self.enqueue(Command::Histogram(name.to_string(), histogram.clone(), step))
    }

    fn log_artifact(&mut self, path: &Path) -> Result<(), TrackerError> {
        self.enqueue(Command::Artifact(path.to_path_buf()))
    }

    fn log_image(&mut self, name: &str, png: &[u8]) -> Result<(), TrackerError> {
        self.enqueue(Command::Image(name.to_string(), png.to_vec()))
    }

    fn finish(&mut self) -> Result<(), TrackerError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.enqueue(Command::Finish(reply_tx))?;
        self.tx = None;

        let outcome = match reply_rx.recv_timeout(self.flush_timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => return Err(TrackerError::FlushTimeout(self.flush_timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(TrackerError::Closed),
        };
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<usize>>>);

    impl TrackerBackend for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }
        fn log_params(&mut self, _: &Params) -> Result<(), TrackerError> {
            Ok(())
        }
        fn log_metrics(&mut self, _: &Metrics, step: usize) -> Result<(), TrackerError> {
            thread::sleep(Duration::from_millis(1));
            self.0.lock().unwrap().push(step);
            Ok(())
        }
        fn log_histogram(&mut self, _: &str, _: &Histogram, _: usize) -> Result<(), TrackerError> {
            Ok(())
        }
        fn log_artifact(&mut self, _: &Path) -> Result<(), TrackerError> {
            Ok(())
        }
        fn log_image(&mut self, _: &str, _: &[u8]) -> Result<(), TrackerError> {
            Ok(())
        }
        fn finish(&mut self) -> Result<(), TrackerError> {
            Ok(())
        }
    }

    #[test]
    fn finish_flushes_every_event_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut queued = QueuedBackend::spawn(Box::new(Recorder(seen.clone())), Duration::from_secs(5)).unwrap();
        for step in 1..=20 {
            queued.log_metrics(&Metrics::from([("loss".to_string(), 0.5)]), step).unwrap();
        }
        queued.finish().unwrap();
        assert_eq!(*seen.lock().unwrap(), (1..=20).collect::<Vec<_>>());
        assert!(matches!(queued.log_metrics(&Metrics::new(), 21), Err(TrackerError::Closed)));
    }
}
