#![allow(dead_code)]

use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;

use ferrite_trainer::data::{gaussian_blobs, InMemoryDataset};
use ferrite_trainer::tracking::{Histogram, Metrics, Params};
use ferrite_trainer::{TrackerBackend, TrackerError, TrainingConfig};

/// What a [`Recording`] backend has seen.
#[derive(Debug, Default)]
pub struct Seen {
    pub params: Vec<Params>,
    pub metrics: Vec<(usize, Metrics)>,
    pub histograms: Vec<(usize, String)>,
    pub artifacts: Vec<String>,
    pub images: Vec<String>,
    pub finishes: usize,
}

pub struct Recording(pub Arc<Mutex<Seen>>);

impl TrackerBackend for Recording {
    fn name(&self) -> &str {
        "recording"
    }
    fn log_params(&mut self, params: &Params) -> Result<(), TrackerError> {
        self.0.lock().unwrap().params.push(params.clone());
        Ok(())
    }
    fn log_metrics(&mut self, metrics: &Metrics, step: usize) -> Result<(), TrackerError> {
        self.0.lock().unwrap().metrics.push((step, metrics.clone()));
        Ok(())
    }
    fn log_histogram(&mut self, name: &str, _: &Histogram, step: usize) -> Result<(), TrackerError> {
        self.0.lock().unwrap().histograms.push((step, name.to_string()));
        Ok(())
    }
    fn log_artifact(&mut self, path: &Path) -> Result<(), TrackerError> {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        self.0.lock().unwrap().artifacts.push(name);
        Ok(())
    }
    fn log_image(&mut self, name: &str, _: &[u8]) -> Result<(), TrackerError> {
        self.0.lock().unwrap().images.push(name.to_string());
        Ok(())
    }
    fn finish(&mut self) -> Result<(), TrackerError> {
        self.0.lock().unwrap().finishes += 1;
        Ok(())
    }
}

/// Fails every call.
pub struct Unreachable;

impl TrackerBackend for Unreachable {
    fn name(&self) -> &str {
        "unreachable"
    }
    fn log_params(&mut self, _: &Params) -> Result<(), TrackerError> {
        Err(TrackerError::Backend("connection refused".into()))
    }
    fn log_metrics(&mut self, _: &Metrics, _: usize) -> Result<(), TrackerError> {
        Err(TrackerError::Backend("connection refused".into()))
    }
    fn log_histogram(&mut self, _: &str, _: &Histogram, _: usize) -> Result<(), TrackerError> {
        Err(TrackerError::Backend("connection refused".into()))
    }
    fn log_artifact(&mut self, _: &Path) -> Result<(), TrackerError> {
        Err(TrackerError::Backend("connection refused".into()))
    }
    fn log_image(&mut self, _: &str, _: &[u8]) -> Result<(), TrackerError> {
        Err(TrackerError::Backend("connection refused".into()))
    }
    fn finish(&mut self) -> Result<(), TrackerError> {
        Err(TrackerError::Backend("connection refused".into()))
    }
}

/// A request captured by [`FakeServer`].
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: String,
    pub url: String,
    pub body: String,
    pub authorization: Option<String>,
}

/// Minimal HTTP server answering from a routing closure `(method, url) ->
/// (status, body)` and recording every request.
pub struct FakeServer {
    pub url: String,
    pub requests: Arc<Mutex<Vec<Captured>>>,
}

impl FakeServer {
    pub fn start<F>(route: F) -> FakeServer
    where
        F: Fn(&str, &str) -> (u16, String) + Send + 'static,
    {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = requests.clone();

        thread::spawn(move || {
            for mut request in server.incoming_requests() {
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let method = request.method().to_string();
                let url = request.url().to_string();
                let authorization = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Authorization"))
                    .map(|h| h.value.to_string());
                let (status, reply) = route(&method, &url);
                log.lock().unwrap().push(Captured { method, url, body, authorization });
                let _ = request.respond(tiny_http::Response::from_string(reply).with_status_code(status));
            }
        });

        FakeServer { url: format!("http://127.0.0.1:{port}"), requests }
    }

    pub fn captured(&self) -> Vec<Captured> {
        self.requests.lock().unwrap().clone()
    }
}

/// MLflow-style server that opens runs but rejects every logging call.
pub fn broken_mlflow_server() -> FakeServer {
    FakeServer::start(|_, url| {
        if url.starts_with("/api/2.0/mlflow/experiments/get-by-name") {
            (200, r#"{"experiment":{"experiment_id":"7"}}"#.into())
        } else if url == "/api/2.0/mlflow/runs/create" {
            (200, r#"{"run":{"info":{"run_id":"abc123"}}}"#.into())
        } else {
            (500, r#"{"error_code":"INTERNAL_ERROR"}"#.into())
        }
    })
}

/// Event collector accepting everything.
pub fn event_collector() -> FakeServer {
    FakeServer::start(|_, url| {
        if url == "/api/v1/runs" {
            (200, r#"{"id":"run-1"}"#.into())
        } else {
            (200, "{}".into())
        }
    })
}

/// Four well-separated classes in 6 dimensions: (train, val, test).
pub fn blob_splits(batch_size: usize) -> (InMemoryDataset, InMemoryDataset, InMemoryDataset) {
    let (x, y) = gaussian_blobs(40, 4, 6, 0.4, 11);
    let all = InMemoryDataset::new(x, y, batch_size).unwrap();
    let (rest, test) = all.split(0.2, 1);
    let (train, val) = rest.split(0.2, 2);
    (train.shuffled(3), val, test)
}

pub fn quiet_config() -> TrainingConfig {
    let mut config = TrainingConfig::default();
    config.tracking.backends = "none".into();
    config
}
