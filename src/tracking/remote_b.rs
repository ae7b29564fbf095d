use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::error::TrackerError;
use crate::tracking::backend::{Metrics, Params, TrackerBackend};
use crate::tracking::config::RemoteConfig;
use crate::tracking::histogram::Histogram;
use crate::tracking::http::HttpClient;

/// One entry of the run's event stream, as posted to
/// `/api/v1/runs/{id}/events`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Event<'a> {
    Params { params: &'a Params },
    Metrics { step: usize, metrics: &'a Metrics },
    Histogram { name: &'a str, step: usize, bin_edges: Vec<f64>, histogram: &'a Histogram },
    Artifact { name: String, data: String },
    Image { name: &'a str, format: &'static str, data: String },
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    event: Event<'a>,
}

/// Client for an event-stream run collector.
///
/// `POST /api/v1/runs` opens a run; every facade call becomes one typed
/// event; `POST /api/v1/runs/{id}/finish` closes it. Binary payloads are
/// base64 encoded.
pub struct RemoteTrackerB {
    http: HttpClient,
    run_id: String,
}

impl RemoteTrackerB {
    pub fn open(
        config: &RemoteConfig,
        project: &str,
        run_name: Option<&str>,
        tags: &[String],
    ) -> Result<Self, TrackerError> {
        let http = HttpClient::new(config, "tracking.remote_b.url")?;
        let created = http.post_json(
            "/api/v1/runs",
            &json!({ "project": project, "name": run_name, "tags": tags, "job_type": "train" }),
        )?;
        let run_id = created["id"]
            .as_str()
            .ok_or_else(|| TrackerError::Backend("run creation response has no id".into()))?
            .to_string();
        Ok(RemoteTrackerB { http, run_id })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn send(&self, event: Event<'_>) -> Result<(), TrackerError> {
        let endpoint = format!("/api/v1/runs/{}/events", self.run_id);
        self.http.post_json(&endpoint, &Envelope { timestamp: Utc::now(), event })?;
        Ok(())
    }
}

impl TrackerBackend for RemoteTrackerB {
    fn name(&self) -> &str {
        "remote-b"
    }

    fn log_params(&mut self, params: &Params) -> Result<(), TrackerError> {
        self.send(Event::Params { params })
    }

    fn log_metrics(&mut self, metrics: &Metrics, step: usize) -> Result<(), TrackerError> {
        self.send(Event::Metrics { step, metrics })
    }

    fn log_histogram(&mut self, name: &str, histogram: &Histogram, step: usize) -> Result<(), TrackerError> {
        self.send(Event::Histogram { name, step, bin_edges: histogram.edges(), histogram })
    }

    fn log_artifact(&mut self, path: &Path) -> Result<(), TrackerError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TrackerError::Backend(format!("{} has no file name", path.display())))?
            .to_string();
        let data = STANDARD.encode(std::fs::read(path)?);
        self.send(Event::Artifact { name, data })
    }

    fn log_image(&mut self, name: &str, png: &[u8]) -> Result<(), TrackerError> {
        self.send(Event::Image { name, format: "png", data: STANDARD.encode(png) })
    }

    fn finish(&mut self) -> Result<(), TrackerError> {
        let endpoint = format!("/api/v1/runs/{}/finish", self.run_id);
        self.http.post_json(&endpoint, &json!({ "exit_code": 0 }))?;
        Ok(())
    }
}
