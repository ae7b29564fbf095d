use std::path::Path;

use chrono::Utc;
use serde_json::{json, Value};

use crate::error::TrackerError;
use crate::tracking::backend::{Metrics, Params, TrackerBackend};
use crate::tracking::config::RemoteConfig;
use crate::tracking::histogram::Histogram;
use crate::tracking::http::HttpClient;

// Server-side limits of `runs/log-batch`.
const MAX_PARAMS_PER_BATCH: usize = 100;
const MAX_METRICS_PER_BATCH: usize = 1000;

/// Client for an MLflow-compatible tracking server (REST API 2.0).
///
/// Opening the backend resolves (or creates) the experiment by name and
/// starts a run; artifacts go through the server's artifact proxy.
pub struct RemoteTrackerA {
    http: HttpClient,
    experiment_id: String,
    run_id: String,
}

impl RemoteTrackerA {
    pub fn open(
        config: &RemoteConfig,
        experiment: &str,
        run_name: Option<&str>,
        tags: &[String],
    ) -> Result<Self, TrackerError> {
        let http = HttpClient::new(config, "tracking.remote_a.url")?;
        let experiment_id = resolve_experiment(&http, experiment)?;

        let mut run_tags: Vec<Value> = tags
            .iter()
            .map(|t| json!({ "key": t, "value": "true" }))
            .collect();
        if let Some(name) = run_name {
            run_tags.push(json!({ "key": "mlflow.runName", "value": name }));
        }
        let mut body = json!({
            "experiment_id": experiment_id,
            "start_time": Utc::now().timestamp_millis(),
            "tags": run_tags,
        });
        if let Some(name) = run_name {
            body["run_name"] = json!(name);
        }
        let created = http.post_json("/api/2.0/mlflow/runs/create", &body)?;
        let run_id = created["run"]["info"]["run_id"]
            .as_str()
            .ok_or_else(|| TrackerError::Backend("runs/create response has no run_id".into()))?
            .to_string();

        Ok(RemoteTrackerA { http, experiment_id, run_id })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn log_batch(&self, params: &[Value], metrics: &[Value]) -> Result<(), TrackerError> {
        self.http.post_json(
            "/api/2.0/mlflow/runs/log-batch",
            &json!({ "run_id": self.run_id, "params": params, "metrics": metrics, "tags": [] }),
        )?;
        Ok(())
    }

    fn upload(&self, relative: &str, bytes: Vec<u8>) -> Result<(), TrackerError> {
        let endpoint = format!(
            "/api/2.0/mlflow-artifacts/artifacts/{}/{}/artifacts/{}",
            self.experiment_id, self.run_id, relative
        );
        self.http.put_bytes(&endpoint, bytes)
    }
}

fn resolve_experiment(http: &HttpClient, name: &str) -> Result<String, TrackerError> {
    match http.get_json("/api/2.0/mlflow/experiments/get-by-name", &[("experiment_name", name)]) {
        Ok(found) => found["experiment"]["experiment_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| TrackerError::Backend("get-by-name response has no experiment_id".into())),
        Err(TrackerError::Rejected { status: 404, .. }) => {
            let created = http.post_json("/api/2.0/mlflow/experiments/create", &json!({ "name": name }))?;
            created["experiment_id"]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| TrackerError::Backend("experiments/create response has no experiment_id".into()))
        }
        Err(err) => Err(err),
    }
}

impl TrackerBackend for RemoteTrackerA {
    fn name(&self) -> &str {
        "remote-a"
    }

    fn log_params(&mut self, params: &Params) -> Result<(), TrackerError> {
        let entries: Vec<Value> = params
            .iter()
            .map(|(k, v)| json!({ "key": k, "value": v }))
            .collect();
        for chunk in entries.chunks(MAX_PARAMS_PER_BATCH) {
            self.log_batch(chunk, &[])?;
        }
        Ok(())
    }

    fn log_metrics(&mut self, metrics: &Metrics, step: usize) -> Result<(), TrackerError> {
        let timestamp = Utc::now().timestamp_millis();
        // NaN is not valid JSON; the server never sees non-finite values.
        let entries: Vec<Value> = metrics
            .iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(k, v)| json!({ "key": k, "value": v, "timestamp": timestamp, "step": step }))
            .collect();
        for chunk in entries.chunks(MAX_METRICS_PER_BATCH) {
            self.log_batch(&[], chunk)?;
        }
        Ok(())
    }

    fn log_histogram(&mut self, name: &str, histogram: &Histogram, step: usize) -> Result<(), TrackerError> {
        let body = serde_json::to_vec(&json!({ "name": name, "step": step, "histogram": histogram }))?;
        let file = format!("histograms/{}_step{step}.json", name.replace('/', "_"));
        self.upload(&file, body)
    }

    fn log_artifact(&mut self, path: &Path) -> Result<(), TrackerError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TrackerError::Backend(format!("{} has no file name", path.display())))?
            .to_string();
        let bytes = std::fs::read(path)?;
        self.upload(&file_name, bytes)
    }

    fn log_image(&mut self, name: &str, png: &[u8]) -> Result<(), TrackerError> {
        self.upload(&format!("{}.png", name.replace('/', "_")), png.to_vec())
    }

    fn finish(&mut self) -> Result<(), TrackerError> {
        self.http.post_json(
            "/api/2.0/mlflow/runs/update",
            &json!({
                "run_id": self.run_id,
                "status": "FINISHED",
                "end_time": Utc::now().timestamp_millis(),
            }),
        )?;
        Ok(())
    }
}
