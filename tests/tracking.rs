mod common;

use std::fs;

use common::{blob_splits, broken_mlflow_server, event_collector, quiet_config};
use ferrite_trainer::tracking::{
    LocalTracker, Metrics, Params, RemoteTrackerA, RemoteTrackerB, TrackingConfig,
};
use ferrite_trainer::{run, Mlp, NetworkSpec, StopReason, Tracker, TrackerBackend, TrainingConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;

fn metrics(loss: f64) -> Metrics {
    Metrics::from([("train_loss".to_string(), loss)])
}

#[test]
fn local_tracker_writes_run_directory() {
    let root = tempfile::tempdir().unwrap();
    let mut local = LocalTracker::create(root.path(), "mnist exp", Some("baseline"), &["cpu".to_string()]).unwrap();
    let run_dir = local.run_dir().to_path_buf();
    assert!(run_dir.starts_with(root.path().join("mnist_exp")));

    local.log_params(&Params::from([("optimizer".to_string(), "adam".to_string())])).unwrap();
    local.log_metrics(&metrics(1.0), 1).unwrap();
    local.log_metrics(&metrics(0.5), 2).unwrap();
    let artifact = root.path().join("notes.txt");
    fs::write(&artifact, "hello").unwrap();
    local.log_artifact(&artifact).unwrap();
    local.log_image("confusion_matrix", &[0x89, b'P', b'N', b'G']).unwrap();
    local.finish().unwrap();

    let params: Value = serde_json::from_str(&fs::read_to_string(run_dir.join("params.json")).unwrap()).unwrap();
    assert_eq!(params["optimizer"], "adam");

    let lines: Vec<Value> = fs::read_to_string(run_dir.join("metrics.jsonl"))
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["step"], 2);
    assert_eq!(lines[1]["metrics"]["train_loss"], 0.5);

    assert_eq!(fs::read_to_string(run_dir.join("artifacts/notes.txt")).unwrap(), "hello");
    assert!(run_dir.join("images/confusion_matrix.png").is_file());

    let meta: Value = serde_json::from_str(&fs::read_to_string(run_dir.join("meta.json")).unwrap()).unwrap();
    assert_eq!(meta["status"], "FINISHED");
    assert_eq!(meta["run_name"], "baseline");
    assert!(meta["ended_at"].is_string());
}

#[test]
fn queued_local_backend_flushes_on_finish() {
    let root = tempfile::tempdir().unwrap();
    let config = TrackingConfig {
        backends: "local".into(),
        local_dir: root.path().to_path_buf(),
        async_dispatch: true,
        ..TrackingConfig::default()
    };
    let mut tracker = Tracker::from_config(&config).unwrap();
    assert_eq!(tracker.backend_names(), vec!["local"]);
    for step in 1..=50 {
        tracker.log_metrics(&metrics(1.0 / step as f64), step);
    }
    let weights = vec![0.5; 10_000];
    tracker.log_histogram("weights/w", weights.iter(), 50);
    tracker.finish();

    let experiment_dir = root.path().join("image-classifier");
    let run_dir = fs::read_dir(&experiment_dir).unwrap().next().unwrap().unwrap().path();
    let metrics = fs::read_to_string(run_dir.join("metrics.jsonl")).unwrap();
    assert_eq!(metrics.lines().count(), 50);
    let histograms = fs::read_to_string(run_dir.join("histograms.jsonl")).unwrap();
    let line: Value = serde_json::from_str(histograms.lines().next().unwrap()).unwrap();
    assert_eq!(line["histogram"]["count"], 10_000);
}

#[test]
fn remote_a_creates_run_and_logs_batches() {
    let server = common::FakeServer::start(|_, url| {
        if url.starts_with("/api/2.0/mlflow/experiments/get-by-name") {
            (404, r#"{"error_code":"RESOURCE_DOES_NOT_EXIST"}"#.into())
        } else if url == "/api/2.0/mlflow/experiments/create" {
            (200, r#"{"experiment_id":"12"}"#.into())
        } else if url == "/api/2.0/mlflow/runs/create" {
            (200, r#"{"run":{"info":{"run_id":"r1"}}}"#.into())
        } else {
            (200, "{}".into())
        }
    });
    let mut remote = ferrite_trainer::tracking::RemoteConfig::default();
    remote.url = Some(server.url.clone());
    remote.api_key = Some("token-a".into());

    let mut backend = RemoteTrackerA::open(&remote, "exp", Some("run"), &[]).unwrap();
    assert_eq!(backend.run_id(), "r1");
    backend.log_metrics(&metrics(0.25), 3).unwrap();
    backend.log_image("confusion_matrix", b"png").unwrap();
    backend.finish().unwrap();

    let requests = server.captured();
    let urls: Vec<&str> = requests.iter().map(|r| r.url.as_str()).collect();
    assert!(urls[0].starts_with("/api/2.0/mlflow/experiments/get-by-name?experiment_name=exp"));
    assert_eq!(urls[1], "/api/2.0/mlflow/experiments/create");
    assert_eq!(urls[2], "/api/2.0/mlflow/runs/create");
    assert_eq!(urls[3], "/api/2.0/mlflow/runs/log-batch");
    assert_eq!(urls[4], "/api/2.0/mlflow-artifacts/artifacts/12/r1/artifacts/confusion_matrix.png");
    assert_eq!(requests[4].method, "PUT");
    assert_eq!(urls[5], "/api/2.0/mlflow/runs/update");

    let batch: Value = serde_json::from_str(&requests[3].body).unwrap();
    assert_eq!(batch["metrics"][0]["key"], "train_loss");
    assert_eq!(batch["metrics"][0]["step"], 3);
    let update: Value = serde_json::from_str(&requests[5].body).unwrap();
    assert_eq!(update["status"], "FINISHED");
    assert!(requests.iter().all(|r| r.authorization.as_deref() == Some("Bearer token-a")));
}

#[test]
fn remote_b_streams_typed_events() {
    let server = event_collector();
    let mut remote = ferrite_trainer::tracking::RemoteConfig::default();
    remote.url = Some(format!("{}/", server.url));

    let mut backend = RemoteTrackerB::open(&remote, "proj", None, &["a".to_string()]).unwrap();
    backend.log_metrics(&metrics(0.75), 1).unwrap();
    backend.log_image("training_history", &[1, 2, 3]).unwrap();
    backend.finish().unwrap();

    let requests = server.captured();
    assert_eq!(requests[0].url, "/api/v1/runs");
    let events: Vec<Value> = requests[1..3].iter().map(|r| serde_json::from_str(&r.body).unwrap()).collect();
    assert_eq!(events[0]["type"], "metrics");
    assert_eq!(events[0]["step"], 1);
    assert_eq!(events[0]["metrics"]["train_loss"], 0.75);
    assert_eq!(events[1]["type"], "image");
    assert_eq!(events[1]["data"], "AQID");
    assert_eq!(requests[3].url, "/api/v1/runs/run-1/finish");
}

#[test]
fn failing_remote_a_leaves_remote_b_complete() {
    let remote_a = broken_mlflow_server();
    let remote_b = event_collector();
    let mut config = TrainingConfig { max_epochs: 3, early_stopping_patience: 10, histogram_every: 0, ..quiet_config() };
    config.tracking.backends = "remote-a,remote-b".into();
    config.tracking.remote_a.url = Some(remote_a.url.clone());
    config.tracking.remote_b.url = Some(remote_b.url.clone());

    let mut tracker = Tracker::from_config(&config.tracking).unwrap();
    assert_eq!(tracker.backend_names(), vec!["remote-a", "remote-b"]);
    let (mut train, mut val, mut test) = blob_splits(16);
    let mut model = Mlp::new(&NetworkSpec::relu(6, &[8], 4), &mut StdRng::seed_from_u64(5));

    let report = run(&mut model, &mut train, &mut val, &mut test, &config, &mut tracker).unwrap();
    assert_eq!(report.stop_reason, StopReason::Completed);

    let metric_steps: Vec<u64> = remote_b
        .captured()
        .iter()
        .filter_map(|r| serde_json::from_str::<Value>(&r.body).ok())
        .filter(|e| e["type"] == "metrics")
        .map(|e| e["step"].as_u64().unwrap())
        .collect();
    assert_eq!(metric_steps, vec![1, 2, 3, 3]);
    assert!(remote_b.captured().iter().any(|r| r.url == "/api/v1/runs/run-1/finish"));

    let rejected = remote_a
        .captured()
        .iter()
        .filter(|r| r.url == "/api/2.0/mlflow/runs/log-batch")
        .count();
    assert!(rejected >= 4);
}
