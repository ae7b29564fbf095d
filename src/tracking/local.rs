use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::TrackerError;
use crate::tracking::backend::{Metrics, Params, TrackerBackend};
use crate::tracking::histogram::Histogram;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Finished,
}

/// Contents of `meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: String,
    pub run_name: Option<String>,
    pub experiment: String,
    pub tags: Vec<String>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// File-backed run store:
///
/// ```text
/// <root>/<experiment>/<run_id>/
///     meta.json          run metadata and status
///     params.json        flattened parameters
///     metrics.jsonl      one line per log_metrics call
///     histograms.jsonl   one line per histogram
///     artifacts/         copied files
///     images/            <name>.png
/// ```
pub struct LocalTracker {
    run_dir: PathBuf,
    meta: RunMeta,
    params: Params,
}

impl LocalTracker {
    pub fn create(
        root: &Path,
        experiment: &str,
        run_name: Option<&str>,
        tags: &[String],
    ) -> Result<Self, TrackerError> {
        let run_id = Uuid::new_v4().simple().to_string();
        let run_dir = root.join(sanitize(experiment)).join(&run_id);
        fs::create_dir_all(run_dir.join("artifacts"))?;
        fs::create_dir_all(run_dir.join("images"))?;

        let meta = RunMeta {
            run_id,
            run_name: run_name.map(str::to_string),
            experiment: experiment.to_string(),
            tags: tags.to_vec(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
        };
        let tracker = LocalTracker { run_dir, meta, params: Params::new() };
        tracker.write_json("meta.json", &tracker.meta)?;
        Ok(tracker)
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn run_id(&self) -> &str {
        &self.meta.run_id
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<(), TrackerError> {
        let path = self.run_dir.join(file);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn append_line(&self, file: &str, line: &serde_json::Value) -> Result<(), TrackerError> {
        let mut f = OpenOptions::new().create(true).append(true).open(self.run_dir.join(file))?;
        let mut buf = serde_json::to_vec(line)?;
        buf.push(b'\n');
        f.write_all(&buf)?;
        Ok(())
    }
}

impl TrackerBackend for LocalTracker {
    fn name(&self) -> &str {
        "local"
    }

    fn log_params(&mut self, params: &Params) -> Result<(), TrackerError> {
        self.params.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.write_json("params.json", &self.params)
    }

    fn log_metrics(&mut self, metrics: &Metrics, step: usize) -> Result<(), TrackerError> {
        self.append_line(
            "metrics.jsonl",
            &json!({ "step": step, "timestamp": Utc::now(), "metrics": metrics }),
        )
    }

    fn log_histogram(&mut self, name: &str, histogram: &Histogram, step: usize) -> Result<(), TrackerError> {
        self.append_line(
            "histograms.jsonl",
            &json!({ "step": step, "name": name, "histogram": histogram }),
        )
    }

    fn log_artifact(&mut self, path: &Path) -> Result<(), TrackerError> {
        let file_name = path
            .file_name()
            .ok_or_else(|| TrackerError::Backend(format!("{} has no file name", path.display())))?;
        fs::copy(path, self.run_dir.join("artifacts").join(file_name))?;
        Ok(())
    }

    fn log_image(&mut self, name: &str, png: &[u8]) -> Result<(), TrackerError> {
        fs::write(self.run_dir.join("images").join(format!("{}.png", sanitize(name))), png)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), TrackerError> {
        self.meta.status = RunStatus::Finished;
        self.meta.ended_at = Some(Utc::now());
        self.write_json("meta.json", &self.meta)
    }
}

/// Keeps names usable as a single path component.
pub(crate) fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_separators() {
        assert_eq!(sanitize("weights/layers.0.weight"), "weights_layers.0.weight");
        assert_eq!(sanitize("my run"), "my_run");
    }
}
