use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::error::{ConfigError, TrackerError};
use crate::tracking::histogram::Histogram;

pub type Params = BTreeMap<String, String>;
pub type Metrics = BTreeMap<String, f64>;

/// One concrete experiment-tracking integration.
///
/// Backends may fail freely; the [`Tracker`](crate::tracking::Tracker) facade
/// catches and logs every error so a backend can never stop a run.
pub trait TrackerBackend: Send {
    fn name(&self) -> &str;

    fn log_params(&mut self, params: &Params) -> Result<(), TrackerError>;

    fn log_metrics(&mut self, metrics: &Metrics, step: usize) -> Result<(), TrackerError>;

    fn log_histogram(&mut self, name: &str, histogram: &Histogram, step: usize) -> Result<(), TrackerError>;

    fn log_artifact(&mut self, path: &Path) -> Result<(), TrackerError>;

    /// `png` is an encoded PNG image.
    fn log_image(&mut self, name: &str, png: &[u8]) -> Result<(), TrackerError>;

    /// Closes the session. Called at most once by the facade.
    fn finish(&mut self) -> Result<(), TrackerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    None,
    Local,
    RemoteA,
    RemoteB,
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(BackendKind::None),
            "local" => Ok(BackendKind::Local),
            "remote-a" => Ok(BackendKind::RemoteA),
            "remote-b" => Ok(BackendKind::RemoteB),
            _ => Err(ConfigError::UnknownTracker(s.trim().to_string())),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BackendKind::None => "none",
            BackendKind::Local => "local",
            BackendKind::RemoteA => "remote-a",
            BackendKind::RemoteB => "remote-b",
        })
    }
}

/// Parses a selection such as `"local,remote-b"`.
///
/// Duplicates collapse, order is kept, and `none` only survives when nothing
/// else was selected. An empty string means `none`.
pub fn parse_selection(selection: &str) -> Result<Vec<BackendKind>, ConfigError> {
    let mut kinds = Vec::new();
    for tag in selection.split(',').filter(|t| !t.trim().is_empty()) {
        let kind: BackendKind = tag.parse()?;
        if kind != BackendKind::None && !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        kinds.push(BackendKind::None);
    }
    Ok(kinds)
}

/// Flattens nested JSON into dotted string parameters, e.g.
/// `{"scheduler": {"kind": "step"}}` becomes `scheduler.kind = "step"`.
/// Nulls are dropped; arrays are kept as their JSON text.
pub fn flatten_params(value: &Value) -> Params {
    let mut out = Params::new();
    flatten_into(&mut out, String::new(), value);
    out
}

fn flatten_into(out: &mut Params, prefix: String, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let name = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                flatten_into(out, name, child);
            }
        }
        Value::Null => {}
        Value::String(s) => {
            out.insert(prefix, s.clone());
        }
        other => {
            out.insert(prefix, other.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn selection_trims_dedupes_and_drops_none() {
        assert_eq!(
            parse_selection(" local , remote-a,local").unwrap(),
            vec![BackendKind::Local, BackendKind::RemoteA]
        );
        assert_eq!(parse_selection("none").unwrap(), vec![BackendKind::None]);
        assert_eq!(parse_selection("").unwrap(), vec![BackendKind::None]);
        assert_eq!(parse_selection("none,remote-b").unwrap(), vec![BackendKind::RemoteB]);
    }

    #[test]
    fn unknown_tag_is_a_config_error() {
        assert!(matches!(parse_selection("local,wandb"), Err(ConfigError::UnknownTracker(t)) if t == "wandb"));
    }

    #[test]
    fn nested_config_flattens_to_dotted_keys() {
        let params = flatten_params(&json!({
            "learning_rate": 0.001,
            "optimizer": "adam",
            "clip_grad_norm": null,
            "scheduler": { "kind": "step", "step_size": 10 },
            "class_names": ["a", "b"],
        }));
        assert_eq!(params["learning_rate"], "0.001");
        assert_eq!(params["optimizer"], "adam");
        assert_eq!(params["scheduler.kind"], "step");
        assert_eq!(params["scheduler.step_size"], "10");
        assert_eq!(params["class_names"], "[\"a\",\"b\"]");
        assert!(!params.contains_key("clip_grad_norm"));
    }
}
