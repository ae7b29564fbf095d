use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::tracking::backend::{parse_selection, BackendKind};

/// Which tracking backends to open and how to reach them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// `"none"`, `"local"`, `"remote-a"`, `"remote-b"` or a comma combination.
    pub backends: String,
    pub experiment_name: String,
    pub run_name: Option<String>,
    pub tags: Vec<String>,
    /// Root of the local file store.
    pub local_dir: std::path::PathBuf,
    pub remote_a: RemoteConfig,
    pub remote_b: RemoteConfig,
    /// Dispatch backend calls on one worker thread per backend.
    pub async_dispatch: bool,
    pub flush_timeout_secs: u64,
    pub histogram_bins: usize,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig { url: None, api_key: None, timeout_secs: 10 }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            backends: "local".into(),
            experiment_name: "image-classifier".into(),
            run_name: None,
            tags: Vec::new(),
            local_dir: "./runs".into(),
            remote_a: RemoteConfig::default(),
            remote_b: RemoteConfig::default(),
            async_dispatch: false,
            flush_timeout_secs: 30,
            histogram_bins: 64,
        }
    }
}

impl TrackingConfig {
    pub fn selection(&self) -> Result<Vec<BackendKind>, ConfigError> {
        parse_selection(&self.backends)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let selection = self.selection()?;
        if selection.contains(&BackendKind::RemoteA) && self.remote_a.url.is_none() {
            return Err(ConfigError::Missing("tracking.remote_a.url"));
        }
        if selection.contains(&BackendKind::RemoteB) && self.remote_b.url.is_none() {
            return Err(ConfigError::Missing("tracking.remote_b.url"));
        }
        if self.histogram_bins == 0 {
            return Err(ConfigError::invalid("tracking.histogram_bins", "must be positive"));
        }
        if self.experiment_name.trim().is_empty() {
            return Err(ConfigError::Missing("tracking.experiment_name"));
        }
        Ok(())
    }

    /// Copy with both API keys removed, as it would read back from disk.
    pub fn without_secrets(&self) -> TrackingConfig {
        let mut config = self.clone();
        config.remote_a.api_key = None;
        config.remote_b.api_key = None;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_backend_without_url_is_missing() {
        let config = TrackingConfig { backends: "local, remote-b".into(), ..TrackingConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Missing("tracking.remote_b.url"))));
    }

    #[test]
    fn api_key_is_never_serialized_or_printed() {
        let remote = RemoteConfig { api_key: Some("s3cret".into()), ..RemoteConfig::default() };
        let json = serde_json::to_string(&remote).unwrap();
        assert!(!json.contains("s3cret"));
        assert!(!format!("{remote:?}").contains("s3cret"));
    }
}
