use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::optim::factory::{OptimizerKind, SchedulerKind};
use crate::tracking::config::TrackingConfig;

/// Immutable hyperparameters for one training run.
///
/// Built once at process start (see [`TrainingConfig::load`]) and only ever
/// borrowed afterwards. A copy is embedded in every checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub weight_decay: f64,
    /// Momentum for `sgd`; ignored by `adam`.
    pub momentum: f64,
    /// `"sgd"` or `"adam"`.
    pub optimizer: String,
    pub scheduler: SchedulerConfig,
    pub batch_size: usize,
    pub max_epochs: usize,
    /// Epochs without a strict validation-accuracy improvement before stopping.
    pub early_stopping_patience: usize,
    pub early_stopping_min_delta: f64,
    /// Global L2 gradient-norm ceiling; `None` disables clipping.
    pub clip_grad_norm: Option<f64>,
    pub label_smoothing: f64,
    pub seed: u64,
    /// Log parameter/gradient histograms every N epochs; 0 disables.
    pub histogram_every: usize,
    /// Where the best checkpoint is written on every improvement.
    pub checkpoint_path: Option<PathBuf>,
    /// Where the confusion matrix, report and history plot are written.
    pub report_dir: Option<PathBuf>,
    pub class_names: Vec<String>,
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// `"none"`, `"step"`, `"cosine"` or `"plateau"`.
    pub kind: String,
    pub step_size: usize,
    /// Decay factor for `step`, reduction factor for `plateau`.
    pub gamma: f64,
    pub min_lr: f64,
    /// Cosine period; defaults to `max_epochs`.
    pub t_max: Option<usize>,
    pub plateau_patience: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            kind: "cosine".into(),
            step_size: 10,
            gamma: 0.1,
            min_lr: 1e-6,
            t_max: None,
            plateau_patience: 5,
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            learning_rate: 1e-3,
            weight_decay: 1e-4,
            momentum: 0.9,
            optimizer: "adam".into(),
            scheduler: SchedulerConfig::default(),
            batch_size: 64,
            max_epochs: 50,
            early_stopping_patience: 10,
            early_stopping_min_delta: 0.0,
            clip_grad_norm: Some(1.0),
            label_smoothing: 0.0,
            seed: 42,
            histogram_every: 10,
            checkpoint_path: None,
            report_dir: None,
            class_names: Vec::new(),
            tracking: TrackingConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// Layers defaults, an optional TOML file and `FERRITE_*` environment
    /// variables (nested keys split on `__`, e.g.
    /// `FERRITE_TRACKING__BACKENDS=local`), then validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(TrainingConfig::default()));
        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigError::invalid("config", format!("{} is not a file", path.display())));
            }
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("FERRITE_").split("__"));

        let config: TrainingConfig = figment.extract().map_err(|e| ConfigError::Load(Box::new(e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects anything that would make a run meaningless before it starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.optimizer.parse::<OptimizerKind>()?;
        let scheduler = self.scheduler.kind.parse::<SchedulerKind>()?;

        if self.max_epochs == 0 {
            return Err(ConfigError::invalid("max_epochs", "must be positive"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "must be positive"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::invalid("learning_rate", format!("{} is not a positive number", self.learning_rate)));
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return Err(ConfigError::invalid("weight_decay", "must be non-negative"));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(ConfigError::invalid("momentum", "must lie in [0, 1)"));
        }
        if !(0.0..1.0).contains(&self.label_smoothing) {
            return Err(ConfigError::invalid("label_smoothing", "must lie in [0, 1)"));
        }
        if self.early_stopping_patience == 0 {
            return Err(ConfigError::invalid("early_stopping_patience", "must be at least 1"));
        }
        if let Some(max_norm) = self.clip_grad_norm {
            if !(max_norm.is_finite() && max_norm > 0.0) {
                return Err(ConfigError::invalid("clip_grad_norm", "must be positive"));
            }
        }

        match scheduler {
            SchedulerKind::Step if self.scheduler.step_size == 0 => {
                return Err(ConfigError::invalid("scheduler.step_size", "must be positive"));
            }
            SchedulerKind::Step | SchedulerKind::Plateau
                if !(self.scheduler.gamma > 0.0 && self.scheduler.gamma <= 1.0) =>
            {
                return Err(ConfigError::invalid("scheduler.gamma", "must lie in (0, 1]"));
            }
            SchedulerKind::Cosine | SchedulerKind::Plateau if self.scheduler.min_lr < 0.0 => {
                return Err(ConfigError::invalid("scheduler.min_lr", "must be non-negative"));
            }
            _ => {}
        }

        self.tracking.validate()
    }
}
