use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::network::model::{Model, StateDict};
use crate::optim::optimizer::{Optimizer, OptimizerState};
use crate::train::train_config::TrainingConfig;

/// Self-contained snapshot of one epoch's model and optimizer.
///
/// Owns deep copies of every tensor, so the live model can keep training
/// without affecting it, and can be loaded back without the original model
/// instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: usize,
    pub model_state: StateDict,
    pub optimizer_state: OptimizerState,
    pub val_acc: f64,
    pub config: TrainingConfig,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Snapshots `model` and `optimizer`. Tracker API keys are dropped from
    /// the stored config; they are never written to disk.
    pub fn capture(
        epoch: usize,
        model: &dyn Model,
        optimizer: &dyn Optimizer,
        val_acc: f64,
        config: &TrainingConfig,
    ) -> Self {
        Checkpoint {
            epoch,
            model_state: model.state_dict(),
            optimizer_state: optimizer.state(),
            val_acc,
            config: TrainingConfig { tracking: config.tracking.without_secrets(), ..config.clone() },
            saved_at: Utc::now(),
        }
    }

    /// Writes the checkpoint as one JSON document. The file is written next
    /// to `path` first and renamed into place, so an interrupted write never
    /// replaces a good checkpoint with a partial one.
    pub fn persist(&self, path: &Path) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
        }
        let json = serde_json::to_vec(self)?;
        let tmp = tmp_path(path);
        fs::write(&tmp, json).map_err(|e| PersistenceError::io(&tmp, e))?;
        if let Err(err) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(PersistenceError::io(path, err));
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let bytes = fs::read(path).map_err(|e| PersistenceError::io(path, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Loads the snapshot's parameters into `model`.
    pub fn restore_into(&self, model: &mut dyn Model) -> Result<(), PersistenceError> {
        model.load_state_dict(&self.model_state)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
