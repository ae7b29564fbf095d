use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::checkpoint::checkpoint::Checkpoint;
use crate::error::PersistenceError;
use crate::network::model::Model;
use crate::optim::optimizer::Optimizer;
use crate::train::train_config::TrainingConfig;

/// Keeps the single best checkpoint of a run.
///
/// A candidate replaces the incumbent only on a strictly higher validation
/// accuracy, so ties keep the earlier epoch. When a path is configured every
/// new best is written to disk at once; a failed write is logged, the
/// in-memory best stays authoritative and the next improvement writes again.
#[derive(Debug)]
pub struct CheckpointStore {
    best: Option<Checkpoint>,
    path: Option<PathBuf>,
    config: TrainingConfig,
    unsaved: bool,
}

impl CheckpointStore {
    pub fn new(config: &TrainingConfig) -> Self {
        CheckpointStore {
            best: None,
            path: config.checkpoint_path.clone(),
            config: config.clone(),
            unsaved: false,
        }
    }

    /// Offers this epoch's state; returns whether it became the new best.
    pub fn consider(&mut self, epoch: usize, model: &dyn Model, optimizer: &dyn Optimizer, val_acc: f64) -> bool {
        let improved = match &self.best {
            None => !val_acc.is_nan(),
            Some(best) => val_acc > best.val_acc,
        };
        if !improved {
            return false;
        }

        self.best = Some(Checkpoint::capture(epoch, model, optimizer, val_acc, &self.config));
        self.unsaved = true;
        debug!(epoch, val_acc, "new best checkpoint");

        if let Some(path) = self.path.clone() {
            match self.persist(&path) {
                Ok(()) => self.unsaved = false,
                Err(err) => warn!(epoch, path = %path.display(), error = %err, "failed to persist best checkpoint"),
            }
        }
        true
    }

    pub fn best(&self) -> Option<&Checkpoint> {
        self.best.as_ref()
    }

    pub fn into_best(self) -> Option<Checkpoint> {
        self.best
    }

    /// Whether the current best has not reached disk yet.
    pub fn has_unsaved_best(&self) -> bool {
        self.unsaved && self.best.is_some()
    }

    pub fn persist(&self, path: &Path) -> Result<(), PersistenceError> {
        self.best.as_ref().ok_or(PersistenceError::NoCheckpoint)?.persist(path)
    }

    /// Rebuilds a store around a checkpoint on disk, e.g. to resume.
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let checkpoint = Checkpoint::load(path)?;
        Ok(CheckpointStore {
            path: Some(path.to_path_buf()),
            config: checkpoint.config.clone(),
            best: Some(checkpoint),
            unsaved: false,
        })
    }

    pub fn restore_into(&self, model: &mut dyn Model) -> Result<(), PersistenceError> {
        self.best.as_ref().ok_or(PersistenceError::NoCheckpoint)?.restore_into(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Mlp, NetworkSpec};
    use crate::optim::Sgd;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn model() -> Mlp {
        Mlp::new(&NetworkSpec::relu(2, &[3], 2), &mut StdRng::seed_from_u64(1))
    }

    #[test]
    fn best_tracks_strict_maximum() {
        let mut store = CheckpointStore::new(&TrainingConfig::default());
        let model = model();
        let opt = Sgd::new(0.1);
        let accs = [0.4, 0.55, 0.55, 0.3, 0.6, 0.6];
        let replaced: Vec<bool> = accs
            .iter()
            .enumerate()
            .map(|(i, &acc)| store.consider(i + 1, &model, &opt, acc))
            .collect();
        assert_eq!(replaced, vec![true, true, false, false, true, false]);
        let best = store.best().unwrap();
        assert_eq!((best.epoch, best.val_acc), (5, 0.6));
    }

    #[test]
    fn nan_never_becomes_best() {
        let mut store = CheckpointStore::new(&TrainingConfig::default());
        assert!(!store.consider(1, &model(), &Sgd::new(0.1), f64::NAN));
        assert!(store.best().is_none());
        assert!(matches!(store.persist(Path::new("unused.json")), Err(PersistenceError::NoCheckpoint)));
    }

    #[test]
    fn captured_state_is_independent_of_live_model() {
        let mut store = CheckpointStore::new(&TrainingConfig::default());
        let mut live = model();
        store.consider(1, &live, &Sgd::new(0.1), 0.5);
        let before = store.best().unwrap().model_state.clone();

        for (_, p) in live.parameters_mut() {
            p.scale_in_place(0.0);
        }
        assert_eq!(store.best().unwrap().model_state, before);

        store.restore_into(&mut live).unwrap();
        assert_eq!(live.state_dict(), before);
    }

    #[test]
    fn unwritable_path_keeps_in_memory_best() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let config = TrainingConfig {
            checkpoint_path: Some(blocker.join("best.json")),
            ..TrainingConfig::default()
        };
        let mut store = CheckpointStore::new(&config);
        assert!(store.consider(1, &model(), &Sgd::new(0.1), 0.7));
        assert!(store.has_unsaved_best());
        assert_eq!(store.best().unwrap().epoch, 1);
    }
}
