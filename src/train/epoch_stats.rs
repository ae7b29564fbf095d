use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-epoch statistics emitted by the training loop.
///
/// When a progress channel is attached to the `Trainer`, one `EpochResult`
/// is sent at the end of every completed epoch, in addition to being
/// appended to the run's [`TrainingHistory`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochResult {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Sample-weighted mean training loss over the valid batches.
    pub train_loss: f64,
    /// Training accuracy as a fraction in [0, 1].
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    /// Learning rate after this epoch's scheduler step.
    pub learning_rate: f64,
    /// Training batches dropped because they could not be used.
    pub skipped_batches: usize,
    /// Wall-clock duration of this epoch in milliseconds.
    pub elapsed_ms: u64,
}

impl EpochResult {
    /// The scalars forwarded to the tracker at this epoch's step.
    pub fn metrics(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("train_loss".to_string(), self.train_loss),
            ("train_accuracy".to_string(), self.train_accuracy),
            ("val_loss".to_string(), self.val_loss),
            ("val_accuracy".to_string(), self.val_accuracy),
            ("learning_rate".to_string(), self.learning_rate),
        ])
    }
}

/// Append-only, chronologically ordered epoch results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    epochs: Vec<EpochResult>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `result`. Epoch numbers must continue the sequence without
    /// gaps; anything else is a bug in the caller.
    pub fn push(&mut self, result: EpochResult) {
        debug_assert_eq!(result.epoch, self.epochs.len() + 1, "epochs must be gapless");
        self.epochs.push(result);
    }

    pub fn epochs(&self) -> &[EpochResult] {
        &self.epochs
    }

    pub fn last(&self) -> Option<&EpochResult> {
        self.epochs.last()
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EpochResult> {
        self.epochs.iter()
    }

    /// Epoch with the highest validation accuracy; the earliest wins ties.
    pub fn best_epoch(&self) -> Option<&EpochResult> {
        self.epochs
            .iter()
            .fold(None, |best: Option<&EpochResult>, e| match best {
                Some(b) if b.val_accuracy >= e.val_accuracy => Some(b),
                _ => Some(e),
            })
    }
}

impl<'a> IntoIterator for &'a TrainingHistory {
    type Item = &'a EpochResult;
    type IntoIter = std::slice::Iter<'a, EpochResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.epochs.iter()
    }
}
