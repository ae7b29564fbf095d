use std::f64::consts::PI;

use crate::optim::optimizer::Optimizer;

/// Per-epoch learning-rate schedule.
///
/// `Step` and `Cosine` depend only on the epoch count; `Plateau` watches the
/// validation accuracy passed to `step`.
#[derive(Debug, Clone, PartialEq)]
pub enum Scheduler {
    Step(StepDecay),
    Cosine(CosineAnnealing),
    Plateau(ReduceOnPlateau),
}

impl Scheduler {
    /// Advances the schedule by one epoch and writes the new rate into the
    /// optimizer.
    pub fn step(&mut self, optimizer: &mut dyn Optimizer, val_accuracy: f64) {
        let current = optimizer.learning_rate();
        let next = match self {
            Scheduler::Step(s) => s.advance(),
            Scheduler::Cosine(s) => s.advance(),
            Scheduler::Plateau(s) => s.observe(current, val_accuracy),
        };
        optimizer.set_learning_rate(next);
    }

    pub fn is_metric_driven(&self) -> bool {
        matches!(self, Scheduler::Plateau(_))
    }
}

/// Multiplies the base rate by `gamma` every `step_size` epochs.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDecay {
    pub base_lr: f64,
    pub step_size: usize,
    pub gamma: f64,
    epoch: usize,
}

impl StepDecay {
    pub fn new(base_lr: f64, step_size: usize, gamma: f64) -> Self {
        StepDecay { base_lr, step_size, gamma, epoch: 0 }
    }

    fn advance(&mut self) -> f64 {
        self.epoch += 1;
        self.base_lr * self.gamma.powi((self.epoch / self.step_size.max(1)) as i32)
    }
}

/// Cosine decay from the base rate to `min_lr` over `t_max` epochs, then
/// held at `min_lr`.
#[derive(Debug, Clone, PartialEq)]
pub struct CosineAnnealing {
    pub base_lr: f64,
    pub min_lr: f64,
    pub t_max: usize,
    epoch: usize,
}

impl CosineAnnealing {
    pub fn new(base_lr: f64, min_lr: f64, t_max: usize) -> Self {
        CosineAnnealing { base_lr, min_lr, t_max: t_max.max(1), epoch: 0 }
    }

    fn advance(&mut self) -> f64 {
        self.epoch += 1;
        let t = self.epoch.min(self.t_max) as f64 / self.t_max as f64;
        self.min_lr + (self.base_lr - self.min_lr) * (1.0 + (PI * t).cos()) / 2.0
    }
}

/// Multiplies the rate by `factor` once validation accuracy has gone more
/// than `patience` epochs without a strict improvement.
#[derive(Debug, Clone, PartialEq)]
pub struct ReduceOnPlateau {
    pub factor: f64,
    pub patience: usize,
    pub min_lr: f64,
    best: Option<f64>,
    bad_epochs: usize,
}

impl ReduceOnPlateau {
    pub fn new(factor: f64, patience: usize, min_lr: f64) -> Self {
        ReduceOnPlateau { factor, patience, min_lr, best: None, bad_epochs: 0 }
    }

    fn observe(&mut self, current_lr: f64, metric: f64) -> f64 {
        if self.best.map_or(true, |best| metric > best) {
            self.best = Some(metric);
            self.bad_epochs = 0;
            return current_lr;
        }
        self.bad_epochs += 1;
        if self.bad_epochs > self.patience {
            self.bad_epochs = 0;
            return (current_lr * self.factor).max(self.min_lr);
        }
        current_lr
    }
}
