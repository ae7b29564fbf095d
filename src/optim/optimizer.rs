use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::math::matrix::Matrix;
use crate::network::model::Gradients;

/// A parameter update rule with mutable learning rate and serializable state.
pub trait Optimizer {
    /// Applies one update to every parameter that has a gradient.
    fn step(&mut self, params: Vec<(String, &mut Matrix)>, grads: &Gradients);

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);

    /// Owned snapshot of hyperparameters and per-parameter buffers.
    fn state(&self) -> OptimizerState;

    fn load_state(&mut self, state: &OptimizerState) -> Result<(), PersistenceError>;
}

/// Serializable optimizer snapshot stored inside a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerState {
    Sgd {
        learning_rate: f64,
        momentum: f64,
        weight_decay: f64,
        momentum_buffers: BTreeMap<String, Matrix>,
    },
    Adam {
        learning_rate: f64,
        beta1: f64,
        beta2: f64,
        eps: f64,
        weight_decay: f64,
        step: u64,
        exp_avg: BTreeMap<String, Matrix>,
        exp_avg_sq: BTreeMap<String, Matrix>,
    },
}

impl OptimizerState {
    pub fn learning_rate(&self) -> f64 {
        match self {
            OptimizerState::Sgd { learning_rate, .. } | OptimizerState::Adam { learning_rate, .. } => {
                *learning_rate
            }
        }
    }
}

/// Gradient with L2 weight decay folded in: `g + wd·p`.
pub(crate) fn decayed_gradient(grad: &Matrix, param: &Matrix, weight_decay: f64) -> Matrix {
    let mut g = grad.clone();
    if weight_decay != 0.0 {
        g.axpy(weight_decay, param);
    }
    g
}
