use std::collections::BTreeMap;

use crate::error::PersistenceError;
use crate::math::matrix::Matrix;
use crate::network::model::Gradients;
use crate::optim::optimizer::{decayed_gradient, Optimizer, OptimizerState};

/// Stochastic gradient descent with optional momentum and L2 weight decay.
///
/// Momentum follows the usual convention: the first step seeds the buffer
/// with the gradient, later steps use `buf = μ·buf + g`, and the update is
/// `p -= lr·buf`.
#[derive(Debug, Clone)]
pub struct Sgd {
    pub learning_rate: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    momentum_buffers: BTreeMap<String, Matrix>,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd::with_momentum(learning_rate, 0.0, 0.0)
    }

    pub fn with_momentum(learning_rate: f64, momentum: f64, weight_decay: f64) -> Sgd {
        Sgd { learning_rate, momentum, weight_decay, momentum_buffers: BTreeMap::new() }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: Vec<(String, &mut Matrix)>, grads: &Gradients) {
        let momentum = self.momentum;
        for (name, param) in params {
            let Some(grad) = grads.get(&name) else { continue };
            let g = decayed_gradient(grad, param, self.weight_decay);

            let update = if momentum != 0.0 {
                let buf = self.momentum_buffers
                    .entry(name)
                    .and_modify(|buf| {
                        buf.scale_in_place(momentum);
                        buf.axpy(1.0, &g);
                    })
                    .or_insert_with(|| g.clone());
                buf.clone()
            } else {
                g
            };

            param.axpy(-self.learning_rate, &update);
        }
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }

    fn state(&self) -> OptimizerState {
        OptimizerState::Sgd {
            learning_rate: self.learning_rate,
            momentum: self.momentum,
            weight_decay: self.weight_decay,
            momentum_buffers: self.momentum_buffers.clone(),
        }
    }

    fn load_state(&mut self, state: &OptimizerState) -> Result<(), PersistenceError> {
        match state {
            OptimizerState::Sgd { learning_rate, momentum, weight_decay, momentum_buffers } => {
                self.learning_rate = *learning_rate;
                self.momentum = *momentum;
                self.weight_decay = *weight_decay;
                self.momentum_buffers = momentum_buffers.clone();
                Ok(())
            }
            OptimizerState::Adam { .. } => Err(PersistenceError::StateMismatch(
                "expected sgd optimizer state, found adam".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grads(v: f64) -> Gradients {
        Gradients::from([("w".to_string(), Matrix::from_data(vec![vec![v]]))])
    }

    #[test]
    fn plain_step_moves_against_gradient() {
        let mut p = Matrix::from_data(vec![vec![1.0]]);
        let mut opt = Sgd::new(0.1);
        opt.step(vec![("w".into(), &mut p)], &grads(2.0));
        assert!((p.data[0][0] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn momentum_accumulates() {
        let mut p = Matrix::from_data(vec![vec![0.0]]);
        let mut opt = Sgd::with_momentum(1.0, 0.9, 0.0);
        opt.step(vec![("w".into(), &mut p)], &grads(1.0));
        opt.step(vec![("w".into(), &mut p)], &grads(1.0));
        // buf: 1.0, then 0.9 + 1.0
        assert!((p.data[0][0] + 2.9).abs() < 1e-12);
    }

    #[test]
    fn state_round_trips() {
        let mut p = Matrix::from_data(vec![vec![0.0]]);
        let mut opt = Sgd::with_momentum(0.5, 0.9, 1e-4);
        opt.step(vec![("w".into(), &mut p)], &grads(1.0));
        let mut fresh = Sgd::new(1.0);
        fresh.load_state(&opt.state()).unwrap();
        assert_eq!(fresh.state(), opt.state());
    }
}
