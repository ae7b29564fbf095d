use std::collections::BTreeMap;

use crate::error::PersistenceError;
use crate::math::matrix::Matrix;
use crate::network::model::Gradients;
use crate::optim::optimizer::{decayed_gradient, Optimizer, OptimizerState};

/// Adaptive moment estimation with bias correction and L2 weight decay.
#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
    step: u64,
    exp_avg: BTreeMap<String, Matrix>,
    exp_avg_sq: BTreeMap<String, Matrix>,
}

impl Adam {
    pub fn new(learning_rate: f64, weight_decay: f64) -> Adam {
        Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay,
            step: 0,
            exp_avg: BTreeMap::new(),
            exp_avg_sq: BTreeMap::new(),
        }
    }

    /// Pre-allocates zeroed moment buffers for the given parameters.
    pub fn with_params(mut self, params: &[(String, &Matrix)]) -> Adam {
        for (name, p) in params {
            self.exp_avg.insert(name.clone(), Matrix::zeros(p.rows, p.cols));
            self.exp_avg_sq.insert(name.clone(), Matrix::zeros(p.rows, p.cols));
        }
        self
    }

    pub fn steps_taken(&self) -> u64 {
        self.step
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: Vec<(String, &mut Matrix)>, grads: &Gradients) {
        self.step += 1;
        let t = self.step as i32;
        let bias1 = 1.0 - self.beta1.powi(t);
        let bias2 = 1.0 - self.beta2.powi(t);

        for (name, param) in params {
            let Some(grad) = grads.get(&name) else { continue };
            let g = decayed_gradient(grad, param, self.weight_decay);

            let m = self.exp_avg
                .entry(name.clone())
                .or_insert_with(|| Matrix::zeros(g.rows, g.cols));
            m.scale_in_place(self.beta1);
            m.axpy(1.0 - self.beta1, &g);

            let v = self.exp_avg_sq
                .entry(name)
                .or_insert_with(|| Matrix::zeros(g.rows, g.cols));
            v.scale_in_place(self.beta2);
            v.axpy(1.0 - self.beta2, &g.hadamard(&g));

            for ((p, m_i), v_i) in param.iter_mut().zip(m.iter()).zip(v.iter()) {
                let m_hat = m_i / bias1;
                let v_hat = v_i / bias2;
                *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.eps);
            }
        }
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }

    fn state(&self) -> OptimizerState {
        OptimizerState::Adam {
            learning_rate: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            eps: self.eps,
            weight_decay: self.weight_decay,
            step: self.step,
            exp_avg: self.exp_avg.clone(),
            exp_avg_sq: self.exp_avg_sq.clone(),
        }
    }

    fn load_state(&mut self, state: &OptimizerState) -> Result<(), PersistenceError> {
        match state {
            OptimizerState::Adam {
                learning_rate,
                beta1,
                beta2,
                eps,
                weight_decay,
                step,
                exp_avg,
                exp_avg_sq,
            } => {
                self.learning_rate = *learning_rate;
                self.beta1 = *beta1;
                self.beta2 = *beta2;
                self.eps = *eps;
                self.weight_decay = *weight_decay;
                self.step = *step;
                self.exp_avg = exp_avg.clone();
                self.exp_avg_sq = exp_avg_sq.clone();
                Ok(())
            }
            OptimizerState::Sgd { .. } => Err(PersistenceError::StateMismatch(
                "expected adam optimizer state, found sgd".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_moves_by_learning_rate() {
        // With bias correction the first update is lr·sign(g).
        let mut p = Matrix::from_data(vec![vec![1.0, 1.0]]);
        let mut opt = Adam::new(0.01, 0.0);
        let grads = Gradients::from([("w".to_string(), Matrix::from_data(vec![vec![3.0, -0.5]]))]);
        opt.step(vec![("w".into(), &mut p)], &grads);
        assert!((p.data[0][0] - 0.99).abs() < 1e-6);
        assert!((p.data[0][1] - 1.01).abs() < 1e-6);
        assert_eq!(opt.steps_taken(), 1);
    }

    #[test]
    fn rejects_foreign_state() {
        let mut opt = Adam::new(0.01, 0.0);
        let sgd_state = crate::optim::sgd::Sgd::new(0.1).state();
        assert!(opt.load_state(&sgd_state).is_err());
    }
}
