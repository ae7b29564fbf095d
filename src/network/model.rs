use std::collections::BTreeMap;

use crate::error::{BatchError, PersistenceError};
use crate::math::matrix::Matrix;

/// Owned parameter snapshot keyed by parameter name.
pub type StateDict = BTreeMap<String, Matrix>;

/// Per-parameter gradients keyed by the same names as `Model::parameters`.
pub type Gradients = BTreeMap<String, Matrix>;

/// A differentiable classifier as seen by the training loop.
///
/// `forward` maps a `(batch, features)` input to `(batch, classes)` logits and
/// caches whatever `backward` needs. `backward` takes ∂L/∂logits and returns
/// the gradient for every named parameter. The loop never touches parameters
/// except through `parameters_mut`, `state_dict` and `load_state_dict`.
pub trait Model {
    fn forward(&mut self, inputs: &Matrix) -> Result<Matrix, BatchError>;

    fn backward(&mut self, grad_logits: &Matrix) -> Result<Gradients, BatchError>;

    /// Parameters in a stable order.
    fn parameters(&self) -> Vec<(String, &Matrix)>;

    fn parameters_mut(&mut self) -> Vec<(String, &mut Matrix)>;

    fn num_classes(&self) -> usize;

    /// Switches between training and inference behaviour. Models without
    /// mode-dependent layers can ignore it.
    fn set_training(&mut self, _training: bool) {}

    fn parameter_count(&self) -> usize {
        self.parameters().iter().map(|(_, p)| p.len()).sum()
    }

    /// Deep copy of every parameter; independent of the live model.
    fn state_dict(&self) -> StateDict {
        self.parameters()
            .into_iter()
            .map(|(name, tensor)| (name, tensor.clone()))
            .collect()
    }

    /// Replaces every parameter from `state`. Fails without modifying the
    /// model if a name is missing or a shape differs.
    fn load_state_dict(&mut self, state: &StateDict) -> Result<(), PersistenceError> {
        for (name, tensor) in self.parameters() {
            match state.get(&name) {
                None => {
                    return Err(PersistenceError::StateMismatch(format!("missing parameter `{name}`")))
                }
                Some(saved) if saved.shape() != tensor.shape() => {
                    return Err(PersistenceError::StateMismatch(format!(
                        "parameter `{name}` has shape {:?}, snapshot has {:?}",
                        tensor.shape(),
                        saved.shape()
                    )))
                }
                Some(_) => {}
            }
        }
        for (name, tensor) in self.parameters_mut() {
            if let Some(saved) = state.get(&name) {
                *tensor = saved.clone();
            }
        }
        Ok(())
    }
}
