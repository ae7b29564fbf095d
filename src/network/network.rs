use rand::Rng;

use crate::error::BatchError;
use crate::layers::dense::Dense;
use crate::math::matrix::Matrix;
use crate::network::model::{Gradients, Model};
use crate::network::spec::NetworkSpec;

/// Multi-layer perceptron classifier producing logits.
#[derive(Debug, Clone)]
pub struct Mlp {
    pub layers: Vec<Dense>,
    num_classes: usize,
}

impl Mlp {
    /// Builds a network from a spec, initialising weights from `rng`.
    pub fn new<R: Rng + ?Sized>(spec: &NetworkSpec, rng: &mut R) -> Mlp {
        let layers = spec.layer_shapes()
            .into_iter()
            .map(|(input_size, size, activation)| Dense::new(input_size, size, activation, rng))
            .collect();
        Mlp { layers, num_classes: spec.num_classes }
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.input_size())
    }

    fn weight_name(i: usize) -> String {
        format!("layers.{i}.weight")
    }

    fn bias_name(i: usize) -> String {
        format!("layers.{i}.bias")
    }
}

impl Model for Mlp {
    fn forward(&mut self, inputs: &Matrix) -> Result<Matrix, BatchError> {
        if inputs.rows == 0 {
            return Err(BatchError::Empty);
        }
        if inputs.cols != self.input_size() {
            return Err(BatchError::ShapeMismatch {
                expected: format!("{} features", self.input_size()),
                found: format!("{} features", inputs.cols),
            });
        }
        let mut current = inputs.clone();
        for layer in &mut self.layers {
            current = layer.forward(&current);
        }
        Ok(current)
    }

    fn backward(&mut self, grad_logits: &Matrix) -> Result<Gradients, BatchError> {
        if grad_logits.cols != self.num_classes {
            return Err(BatchError::ShapeMismatch {
                expected: format!("{} logits", self.num_classes),
                found: format!("{} logits", grad_logits.cols),
            });
        }
        let mut grads = Gradients::new();
        let mut delta = grad_logits.clone();
        for (i, layer) in self.layers.iter().enumerate().rev() {
            let layer_grads = layer.backward(&delta);
            delta = layer_grads.input;
            grads.insert(Mlp::weight_name(i), layer_grads.weights);
            grads.insert(Mlp::bias_name(i), layer_grads.biases);
        }
        Ok(grads)
    }

    fn parameters(&self) -> Vec<(String, &Matrix)> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(i, layer)| {
                [(Mlp::weight_name(i), &layer.weights), (Mlp::bias_name(i), &layer.biases)]
            })
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<(String, &mut Matrix)> {
        self.layers
            .iter_mut()
            .enumerate()
            .flat_map(|(i, layer)| {
                [(Mlp::weight_name(i), &mut layer.weights), (Mlp::bias_name(i), &mut layer.biases)]
            })
            .collect()
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn tiny() -> Mlp {
        Mlp::new(&NetworkSpec::relu(4, &[5], 3), &mut StdRng::seed_from_u64(1))
    }

    #[test]
    fn forward_rejects_wrong_feature_count() {
        let mut net = tiny();
        let err = net.forward(&Matrix::zeros(2, 3)).unwrap_err();
        assert!(matches!(err, BatchError::ShapeMismatch { .. }));
    }

    #[test]
    fn backward_names_every_parameter() {
        let mut net = tiny();
        let logits = net.forward(&Matrix::zeros(2, 4)).unwrap();
        assert_eq!(logits.shape(), (2, 3));
        let grads = net.backward(&Matrix::zeros(2, 3)).unwrap();
        let names: Vec<String> = net.parameters().into_iter().map(|(n, _)| n).collect();
        assert_eq!(grads.keys().cloned().collect::<Vec<_>>().len(), names.len());
        for name in names {
            assert_eq!(grads[&name].shape(), net.state_dict()[&name].shape());
        }
    }

    #[test]
    fn state_dict_is_independent_of_live_parameters() {
        let mut net = tiny();
        let snapshot = net.state_dict();
        net.layers[0].weights.data[0][0] += 1.0;
        assert_ne!(snapshot["layers.0.weight"], net.layers[0].weights);

        net.load_state_dict(&snapshot).unwrap();
        assert_eq!(snapshot["layers.0.weight"], net.layers[0].weights);
    }

    #[test]
    fn load_state_dict_rejects_missing_names() {
        let mut net = tiny();
        let mut snapshot = net.state_dict();
        snapshot.remove("layers.1.bias");
        assert!(net.load_state_dict(&snapshot).is_err());
    }
}
