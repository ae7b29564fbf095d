use serde::{Serialize, Deserialize};
use crate::activation::activation::ActivationFunction;

/// Describes one hidden layer in a network specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub size: usize,
    pub activation: ActivationFunction,
}

/// A fully serializable description of a classifier architecture.
///
/// The output layer is implicit: `num_classes` units with an `Identity`
/// activation, producing logits for `CrossEntropyLoss`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Flattened input dimension (e.g. 784 for 28×28 grayscale).
    pub input_size: usize,
    /// Hidden layers, input → output order.
    #[serde(default)]
    pub hidden: Vec<LayerSpec>,
    pub num_classes: usize,
}

impl NetworkSpec {
    /// ReLU hidden layers of the given sizes.
    pub fn relu(input_size: usize, hidden: &[usize], num_classes: usize) -> NetworkSpec {
        NetworkSpec {
            input_size,
            hidden: hidden
                .iter()
                .map(|&size| LayerSpec { size, activation: ActivationFunction::ReLU })
                .collect(),
            num_classes,
        }
    }

    /// `(input_size, size, activation)` for every layer including the output.
    pub fn layer_shapes(&self) -> Vec<(usize, usize, ActivationFunction)> {
        let mut shapes = Vec::with_capacity(self.hidden.len() + 1);
        let mut fan_in = self.input_size;
        for layer in &self.hidden {
            shapes.push((fan_in, layer.size, layer.activation));
            fan_in = layer.size;
        }
        shapes.push((fan_in, self.num_classes, ActivationFunction::Identity));
        shapes
    }
}
