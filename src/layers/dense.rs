use rand::Rng;

use crate::{activation::activation::ActivationFunction, math::matrix::Matrix};

/// Fully connected layer operating on a whole batch at once.
///
/// Weights are stored `(inputs, units)` so the forward pass is `x · W + b`
/// with one sample per row of `x`.
#[derive(Debug, Clone)]
pub struct Dense {
    pub weights: Matrix,
    pub biases: Matrix,
    pub activator: ActivationFunction,
    input: Matrix,        // cached batch input, needed for the weight gradient
    pre_neurons: Matrix,  // pre-activation values (z = xW + b) needed for correct derivative
}

/// Gradients produced by one `Dense::backward` call.
#[derive(Debug, Clone)]
pub struct DenseGradients {
    pub weights: Matrix,
    pub biases: Matrix,
    /// ∂L/∂x, the error propagated to the previous layer.
    pub input: Matrix,
}

impl Dense {
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Dense {
        let weights = if activation.prefers_he_init() {
            Matrix::he(input_size, size, rng)
        } else {
            Matrix::xavier(input_size, size, rng)
        };

        Dense {
            weights,
            biases: Matrix::zeros(1, size),
            activator: activation,
            input: Matrix::default(),
            pre_neurons: Matrix::default(),
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.rows
    }

    pub fn size(&self) -> usize {
        self.weights.cols
    }

    /// Forward pass; caches the input and pre-activation for `backward`.
    pub fn forward(&mut self, input: &Matrix) -> Matrix {
        let z = input.dot(&self.weights).add_row(&self.biases);
        let a = z.map(|x| self.activator.function(x));
        self.input = input.clone();
        self.pre_neurons = z;
        a
    }

    /// `grad_output` is ∂L/∂a for this layer (error in activation space),
    /// already averaged over the batch by the loss.
    pub fn backward(&self, grad_output: &Matrix) -> DenseGradients {
        // Use pre-activation z so that derivative(z) = σ'(z) is computed correctly
        let act_derivative = self.pre_neurons.map(|x| self.activator.derivative(x));
        // Element-wise (Hadamard) product: δ = error ⊙ σ'(z)
        let delta = grad_output.hadamard(&act_derivative);

        DenseGradients {
            weights: self.input.transpose().dot(&delta),
            biases: delta.sum_rows(),
            input: delta.dot(&self.weights.transpose()),
        }
    }
}
