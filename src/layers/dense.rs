use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::{math::matrix::Matrix, activation::activation::ActivationFunction};

/// Fully connected layer computing `a = σ(x·W + b)` on row vectors.
///
/// The layer holds parameters only. Activations of a forward pass live in a
/// [`LayerTrace`] owned by the caller, so inference takes `&self` and the
/// optimizer step is the only place a layer is mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub size: usize,
    pub input_size: usize,
    /// Shape `input_size × size`.
    pub weights: Matrix,
    /// Shape `1 × size`.
    pub biases: Matrix,
    pub activator: ActivationFunction,
}

/// Values recorded during one forward pass, needed for backpropagation.
#[derive(Debug, Clone)]
pub struct LayerTrace {
    pub input: Matrix,
    /// Pre-activation `z = x·W + b`.
    pub pre: Matrix,
    pub output: Matrix,
}

impl Layer {
    pub fn new<R: Rng + ?Sized>(
        size: usize,
        input_size: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> Layer {
        let weights = if activation.prefers_he_init() {
            Matrix::he(input_size, size, rng)
        } else {
            Matrix::xavier(input_size, size, rng)
        };
        Layer {
            size,
            input_size,
            weights,
            biases: Matrix::zeros(1, size),
            activator: activation,
        }
    }

    pub fn forward(&self, input: Vec<f64>) -> LayerTrace {
        let input = Matrix::row_vector(input);
        let pre = &input * &self.weights + self.biases.clone();
        let output = pre.map(|x| self.activator.function(x));
        LayerTrace { input, pre, output }
    }

    /// Backpropagates `delta` (∂L/∂a for this layer's output) through the layer.
    ///
    /// Returns `(weights_grad, biases_grad, input_delta)` where `input_delta`
    /// is ∂L/∂x, the delta for the previous layer.
    pub fn compute_gradients(&self, delta: &Matrix, trace: &LayerTrace) -> (Matrix, Matrix, Matrix) {
        // δ = error ⊙ σ'(z)
        let act_derivative = trace.pre.map(|x| self.activator.derivative(x));
        let layer_delta = delta.hadamard(&act_derivative);

        let weights_grad = &trace.input.transpose() * &layer_delta;
        let input_delta = &layer_delta * &self.weights.transpose();

        (weights_grad, layer_delta, input_delta)
    }

    /// Subtracts pre-scaled parameter steps produced by an optimizer.
    pub fn apply_step(&mut self, weights_step: Matrix, biases_step: Matrix) {
        self.weights = self.weights.clone() - weights_step;
        self.biases = self.biases.clone() - biases_step;
    }
}
