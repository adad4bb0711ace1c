pub mod sgd;
pub mod adam;

use serde::{Serialize, Deserialize};

use crate::{layers::dense::Layer, math::matrix::Matrix};

pub use adam::Adam;
pub use sgd::Sgd;

/// Turns raw gradients into a parameter update for one layer.
///
/// `index` identifies the layer so stateful optimizers can keep per-layer
/// moment estimates.
pub trait Optimizer {
    fn step(&mut self, index: usize, layer: &mut Layer, weights_grad: Matrix, biases_grad: Matrix);
}

/// Optimizer selection as it appears in a training configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Sgd,
    Adam,
}

impl OptimizerKind {
    pub fn build(self, learning_rate: f64) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::Sgd => Box::new(Sgd::new(learning_rate)),
            OptimizerKind::Adam => Box::new(Adam::new(learning_rate)),
        }
    }
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn step(&mut self, index: usize, layer: &mut Layer, weights_grad: Matrix, biases_grad: Matrix) {
        (**self).step(index, layer, weights_grad, biases_grad)
    }
}
