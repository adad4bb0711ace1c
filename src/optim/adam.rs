use crate::{math::matrix::Matrix, layers::dense::Layer, optim::Optimizer};

/// First and second moment estimates for one layer.
#[derive(Debug, Clone)]
struct Moments {
    m_w: Matrix,
    v_w: Matrix,
    m_b: Matrix,
    v_b: Matrix,
    t: i32,
}

impl Moments {
    fn for_layer(layer: &Layer) -> Moments {
        Moments {
            m_w: Matrix::zeros(layer.weights.rows, layer.weights.cols),
            v_w: Matrix::zeros(layer.weights.rows, layer.weights.cols),
            m_b: Matrix::zeros(layer.biases.rows, layer.biases.cols),
            v_b: Matrix::zeros(layer.biases.rows, layer.biases.cols),
            t: 0,
        }
    }
}

/// Adaptive Moment Estimation with bias correction.
#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    state: Vec<Option<Moments>>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Adam {
        Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            state: Vec::new(),
        }
    }

    fn update(
        &self,
        m: &mut Matrix,
        v: &mut Matrix,
        grad: &Matrix,
        t: i32,
    ) -> Matrix {
        let (b1, b2) = (self.beta1, self.beta2);
        let correction1 = 1.0 - b1.powi(t);
        let correction2 = 1.0 - b2.powi(t);
        let mut step = Matrix::zeros(grad.rows, grad.cols);
        for i in 0..grad.rows {
            for j in 0..grad.cols {
                let g = grad.data[i][j];
                m.data[i][j] = b1 * m.data[i][j] + (1.0 - b1) * g;
                v.data[i][j] = b2 * v.data[i][j] + (1.0 - b2) * g * g;
                let m_hat = m.data[i][j] / correction1;
                let v_hat = v.data[i][j] / correction2;
                step.data[i][j] = self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
            }
        }
        step
    }
}

impl Optimizer for Adam {
    fn step(&mut self, index: usize, layer: &mut Layer, weights_grad: Matrix, biases_grad: Matrix) {
        if self.state.len() <= index {
            self.state.resize(index + 1, None);
        }
        let mut moments = self.state[index]
            .take()
            .unwrap_or_else(|| Moments::for_layer(layer));
        moments.t += 1;

        let w_step = self.update(&mut moments.m_w, &mut moments.v_w, &weights_grad, moments.t);
        let b_step = self.update(&mut moments.m_b, &mut moments.v_b, &biases_grad, moments.t);
        layer.apply_step(w_step, b_step);

        self.state[index] = Some(moments);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn first_step_moves_each_weight_by_learning_rate() {
        let mut layer = Layer::new(2, 2, ActivationFunction::Identity, &mut StdRng::seed_from_u64(1));
        let before = layer.weights.clone();
        let grad = Matrix::from_data(vec![vec![0.5, -2.0], vec![3.0, 0.1]]);
        let mut adam = Adam::new(0.01);
        adam.step(0, &mut layer, grad.clone(), Matrix::zeros(1, 2));

        for i in 0..2 {
            for j in 0..2 {
                let moved = before.data[i][j] - layer.weights.data[i][j];
                assert!((moved - 0.01 * grad.data[i][j].signum()).abs() < 1e-6);
            }
        }
    }
}
