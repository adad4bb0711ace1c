use std::path::Path;

use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::Result;
use crate::layers::dense::{Layer, LayerTrace};
use crate::loss::triplet::{BatchMetrics, TripletLoss};
use crate::math::matrix::{l2_norm, l2_normalize, Matrix};
use crate::network::model::{EmbeddingModel, TrainableModel};
use crate::network::spec::NetworkSpec;
use crate::optim::Optimizer;

/// Dense embedding network with an L2-normalization head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingNet {
    pub spec: NetworkSpec,
    pub layers: Vec<Layer>,
    #[serde(default)]
    version: u64,
}

impl EmbeddingNet {
    pub fn new<R: Rng + ?Sized>(spec: NetworkSpec, rng: &mut R) -> EmbeddingNet {
        let layers = spec.layer_shapes()
            .into_iter()
            .map(|(size, input_size, activation)| Layer::new(size, input_size, activation, rng))
            .collect();
        EmbeddingNet { spec, layers, version: 0 }
    }

    /// Forward pass keeping every layer's activations for backprop.
    fn forward_traced(&self, input: &[f64]) -> Vec<LayerTrace> {
        let mut traces: Vec<LayerTrace> = Vec::with_capacity(self.layers.len());
        let mut current = input.to_vec();
        for layer in &self.layers {
            let trace = layer.forward(current);
            current = trace.output.data[0].clone();
            traces.push(trace);
        }
        traces
    }

    /// Un-normalized output of the last layer.
    fn raw_output(&self, input: &[f64]) -> Vec<f64> {
        let mut current = input.to_vec();
        for layer in &self.layers {
            current = layer.forward(current).output.data.swap_remove(0);
        }
        current
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer(std::io::BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<EmbeddingNet> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

/// Backpropagates `grad` (∂L/∂y) through `y = x / ‖x‖`.
fn normalize_backward(raw: &[f64], normalized: &[f64], grad: &[f64]) -> Vec<f64> {
    let norm = l2_norm(raw);
    if norm <= f64::EPSILON {
        return grad.to_vec();
    }
    let projection: f64 = normalized.iter().zip(grad).map(|(y, g)| y * g).sum();
    normalized.iter().zip(grad)
        .map(|(y, g)| (g - y * projection) / norm)
        .collect()
}

impl EmbeddingModel for EmbeddingNet {
    fn input_size(&self) -> usize {
        self.spec.input.len()
    }

    fn emb_size(&self) -> usize {
        self.spec.emb_size
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn embed(&self, input: &[f64]) -> Vec<f64> {
        l2_normalize(&self.raw_output(input))
    }
}

impl TrainableModel for EmbeddingNet {
    fn train_on_batch(
        &mut self,
        inputs: &[Vec<f64>],
        loss: &TripletLoss,
        optimizer: &mut dyn Optimizer,
    ) -> BatchMetrics {
        let traces: Vec<Vec<LayerTrace>> = inputs.iter().map(|x| self.forward_traced(x)).collect();
        let raws: Vec<Vec<f64>> = traces.iter()
            .map(|t| t.last().map(|l| l.output.data[0].clone()).unwrap_or_default())
            .collect();
        let embeddings: Vec<Vec<f64>> = raws.iter()
            .map(|r| l2_normalize(r))
            .collect();

        let metrics = loss.metrics(&embeddings);
        let emb_grads = loss.gradient(&embeddings);

        let mut acc_grads: Vec<(Matrix, Matrix)> = self.layers.iter()
            .map(|layer| (
                Matrix::zeros(layer.weights.rows, layer.weights.cols),
                Matrix::zeros(layer.biases.rows, layer.biases.cols),
            ))
            .collect();

        for (i, sample_traces) in traces.iter().enumerate() {
            if emb_grads[i].iter().all(|&g| g == 0.0) {
                continue;
            }
            let raw_grad = normalize_backward(&raws[i], &embeddings[i], &emb_grads[i]);
            let mut delta = Matrix::row_vector(raw_grad);
            for l in (0..self.layers.len()).rev() {
                let (w_grad, b_grad, input_delta) = self.layers[l].compute_gradients(&delta, &sample_traces[l]);
                let (w_acc, b_acc) = std::mem::take(&mut acc_grads[l]);
                acc_grads[l] = (w_acc + w_grad, b_acc + b_grad);
                delta = input_delta;
            }
        }

        for (l, (w_grad, b_grad)) in acc_grads.into_iter().enumerate() {
            optimizer.step(l, &mut self.layers[l], w_grad, b_grad);
        }
        self.version += 1;

        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use crate::network::metadata::ImageShape;
    use crate::optim::Sgd;
    use rand::{rngs::StdRng, SeedableRng};

    fn tiny_spec() -> NetworkSpec {
        NetworkSpec {
            name: "tiny".into(),
            input: ImageShape { width: 2, height: 2, channels: 1 },
            hidden: vec![8],
            activation: ActivationFunction::Tanh,
            emb_size: 3,
        }
    }

    #[test]
    fn embeddings_have_unit_norm() {
        let net = EmbeddingNet::new(tiny_spec(), &mut StdRng::seed_from_u64(11));
        let e = net.embed(&[0.1, 0.5, 0.9, 0.3]);
        assert_eq!(e.len(), 3);
        assert!((l2_norm(&e) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn normalize_backward_matches_finite_difference() {
        let raw = vec![0.4, -1.2, 0.7];
        let grad = vec![0.3, 0.1, -0.5];
        let analytic = normalize_backward(&raw, &l2_normalize(&raw), &grad);
        let f = |x: &[f64]| -> f64 {
            l2_normalize(x).iter().zip(&grad).map(|(y, g)| y * g).sum()
        };
        let h = 1e-6;
        for k in 0..3 {
            let mut up = raw.clone();
            up[k] += h;
            let mut down = raw.clone();
            down[k] -= h;
            let numeric = (f(&up) - f(&down)) / (2.0 * h);
            assert!((numeric - analytic[k]).abs() < 1e-6);
        }
    }

    #[test]
    fn training_reduces_loss_on_a_fixed_triplet() {
        let mut net = EmbeddingNet::new(tiny_spec(), &mut StdRng::seed_from_u64(5));
        let batch = vec![
            vec![0.9, 0.1, 0.8, 0.2],
            vec![0.8, 0.2, 0.9, 0.1],
            vec![0.85, 0.15, 0.85, 0.15],
        ];
        let loss = TripletLoss::new(0.3);
        let mut sgd = Sgd::new(0.02);
        let before = net.test_on_batch(&batch, &loss).loss;
        for _ in 0..100 {
            net.train_on_batch(&batch, &loss, &mut sgd);
        }
        let after = net.test_on_batch(&batch, &loss).loss;
        assert!(after < before || after == 0.0, "loss {} -> {}", before, after);
        assert_eq!(net.version(), 100);
    }

    #[test]
    fn checkpoint_round_trip_preserves_embeddings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.json");
        let net = EmbeddingNet::new(tiny_spec(), &mut StdRng::seed_from_u64(2));
        net.save_json(&path).unwrap();
        let loaded = EmbeddingNet::load_json(&path).unwrap();
        let x = [0.2, 0.4, 0.6, 0.8];
        let (a, b) = (net.embed(&x), loaded.embed(&x));
        assert!(a.iter().zip(&b).all(|(p, q)| (p - q).abs() < 1e-12));
    }
}
