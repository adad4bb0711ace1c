use crate::data::image::ImageLoader;
use crate::data::sample::Sample;
use crate::error::{FaceNetError, Result};
use crate::math::matrix::{l2_norm, l2_normalize, Matrix};
use crate::network::model::EmbeddingModel;

/// Embeddings of a pool, tagged with the model version that produced them.
#[derive(Debug, Clone)]
pub struct Embeddings {
    pub version: u64,
    /// One unit-norm embedding per row.
    pub vectors: Matrix,
}

/// Read-only view of the current model used for mining.
///
/// Holding a shared borrow of the model guarantees no optimizer step can run
/// while a pool is being embedded.
pub struct EmbeddingOracle<'a, M: ?Sized> {
    model: &'a M,
}

impl<'a, M: EmbeddingModel + ?Sized> EmbeddingOracle<'a, M> {
    pub fn new(model: &'a M) -> Self {
        EmbeddingOracle { model }
    }

    /// Embeds already-preprocessed images.
    pub fn embed(&self, images: &[Vec<f64>]) -> Result<Embeddings> {
        if images.is_empty() {
            return Err(FaceNetError::EmbeddingComputation { reason: "empty image batch".to_string() });
        }
        let expected = self.model.input_size();
        let mut rows = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            if image.len() != expected {
                return Err(FaceNetError::EmbeddingComputation {
                    reason: format!("image {} has {} values, model expects {}", i, image.len(), expected),
                });
            }
            let embedding = self.model.embed(image);
            if embedding.len() != self.model.emb_size() || embedding.iter().any(|x| !x.is_finite()) {
                return Err(FaceNetError::EmbeddingComputation {
                    reason: format!("model produced an invalid embedding for image {}", i),
                });
            }
            if l2_norm(&embedding) <= f64::EPSILON {
                return Err(FaceNetError::EmbeddingComputation {
                    reason: format!("model produced a zero embedding for image {}", i),
                });
            }
            rows.push(l2_normalize(&embedding));
        }
        Ok(Embeddings {
            version: self.model.version(),
            vectors: Matrix::from_data(rows),
        })
    }

    /// Loads `samples` through `loader` and embeds them. Returns the
    /// preprocessed images alongside so callers need not decode them twice.
    pub fn embed_samples<L: ImageLoader + ?Sized>(
        &self,
        loader: &L,
        samples: &[Sample],
    ) -> Result<(Vec<Vec<f64>>, Embeddings)> {
        let images = samples.iter().map(|s| loader.load(s)).collect::<Result<Vec<_>>>()?;
        let embeddings = self.embed(&images)?;
        Ok((images, embeddings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationFunction;
    use crate::network::{EmbeddingNet, ImageShape, NetworkSpec};
    use rand::{rngs::StdRng, SeedableRng};

    /// Returns its input unnormalized, which the oracle must fix.
    struct Passthrough;

    impl EmbeddingModel for Passthrough {
        fn input_size(&self) -> usize { 2 }
        fn emb_size(&self) -> usize { 2 }
        fn version(&self) -> u64 { 7 }
        fn embed(&self, input: &[f64]) -> Vec<f64> { input.to_vec() }
    }

    #[test]
    fn output_rows_are_unit_norm_and_versioned() {
        let out = EmbeddingOracle::new(&Passthrough).embed(&[vec![3.0, 4.0], vec![0.0, -2.0]]).unwrap();
        assert_eq!(out.version, 7);
        for row in &out.vectors.data {
            assert!((l2_norm(row) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn empty_and_malformed_batches_fail() {
        let oracle = EmbeddingOracle::new(&Passthrough);
        assert!(matches!(oracle.embed(&[]), Err(FaceNetError::EmbeddingComputation { .. })));
        assert!(matches!(oracle.embed(&[vec![1.0]]), Err(FaceNetError::EmbeddingComputation { .. })));
    }

    #[test]
    fn zero_embedding_is_rejected() {
        let oracle = EmbeddingOracle::new(&Passthrough);
        let err = oracle.embed(&[vec![1.0, 0.0], vec![0.0, 0.0]]).unwrap_err();
        assert!(matches!(err, FaceNetError::EmbeddingComputation { .. }), "{}", err);
    }

    #[test]
    fn black_image_on_fresh_relu_net_is_rejected() {
        let spec = NetworkSpec {
            name: "relu".into(),
            input: ImageShape { width: 2, height: 2, channels: 1 },
            hidden: vec![6],
            activation: ActivationFunction::ReLU,
            emb_size: 3,
        };
        let net = EmbeddingNet::new(spec, &mut StdRng::seed_from_u64(1));
        let oracle = EmbeddingOracle::new(&net);
        assert!(matches!(
            oracle.embed(&[vec![0.0; 4], vec![0.5; 4]]),
            Err(FaceNetError::EmbeddingComputation { .. })
        ));
    }
}
