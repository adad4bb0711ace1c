use crate::loss::triplet::{BatchMetrics, TripletLoss};
use crate::optim::Optimizer;

/// A model mapping one preprocessed image to an embedding vector.
///
/// Implementations must return unit-norm vectors of length `emb_size()`.
/// `embed` never mutates the model; only [`TrainableModel::train_on_batch`]
/// does, and each such call advances `version()`.
pub trait EmbeddingModel {
    fn input_size(&self) -> usize;
    fn emb_size(&self) -> usize;
    /// Number of optimizer updates applied so far.
    fn version(&self) -> u64;
    fn embed(&self, input: &[f64]) -> Vec<f64>;
}

/// An embedding model that can be trained on triplet batches.
pub trait TrainableModel: EmbeddingModel {
    /// One optimizer update on a `[a, p, n, ...]` batch. The returned metrics
    /// are measured before the update is applied.
    fn train_on_batch(
        &mut self,
        inputs: &[Vec<f64>],
        loss: &TripletLoss,
        optimizer: &mut dyn Optimizer,
    ) -> BatchMetrics;

    /// Forward-only evaluation of a `[a, p, n, ...]` batch.
    fn test_on_batch(&self, inputs: &[Vec<f64>], loss: &TripletLoss) -> BatchMetrics {
        let embeddings: Vec<Vec<f64>> = inputs.iter().map(|x| self.embed(x)).collect();
        loss.metrics(&embeddings)
    }
}
