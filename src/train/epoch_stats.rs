use serde::{Serialize, Deserialize};

/// Per-epoch summary emitted by the trainer.
///
/// When `TrainConfig::progress_tx` is set, one value is sent at the end of
/// every completed epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochStats {
    pub epoch: usize,
    /// Exclusive upper bound of the epoch range.
    pub max_epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    /// Fraction of training triplets satisfying the margin, in [0, 1].
    pub train_accuracy: f64,
    pub val_accuracy: f64,
    /// Hardness ratio in effect after the last training step.
    pub hard_ratio: f64,
    /// Model version after the epoch (optimizer steps applied so far).
    pub model_version: u64,
    pub elapsed_ms: u64,
}
