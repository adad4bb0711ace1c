pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod data;
pub mod mining;
pub mod train;
pub mod error;

// Convenience re-exports
pub use math::matrix::Matrix;
pub use activation::activation::ActivationFunction;
pub use network::{EmbeddingModel, EmbeddingNet, NetworkSpec, TrainableModel};
pub use loss::triplet::{BatchMetrics, TripletLoss};
pub use data::{DatasetSplit, Sample};
pub use mining::{AdaptiveController, HardPairSelector, HardnessRatio};
pub use train::{train_loop, TrainConfig, Trainer};
pub use error::{FaceNetError, MiningError, Result};
