//! Online hard-triplet mining.
//!
//! Each generation cycle draws a pool of classes, embeds it with the current
//! model, measures distances and mixes mined triplets with random ones in a
//! proportion set by the adaptive controller.

pub mod controller;
pub mod distance;
pub mod generator;
pub mod oracle;
pub mod selector;

pub use controller::{AdaptiveController, HardnessRatio, RatioCurve};
pub use distance::{pairwise_sqdist, sqdist};
pub use generator::{AdaptiveTripletGenerator, CycleInfo, GeneratorConfig, RandomTripletGenerator};
pub use oracle::{EmbeddingOracle, Embeddings};
pub use selector::{CandidatePool, HardPairSelector, NegativePolicy, TripletIndices};
