pub mod triplet;

pub use triplet::{BatchMetrics, TripletLoss, DEFAULT_ALPHA};
