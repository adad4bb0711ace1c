pub mod metadata;
pub mod model;
pub mod network;
pub mod spec;

pub use metadata::ImageShape;
pub use model::{EmbeddingModel, TrainableModel};
pub use network::EmbeddingNet;
pub use spec::NetworkSpec;
