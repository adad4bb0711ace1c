pub mod augment;
pub mod corpus;
pub mod image;
pub mod sample;
pub mod split;

pub use augment::{Augmenter, FlipShiftJitter};
pub use corpus::{prune_singletons, scan_corpus, CorpusScan};
pub use image::{FileImageLoader, ImageLoader, MemoryImageLoader};
pub use sample::{group_by_class, Batch, Sample, Triplet};
pub use split::DatasetSplit;
