pub mod checkpoint;
pub mod epoch_stats;
pub mod history;
pub mod loop_fn;
pub mod state;
pub mod train_config;

pub use checkpoint::{CheckpointKey, CheckpointStore, JsonCheckpointStore};
pub use epoch_stats::EpochStats;
pub use history::History;
pub use loop_fn::{train_loop, Trainer, TrainingSummary};
pub use state::{Phase, RunningMetrics, TrainingState};
pub use train_config::TrainConfig;
