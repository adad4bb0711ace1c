use std::path::{Path, PathBuf};
use std::sync::mpsc;

use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{FaceNetError, Result};
use crate::loss::triplet::DEFAULT_ALPHA;
use crate::mining::controller::RatioCurve;
use crate::mining::selector::NegativePolicy;
use crate::network::metadata::ImageShape;
use crate::network::spec::NetworkSpec;
use crate::optim::OptimizerKind;
use crate::train::epoch_stats::EpochStats;

/// Configuration for a `train_loop` run.
///
/// Every field has a default, so a JSON file only needs the values it
/// changes.
///
/// # Fields
/// - `batch_size`        : images per batch, laid out `[a, p, n, ...]`
/// - `start_epoch`       : first epoch number; raise it when resuming
/// - `max_epoch`         : exclusive, epochs `start_epoch..max_epoch` run
/// - `max_step`          : training steps per epoch
/// - `max_step_test`     : evaluation batches per epoch
/// - `nbof_subclasses`   : classes drawn into each mining pool
/// - `alpha`             : triplet margin
/// - `emb_size`, `hidden_layers`, `activation`, `image`
///                       architecture of a fresh network
/// - `valid_split`, `test_split`
///                       fractions of classes held out
/// - `learning_rate`, `optimizer`
///                       update rule
/// - `negative_policy`   : hardest or semi-hard negatives
/// - `ratio_curve`       : how running metrics map to the hardness ratio
/// - `batches_per_cycle` : batches emitted per mined pool
/// - `max_pool_retries`  : failed cycles tolerated in a row
/// - `use_aug`           : augment training batches
/// - `seed`              : seed for every random draw; entropy when absent
/// - `network_name`, `date`
///                       checkpoint key parts
/// - `model_dir`, `history_dir`
///                       checkpoint locations
/// - `progress_tx`       : optional channel sender; one `EpochStats` is sent
///                         per completed epoch. If the receiver is dropped
///                         the loop terminates after the current epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Images per batch; a multiple of 3 (`[a, p, n, ...]`).
    pub batch_size: usize,
    pub start_epoch: usize,
    pub max_epoch: usize,
    /// Training steps per epoch.
    pub max_step: usize,
    /// Evaluation batches per epoch.
    pub max_step_test: usize,
    /// Classes drawn into each mining pool.
    pub nbof_subclasses: usize,
    /// Triplet margin.
    pub alpha: f64,
    pub emb_size: usize,
    pub hidden_layers: Vec<usize>,
    pub activation: ActivationFunction,
    pub image: ImageShape,
    pub valid_split: f64,
    pub test_split: f64,
    pub learning_rate: f64,
    pub optimizer: OptimizerKind,
    pub negative_policy: NegativePolicy,
    pub ratio_curve: RatioCurve,
    pub batches_per_cycle: usize,
    pub max_pool_retries: usize,
    /// Augment training batches.
    pub use_aug: bool,
    /// Seed for every random draw; entropy when absent.
    pub seed: Option<u64>,
    pub network_name: String,
    /// Checkpoint key prefix such as `2019.05.08`; today's date when absent.
    pub date: Option<String>,
    pub model_dir: PathBuf,
    pub history_dir: PathBuf,

    /// Receives one `EpochStats` per completed epoch. Training stops after
    /// the current epoch once the receiver is dropped.
    #[serde(skip)]
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            batch_size: 30,
            start_epoch: 1,
            max_epoch: 1001,
            max_step: 300,
            max_step_test: 30,
            nbof_subclasses: 10,
            alpha: DEFAULT_ALPHA,
            emb_size: 128,
            hidden_layers: vec![256],
            activation: ActivationFunction::ReLU,
            image: ImageShape::default(),
            valid_split: 0.1,
            test_split: 0.1,
            learning_rate: 0.001,
            optimizer: OptimizerKind::Adam,
            negative_policy: NegativePolicy::Hardest,
            ratio_curve: RatioCurve::Logistic,
            batches_per_cycle: 1,
            max_pool_retries: 10,
            use_aug: false,
            seed: None,
            network_name: "dogfacenet".to_string(),
            date: None,
            model_dir: PathBuf::from("output/model"),
            history_dir: PathBuf::from("output/history"),
            progress_tx: None,
        }
    }
}

impl TrainConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<TrainConfig> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(FaceNetError::InvalidConfig(msg));
        if self.batch_size == 0 || self.batch_size % 3 != 0 {
            return fail(format!("batch_size must be a positive multiple of 3, got {}", self.batch_size));
        }
        if self.max_epoch <= self.start_epoch {
            return fail(format!("max_epoch ({}) must exceed start_epoch ({})", self.max_epoch, self.start_epoch));
        }
        if self.max_step == 0 || self.max_step_test == 0 {
            return fail("max_step and max_step_test must be at least 1".to_string());
        }
        if self.nbof_subclasses < 2 {
            return fail(format!("nbof_subclasses must be at least 2, got {}", self.nbof_subclasses));
        }
        if !(self.alpha >= 0.0) {
            return fail(format!("alpha must be non-negative, got {}", self.alpha));
        }
        if self.emb_size == 0 || self.image.is_empty() {
            return fail("emb_size and image dimensions must be non-zero".to_string());
        }
        if !(self.learning_rate > 0.0) {
            return fail(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        for (name, value) in [("valid_split", self.valid_split), ("test_split", self.test_split)] {
            if !(0.0..1.0).contains(&value) {
                return fail(format!("{} must be in [0, 1), got {}", name, value));
            }
        }
        if self.valid_split + self.test_split >= 1.0 {
            return fail("valid_split + test_split must be below 1".to_string());
        }
        Ok(())
    }

    /// Architecture described by this configuration.
    pub fn network_spec(&self) -> NetworkSpec {
        NetworkSpec {
            name: self.network_name.clone(),
            input: self.image,
            hidden: self.hidden_layers.clone(),
            activation: self.activation,
            emb_size: self.emb_size,
        }
    }

    /// Checkpoint key prefix: the configured date or today's.
    pub fn date_prefix(&self) -> String {
        self.date
            .clone()
            .unwrap_or_else(|| chrono::Local::now().format("%Y.%m.%d").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        TrainConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: TrainConfig = serde_json::from_str(r#"{"batch_size": 12, "negative_policy": "semi_hard"}"#).unwrap();
        assert_eq!(cfg.batch_size, 12);
        assert_eq!(cfg.negative_policy, NegativePolicy::SemiHard);
        assert_eq!(cfg.alpha, DEFAULT_ALPHA);
        assert_eq!(cfg.max_step, 300);
    }

    #[test]
    fn rejects_inconsistent_values() {
        let bad = [
            TrainConfig { batch_size: 31, ..TrainConfig::default() },
            TrainConfig { nbof_subclasses: 1, ..TrainConfig::default() },
            TrainConfig { alpha: -0.1, ..TrainConfig::default() },
            TrainConfig { test_split: 0.6, valid_split: 0.5, ..TrainConfig::default() },
            TrainConfig { max_epoch: 1, ..TrainConfig::default() },
        ];
        for cfg in bad {
            assert!(matches!(cfg.validate(), Err(FaceNetError::InvalidConfig(_))), "{:?}", cfg.batch_size);
        }
    }

    #[test]
    fn explicit_date_is_used_verbatim() {
        let cfg = TrainConfig { date: Some("2019.05.08".into()), ..TrainConfig::default() };
        assert_eq!(cfg.date_prefix(), "2019.05.08");
    }
}
