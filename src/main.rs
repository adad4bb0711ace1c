use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use serde::de::DeserializeOwned;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ferrite_facenet::data::{prune_singletons, scan_corpus, DatasetSplit, FileImageLoader};
use ferrite_facenet::mining::{NegativePolicy, RatioCurve};
use ferrite_facenet::network::EmbeddingNet;
use ferrite_facenet::train::{train_loop, JsonCheckpointStore, TrainConfig};

/// Train a face-embedding network with online adaptive hard-triplet mining.
#[derive(Debug, Parser)]
#[command(name = "ferrite-facenet", version, about)]
struct Cli {
    /// Corpus root: one sub-directory of images per identity.
    #[arg(long)]
    data_dir: PathBuf,

    /// JSON training configuration; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Continue from saved weights instead of a fresh network.
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Delete identity directories holding a single image before training.
    #[arg(long)]
    prune_singletons: bool,

    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long)]
    start_epoch: Option<usize>,
    #[arg(long)]
    max_epoch: Option<usize>,
    #[arg(long)]
    max_step: Option<usize>,
    #[arg(long)]
    max_step_test: Option<usize>,
    #[arg(long)]
    nbof_subclasses: Option<usize>,
    #[arg(long)]
    alpha: Option<f64>,
    #[arg(long)]
    emb_size: Option<usize>,
    #[arg(long)]
    valid_split: Option<f64>,
    #[arg(long)]
    test_split: Option<f64>,
    /// `hardest` or `semi_hard`.
    #[arg(long, value_parser = parse_snake_case::<NegativePolicy>)]
    negative_policy: Option<NegativePolicy>,
    /// `logistic` or `loss_decay`.
    #[arg(long, value_parser = parse_snake_case::<RatioCurve>)]
    ratio_curve: Option<RatioCurve>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    use_aug: bool,
    #[arg(long)]
    network_name: Option<String>,
    /// Checkpoint key date prefix, e.g. 2019.05.08.
    #[arg(long)]
    date: Option<String>,
    #[arg(long)]
    model_dir: Option<PathBuf>,
    #[arg(long)]
    history_dir: Option<PathBuf>,
}

impl Cli {
    fn config(&self) -> anyhow::Result<TrainConfig> {
        let mut cfg = match &self.config {
            Some(path) => TrainConfig::load_json(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => TrainConfig::default(),
        };
        macro_rules! override_with {
            ($($field:ident),*) => {
                $(if let Some(v) = self.$field.clone() { cfg.$field = v; })*
            };
        }
        override_with!(batch_size, start_epoch, max_epoch, max_step, max_step_test,
                       nbof_subclasses, alpha, emb_size, valid_split, test_split, negative_policy,
                       ratio_curve, network_name, model_dir, history_dir);
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        if self.date.is_some() {
            cfg.date = self.date.clone();
        }
        cfg.use_aug |= self.use_aug;
        Ok(cfg)
    }
}

/// Parses a flag value with the same spelling the JSON config uses.
fn parse_snake_case<T: DeserializeOwned>(value: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).map_err(|e| e.to_string())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;
    config.validate().context("invalid training configuration")?;

    let scan = scan_corpus(&cli.data_dir)
        .with_context(|| format!("scanning corpus {}", cli.data_dir.display()))?;
    if !scan.singletons.is_empty() {
        if cli.prune_singletons {
            let removed = prune_singletons(&scan).context("pruning single-image identities")?;
            info!(removed, "pruned single-image identities");
        } else {
            warn!(count = scan.singletons.len(), "single-image identities ignored");
        }
    }
    if scan.class_count < 2 {
        bail!("corpus {} has {} usable identities; at least 2 are needed", cli.data_dir.display(), scan.class_count);
    }

    let split = DatasetSplit::by_classes(scan.samples, config.test_split, config.valid_split)
        .context("splitting corpus")?;
    info!(
        train = split.train.len(),
        valid = split.valid.len(),
        test = split.test.len(),
        "corpus split"
    );

    let model = match &cli.resume {
        Some(path) => {
            let net = EmbeddingNet::load_json(path)
                .with_context(|| format!("loading weights {}", path.display()))?;
            if !net.spec.same_architecture(&config.network_spec()) {
                warn!(
                    resumed = ?net.spec,
                    configured = ?config.network_spec(),
                    "resumed weights override the configured architecture"
                );
            }
            net
        }
        None => {
            let mut rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            EmbeddingNet::new(config.network_spec(), &mut rng)
        }
    };

    let loader = FileImageLoader::new(config.image);
    let store = JsonCheckpointStore::new(&config.model_dir, &config.history_dir);
    let (_, summary) = train_loop(&config, &split, model, &loader, store).context("training failed")?;

    info!(epochs = summary.epochs_run, "training finished");
    if let Some(test) = summary.final_test {
        println!("test loss: {:.4}  test accuracy: {:.4}", test.loss, test.accuracy);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_split_and_mining_options() {
        let cli = Cli::try_parse_from([
            "ferrite-facenet", "--data-dir", "dogs",
            "--valid-split", "0.2", "--test-split", "0.15",
            "--negative-policy", "semi_hard", "--ratio-curve", "loss_decay",
        ])
        .unwrap();
        let cfg = cli.config().unwrap();
        assert_eq!(cfg.valid_split, 0.2);
        assert_eq!(cfg.test_split, 0.15);
        assert_eq!(cfg.negative_policy, NegativePolicy::SemiHard);
        assert_eq!(cfg.ratio_curve, RatioCurve::LossDecay);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let parsed = Cli::try_parse_from(["ferrite-facenet", "--data-dir", "dogs", "--negative-policy", "easiest"]);
        assert!(parsed.is_err());
    }
}
