use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

use crate::data::augment::FlipShiftJitter;
use crate::data::image::ImageLoader;
use crate::data::split::DatasetSplit;
use crate::error::{FaceNetError, Result};
use crate::loss::triplet::{BatchMetrics, TripletLoss};
use crate::mining::controller::AdaptiveController;
use crate::mining::generator::{AdaptiveTripletGenerator, GeneratorConfig, RandomTripletGenerator};
use crate::mining::selector::HardPairSelector;
use crate::network::model::TrainableModel;
use crate::optim::Optimizer;
use crate::train::checkpoint::{CheckpointKey, CheckpointStore};
use crate::train::epoch_stats::EpochStats;
use crate::train::history::History;
use crate::train::state::{Phase, RunningMetrics, TrainingState};
use crate::train::train_config::TrainConfig;

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub epochs_run: usize,
    pub history: History,
    /// Held-out test metrics after the last epoch, when the test split was
    /// not already used for per-epoch evaluation.
    pub final_test: Option<BatchMetrics>,
    /// True when the progress receiver went away before `max_epoch`.
    pub stopped_early: bool,
}

/// Coordinates mining, optimization, evaluation and checkpointing.
///
/// The model is owned here and mutated only by `train_on_batch`; the
/// generators borrow it immutably for the duration of a mining cycle.
pub struct Trainer<'a, M, L: ?Sized, S> {
    config: &'a TrainConfig,
    model: M,
    optimizer: Box<dyn Optimizer>,
    store: S,
    loss: TripletLoss,
    controller: AdaptiveController,
    train_gen: AdaptiveTripletGenerator<'a, L>,
    eval_gen: RandomTripletGenerator<'a, L>,
    test_gen: Option<RandomTripletGenerator<'a, L>>,
    state: TrainingState,
    history: History,
    date: String,
}

impl<'a, M, L, S> Trainer<'a, M, L, S>
where
    M: TrainableModel + Serialize,
    L: ImageLoader + ?Sized,
    S: CheckpointStore<M>,
{
    pub fn new(config: &'a TrainConfig, split: &'a DatasetSplit, model: M, loader: &'a L, store: S) -> Result<Self> {
        config.validate()?;
        if model.input_size() != loader.shape().len() {
            return Err(FaceNetError::InvalidConfig(format!(
                "model expects {} inputs but images preprocess to {}",
                model.input_size(),
                loader.shape().len()
            )));
        }

        let mut seeds = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let selector = HardPairSelector::new(config.negative_policy, config.alpha);
        let gen_config = GeneratorConfig {
            batch_size: config.batch_size,
            nbof_subclasses: config.nbof_subclasses,
            batches_per_cycle: config.batches_per_cycle,
            max_pool_retries: config.max_pool_retries,
            seed: seeds.gen(),
        };
        let mut train_gen = AdaptiveTripletGenerator::new(&split.train, loader, selector, gen_config)?;
        if config.use_aug {
            train_gen = train_gen.with_augmenter(Box::new(FlipShiftJitter::new(loader.shape())));
        }
        let eval_gen = RandomTripletGenerator::new(split.evaluation(), loader, config.batch_size, seeds.gen())
            .map_err(|e| FaceNetError::InvalidConfig(format!("evaluation split unusable: {}", e)))?;
        let test_gen = if split.valid.is_empty() || split.test.is_empty() {
            None
        } else {
            Some(RandomTripletGenerator::new(&split.test, loader, config.batch_size, seeds.gen())
                .map_err(|e| FaceNetError::InvalidConfig(format!("test split unusable: {}", e)))?)
        };

        let controller = AdaptiveController::new(config.ratio_curve, config.batch_size);
        let mut state = TrainingState::new(config.start_epoch);
        state.ratio = controller.current();

        info!(
            train = split.train.len(),
            train_classes = split.train_classes().len(),
            eval = split.evaluation().len(),
            final_test = test_gen.is_some(),
            emb_size = model.emb_size(),
            "trainer initialized"
        );

        Ok(Trainer {
            config,
            model,
            optimizer: config.optimizer.build(config.learning_rate),
            store,
            loss: TripletLoss::new(config.alpha),
            controller,
            train_gen,
            eval_gen,
            test_gen,
            state,
            history: History::default(),
            date: config.date_prefix(),
        })
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    fn enter(&mut self, phase: Phase) {
        if self.state.phase != phase {
            debug!(epoch = self.state.epoch, from = ?self.state.phase, to = ?phase, "phase change");
            self.state.phase = phase;
        }
    }

    /// Runs epochs `start_epoch..max_epoch`.
    pub fn run(&mut self) -> Result<TrainingSummary> {
        let mut epochs_run = 0;
        let mut stopped_early = false;

        for epoch in self.config.start_epoch..self.config.max_epoch {
            let t_start = Instant::now();
            self.controller.reset();
            self.state.begin_epoch(epoch, self.controller.current());

            self.train_epoch()?;
            self.evaluate_epoch()?;
            self.checkpoint()?;
            epochs_run += 1;

            let stats = EpochStats {
                epoch,
                max_epoch: self.config.max_epoch,
                train_loss: self.state.train.mean_loss(),
                val_loss: self.state.test.mean_loss(),
                train_accuracy: self.state.train.mean_accuracy(),
                val_accuracy: self.state.test.mean_accuracy(),
                hard_ratio: self.state.ratio.value(),
                model_version: self.model.version(),
                elapsed_ms: t_start.elapsed().as_millis() as u64,
            };
            info!(
                epoch,
                loss = stats.train_loss,
                acc = stats.train_accuracy,
                val_loss = stats.val_loss,
                val_acc = stats.val_accuracy,
                elapsed_ms = stats.elapsed_ms,
                "epoch complete"
            );
            if let Some(ref tx) = self.config.progress_tx {
                // If the receiver has been dropped, stop training.
                if tx.send(stats).is_err() {
                    stopped_early = epoch + 1 < self.config.max_epoch;
                    break;
                }
            }
        }

        let final_test = match self.test_gen.as_mut() {
            Some(gen) => {
                let mut metrics = RunningMetrics::default();
                for _ in 0..self.config.max_step_test {
                    let batch = gen.next().unwrap_or_else(stream_ended)?;
                    metrics.add(self.model.test_on_batch(&batch.inputs, &self.loss));
                }
                info!(loss = metrics.mean_loss(), acc = metrics.mean_accuracy(), "held-out test");
                Some(BatchMetrics { loss: metrics.mean_loss(), accuracy: metrics.mean_accuracy() })
            }
            None => None,
        };

        self.enter(Phase::Terminating);
        Ok(TrainingSummary { epochs_run, history: self.history.clone(), final_test, stopped_early })
    }

    fn train_epoch(&mut self) -> Result<()> {
        self.enter(Phase::TrainingStep);
        for step in 1..=self.config.max_step {
            self.state.step = step;
            let batch = self.train_gen.next_batch(&self.model, self.state.ratio)?;
            let metrics = self.model.train_on_batch(&batch.inputs, &self.loss, &mut *self.optimizer);
            self.state.train.add(metrics);

            let (mean_loss, mean_acc) = (self.state.train.mean_loss(), self.state.train.mean_accuracy());
            self.state.ratio = self.controller.observe(mean_loss, mean_acc);

            info!(
                epoch = self.state.epoch,
                step,
                max_step = self.config.max_step,
                loss = mean_loss,
                acc = mean_acc,
                hard_ratio = self.state.ratio.value(),
                test_loss = self.state.test.mean_loss(),
                test_acc = self.state.test.mean_accuracy(),
                "train step"
            );
        }
        Ok(())
    }

    fn evaluate_epoch(&mut self) -> Result<()> {
        self.enter(Phase::EpochEvaluation);
        self.state.test.reset();
        for _ in 0..self.config.max_step_test {
            let batch = self.eval_gen.next().unwrap_or_else(stream_ended)?;
            let metrics = self.model.test_on_batch(&batch.inputs, &self.loss);
            self.state.test.add(metrics);
        }
        Ok(())
    }

    fn checkpoint(&mut self) -> Result<()> {
        self.enter(Phase::Checkpointing);
        self.history.push(
            self.state.train.mean_loss(),
            self.state.test.mean_loss(),
            self.state.train.mean_accuracy(),
            self.state.test.mean_accuracy(),
        );
        let key = CheckpointKey {
            date: self.date.clone(),
            network_name: self.config.network_name.clone(),
            epoch: self.state.epoch,
        };
        self.store.save(&key, &self.model, &self.history)
    }
}

/// The random generators are infinite; `next` never returns `None`.
fn stream_ended() -> Result<crate::data::sample::Batch> {
    Err(FaceNetError::EmbeddingComputation { reason: "batch stream ended".to_string() })
}

/// Trains `model` for epochs `config.start_epoch..config.max_epoch` and
/// returns it together with the run summary.
///
/// # Arguments
/// - `config` : hyperparameters, output locations, optional progress channel
/// - `split`  : class-disjoint train / valid / test samples; training mines
///              from `split.train`, evaluation draws random triplets from
///              `split.valid` (or `split.test` when valid is empty)
/// - `model`  : initial weights, fresh or loaded from a checkpoint
/// - `loader` : decodes and preprocesses images; its shape must match the
///              model input
/// - `store`  : receives the weights and history after every epoch
///
/// # Early termination
/// The loop stops after the current epoch if the `progress_tx` receiver has
/// been dropped; `TrainingSummary::stopped_early` is then set.
///
/// # Errors
/// - `InvalidConfig` for an invalid configuration, a model/loader size
///   mismatch, or an evaluation split with fewer than two usable classes
/// - `CorpusTooSmall` or the last embedding error once a mining cycle has
///   failed `max_pool_retries` times in a row
/// - `CheckpointWrite` as soon as an epoch cannot be persisted; no further
///   epochs run
pub fn train_loop<M, L, S>(
    config: &TrainConfig,
    split: &DatasetSplit,
    model: M,
    loader: &L,
    store: S,
) -> Result<(M, TrainingSummary)>
where
    M: TrainableModel + Serialize,
    L: ImageLoader + ?Sized,
    S: CheckpointStore<M>,
{
    let mut trainer = Trainer::new(config, split, model, loader, store)?;
    let summary = trainer.run()?;
    Ok((trainer.into_model(), summary))
}
