use std::collections::{BTreeMap, VecDeque};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::data::augment::Augmenter;
use crate::data::image::ImageLoader;
use crate::data::sample::{Batch, Sample};
use crate::error::{FaceNetError, MiningError, Result};
use crate::mining::controller::HardnessRatio;
use crate::mining::distance::pairwise_sqdist;
use crate::mining::oracle::EmbeddingOracle;
use crate::mining::selector::{CandidatePool, HardPairSelector, TripletIndices};
use crate::network::model::EmbeddingModel;

/// Samples of a split grouped by class, in ascending class order.
fn classes_of(samples: &[Sample]) -> BTreeMap<usize, Vec<Sample>> {
    let mut classes: BTreeMap<usize, Vec<Sample>> = BTreeMap::new();
    for sample in samples {
        classes.entry(sample.class_id).or_default().push(sample.clone());
    }
    classes
}

fn check_batch_size(batch_size: usize) -> Result<usize> {
    if batch_size == 0 || batch_size % 3 != 0 {
        return Err(FaceNetError::InvalidConfig(format!(
            "batch_size must be a positive multiple of 3, got {}",
            batch_size
        )));
    }
    Ok(batch_size / 3)
}

/// Infinite stream of fully random triplet batches. Never queries a model;
/// used for validation and test evaluation.
pub struct RandomTripletGenerator<'a, L: ?Sized> {
    pool: CandidatePool,
    loader: &'a L,
    triplets_per_batch: usize,
    rng: StdRng,
}

impl<'a, L: ImageLoader + ?Sized> RandomTripletGenerator<'a, L> {
    pub fn new(samples: &[Sample], loader: &'a L, batch_size: usize, seed: u64) -> Result<Self> {
        let triplets_per_batch = check_batch_size(batch_size)?;
        let pool = CandidatePool::new(samples.to_vec())?;
        Ok(RandomTripletGenerator {
            pool,
            loader,
            triplets_per_batch,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    fn next_batch(&mut self) -> Result<Batch> {
        let mut batch = Batch::default();
        for _ in 0..self.triplets_per_batch {
            let idx = self.pool.random_triplet(&mut self.rng);
            for i in [idx.anchor, idx.positive, idx.negative] {
                let sample = &self.pool.samples()[i];
                batch.inputs.push(self.loader.load(sample)?);
                batch.samples.push(sample.clone());
            }
        }
        Ok(batch)
    }
}

impl<'a, L: ImageLoader + ?Sized> Iterator for RandomTripletGenerator<'a, L> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

/// Knobs of the adaptive generator.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorConfig {
    pub batch_size: usize,
    /// Classes drawn into each cycle's pool.
    pub nbof_subclasses: usize,
    /// Batches emitted from one pool before a new one is drawn.
    pub batches_per_cycle: usize,
    /// Consecutive failed cycles tolerated before giving up.
    pub max_pool_retries: usize,
    pub seed: u64,
}

/// What the most recent generation cycle produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleInfo {
    pub cycle: u64,
    /// Model version whose embeddings were mined.
    pub model_version: u64,
    pub ratio: HardnessRatio,
    pub pool_size: usize,
    pub hard: usize,
    pub random: usize,
    /// Failed attempts redrawn before this cycle succeeded.
    pub redraws: usize,
}

/// Infinite stream of training batches mined against the current model.
///
/// A cycle draws `nbof_subclasses` classes, embeds their samples, mines
/// `floor(ratio · capacity)` triplets with the [`HardPairSelector`], fills
/// the rest with random triplets, shuffles them and queues
/// `batches_per_cycle` batches. The model is borrowed only inside
/// [`AdaptiveTripletGenerator::next_batch`], so every cycle sees the weights
/// as they are at that moment.
pub struct AdaptiveTripletGenerator<'a, L: ?Sized> {
    classes: BTreeMap<usize, Vec<Sample>>,
    class_ids: Vec<usize>,
    loader: &'a L,
    augmenter: Option<Box<dyn Augmenter + 'a>>,
    selector: HardPairSelector,
    config: GeneratorConfig,
    triplets_per_batch: usize,
    rng: StdRng,
    queue: VecDeque<Batch>,
    cycles: u64,
    last_cycle: Option<CycleInfo>,
}

impl<'a, L: ImageLoader + ?Sized> AdaptiveTripletGenerator<'a, L> {
    pub fn new(
        samples: &[Sample],
        loader: &'a L,
        selector: HardPairSelector,
        config: GeneratorConfig,
    ) -> Result<Self> {
        let triplets_per_batch = check_batch_size(config.batch_size)?;
        if config.nbof_subclasses < 2 {
            return Err(FaceNetError::InvalidConfig("nbof_subclasses must be at least 2".to_string()));
        }
        let classes = classes_of(samples);
        if classes.len() < 2 {
            return Err(MiningError::InsufficientPoolDiversity { eligible: classes.len() }.into());
        }
        let class_ids = classes.keys().copied().collect();
        Ok(AdaptiveTripletGenerator {
            classes,
            class_ids,
            loader,
            augmenter: None,
            selector,
            config,
            triplets_per_batch,
            rng: StdRng::seed_from_u64(config.seed),
            queue: VecDeque::new(),
            cycles: 0,
            last_cycle: None,
        })
    }

    /// Applies `augmenter` to every image of every emitted batch.
    pub fn with_augmenter(mut self, augmenter: Box<dyn Augmenter + 'a>) -> Self {
        self.augmenter = Some(augmenter);
        self
    }

    pub fn last_cycle(&self) -> Option<CycleInfo> {
        self.last_cycle
    }

    /// Next batch, starting a new cycle with `ratio` when the current one is
    /// used up.
    pub fn next_batch<M: EmbeddingModel + ?Sized>(&mut self, model: &M, ratio: HardnessRatio) -> Result<Batch> {
        if self.queue.is_empty() {
            self.refill(model, ratio)?;
        }
        self.queue.pop_front().ok_or_else(|| {
            FaceNetError::EmbeddingComputation { reason: "generation cycle produced no batch".to_string() }
        })
    }

    /// Runs cycles until one succeeds, redrawing the pool after a mining or
    /// embedding failure.
    fn refill<M: EmbeddingModel + ?Sized>(&mut self, model: &M, ratio: HardnessRatio) -> Result<()> {
        let mut last_mining = None;
        let mut last_embedding = None;
        for attempt in 1..=self.config.max_pool_retries.max(1) {
            match self.run_cycle(model, ratio) {
                Ok(batches) => {
                    self.queue.extend(batches);
                    if let Some(info) = self.last_cycle.as_mut() {
                        info.redraws = attempt - 1;
                    }
                    return Ok(());
                }
                Err(FaceNetError::Mining(err)) => {
                    debug!(attempt, %err, "pool rejected, redrawing");
                    last_mining = Some(err);
                }
                Err(err @ (FaceNetError::EmbeddingComputation { .. } | FaceNetError::ImageLoad { .. })) => {
                    warn!(attempt, error = %err, "embedding failed, redrawing pool");
                    last_embedding = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        match (last_embedding, last_mining) {
            (Some(err), None) => Err(err),
            (_, Some(last)) => Err(FaceNetError::CorpusTooSmall {
                attempts: self.config.max_pool_retries.max(1),
                last,
            }),
            (None, None) => Ok(()),
        }
    }

    fn draw_pool(&mut self) -> Vec<Sample> {
        let count = self.config.nbof_subclasses.min(self.class_ids.len());
        let mut drawn: Vec<usize> = self.class_ids.choose_multiple(&mut self.rng, count).copied().collect();
        drawn.sort_unstable();
        drawn.iter().flat_map(|c| self.classes[c].iter().cloned()).collect()
    }

    fn run_cycle<M: EmbeddingModel + ?Sized>(&mut self, model: &M, ratio: HardnessRatio) -> Result<Vec<Batch>> {
        let pool = CandidatePool::new(self.draw_pool())?;
        let (images, embeddings) = EmbeddingOracle::new(model).embed_samples(self.loader, pool.samples())?;
        let distances = pairwise_sqdist(&embeddings.vectors);

        let capacity = self.config.batches_per_cycle.max(1) * self.triplets_per_batch;
        let hard = ratio.hard_count(capacity);
        let anchors: Vec<usize> = (0..hard).map(|_| pool.random_anchor(&mut self.rng)).collect();

        let mut triplets = self.selector.select(&pool, &distances, &anchors)?;
        triplets.extend((hard..capacity).map(|_| pool.random_triplet(&mut self.rng)));
        triplets.shuffle(&mut self.rng);

        self.cycles += 1;
        let info = CycleInfo {
            cycle: self.cycles,
            model_version: embeddings.version,
            ratio,
            pool_size: pool.len(),
            hard,
            random: capacity - hard,
            redraws: 0,
        };
        debug!(
            cycle = info.cycle,
            model_version = info.model_version,
            pool_size = info.pool_size,
            hard = info.hard,
            random = info.random,
            "generation cycle"
        );
        self.last_cycle = Some(info);

        Ok(triplets
            .chunks(self.triplets_per_batch)
            .map(|chunk| self.assemble(&pool, &images, chunk))
            .collect())
    }

    fn assemble(&mut self, pool: &CandidatePool, images: &[Vec<f64>], triplets: &[TripletIndices]) -> Batch {
        let mut batch = Batch::default();
        for t in triplets {
            for i in [t.anchor, t.positive, t.negative] {
                let mut image = images[i].clone();
                if let Some(augmenter) = &self.augmenter {
                    augmenter.augment(&mut image, &mut self.rng);
                }
                batch.inputs.push(image);
                batch.samples.push(pool.samples()[i].clone());
            }
        }
        batch
    }
}
