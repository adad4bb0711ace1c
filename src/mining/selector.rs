use std::collections::BTreeMap;

use rand::Rng;
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::data::sample::{group_by_class, Sample, Triplet};
use crate::error::MiningError;
use crate::math::matrix::Matrix;

/// How the negative of a mined triplet is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativePolicy {
    /// Closest sample of any other class.
    #[default]
    Hardest,
    /// Closest negative farther than the positive but inside the margin
    /// (`ap < an < ap + alpha`); falls back to the hardest when none exists.
    SemiHard,
}

/// Positions of a triplet inside a [`CandidatePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripletIndices {
    pub anchor: usize,
    pub positive: usize,
    pub negative: usize,
}

/// Samples of the classes drawn for one generation cycle.
///
/// Classes with a single sample cannot provide a positive and are dropped
/// when the pool is built; they are kept in [`CandidatePool::skipped`].
#[derive(Debug, Clone)]
pub struct CandidatePool {
    samples: Vec<Sample>,
    /// Pool positions per class, ascending.
    groups: BTreeMap<usize, Vec<usize>>,
    classes: Vec<usize>,
    skipped: Vec<MiningError>,
}

impl CandidatePool {
    /// Fails with `InsufficientPoolDiversity` when fewer than two classes with
    /// at least two samples remain.
    pub fn new(samples: Vec<Sample>) -> Result<CandidatePool, MiningError> {
        let mut skipped = Vec::new();
        let mut kept = Vec::with_capacity(samples.len());
        for (class_id, members) in group_by_class(&samples) {
            if members.len() < 2 {
                let err = MiningError::InsufficientClassSize { class_id, size: members.len() };
                debug!(%err, "class skipped for this cycle");
                skipped.push(err);
                continue;
            }
            kept.extend(members);
        }
        kept.sort_unstable();
        let samples: Vec<Sample> = kept.into_iter().map(|i| samples[i].clone()).collect();

        let groups = group_by_class(&samples);
        if groups.len() < 2 {
            return Err(MiningError::InsufficientPoolDiversity { eligible: groups.len() });
        }
        let classes = groups.keys().copied().collect();
        Ok(CandidatePool { samples, groups, classes, skipped })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Class ids present in the pool, ascending.
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    pub fn skipped(&self) -> &[MiningError] {
        &self.skipped
    }

    /// Pool positions of the samples of `class_id`.
    pub fn members(&self, class_id: usize) -> &[usize] {
        self.groups.get(&class_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn triplet(&self, idx: TripletIndices) -> Triplet {
        Triplet {
            anchor: self.samples[idx.anchor].clone(),
            positive: self.samples[idx.positive].clone(),
            negative: self.samples[idx.negative].clone(),
        }
    }

    /// Uniform class, then uniform member of that class.
    pub fn random_anchor<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let class_id = self.classes[rng.gen_range(0..self.classes.len())];
        let members = self.members(class_id);
        members[rng.gen_range(0..members.len())]
    }

    /// Fully random triplet: uniform class for anchor and positive (distinct
    /// samples), uniform other class for the negative.
    pub fn random_triplet<R: Rng + ?Sized>(&self, rng: &mut R) -> TripletIndices {
        let c = rng.gen_range(0..self.classes.len());
        let members = self.members(self.classes[c]);
        let a = rng.gen_range(0..members.len());
        let mut p = rng.gen_range(0..members.len() - 1);
        if p >= a {
            p += 1;
        }
        let (anchor, positive) = (members[a], members[p]);
        let mut other = rng.gen_range(0..self.classes.len() - 1);
        if other >= c {
            other += 1;
        }
        let negatives = self.members(self.classes[other]);
        let negative = negatives[rng.gen_range(0..negatives.len())];
        TripletIndices { anchor, positive, negative }
    }
}

/// Deterministic hardest-positive / hardest-negative selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HardPairSelector {
    pub policy: NegativePolicy,
    pub alpha: f64,
}

impl HardPairSelector {
    pub fn new(policy: NegativePolicy, alpha: f64) -> Self {
        HardPairSelector { policy, alpha }
    }

    /// Mines one triplet for every anchor in `anchors`.
    ///
    /// `distances` holds squared distances between pool samples. The positive
    /// is the farthest same-class sample, the negative the closest sample of
    /// another class (subject to the policy). Ties go to the lowest index.
    pub fn select(
        &self,
        pool: &CandidatePool,
        distances: &Matrix,
        anchors: &[usize],
    ) -> Result<Vec<TripletIndices>, MiningError> {
        if pool.classes().len() < 2 {
            return Err(MiningError::InsufficientPoolDiversity { eligible: pool.classes().len() });
        }
        debug_assert_eq!(distances.rows, pool.len());
        Ok(anchors.iter().map(|&a| self.select_for_anchor(pool, distances, a)).collect())
    }

    /// Mines one triplet per pool sample, in pool order.
    pub fn select_all(&self, pool: &CandidatePool, distances: &Matrix) -> Result<Vec<TripletIndices>, MiningError> {
        let anchors: Vec<usize> = (0..pool.len()).collect();
        self.select(pool, distances, &anchors)
    }

    fn select_for_anchor(&self, pool: &CandidatePool, distances: &Matrix, anchor: usize) -> TripletIndices {
        let row = distances.row(anchor);
        let class_id = pool.samples()[anchor].class_id;

        let mut positive = anchor;
        let mut ap = f64::NEG_INFINITY;
        for &j in pool.members(class_id) {
            if j != anchor && row[j] > ap {
                ap = row[j];
                positive = j;
            }
        }

        let mut hardest: Option<(usize, f64)> = None;
        let mut semi_hard: Option<(usize, f64)> = None;
        for (k, sample) in pool.samples().iter().enumerate() {
            if sample.class_id == class_id {
                continue;
            }
            let an = row[k];
            if hardest.map_or(true, |(_, best)| an < best) {
                hardest = Some((k, an));
            }
            if an > ap && an < ap + self.alpha && semi_hard.map_or(true, |(_, best)| an < best) {
                semi_hard = Some((k, an));
            }
        }

        let chosen = match self.policy {
            NegativePolicy::Hardest => hardest,
            NegativePolicy::SemiHard => semi_hard.or(hardest),
        };
        // The pool holds at least two classes, so a negative always exists.
        let negative = chosen.map(|(k, _)| k).unwrap_or(anchor);
        TripletIndices { anchor, positive, negative }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mining::distance::pairwise_sqdist;
    use rand::{rngs::StdRng, SeedableRng};

    fn samples(sizes: &[usize]) -> Vec<Sample> {
        sizes.iter().enumerate()
            .flat_map(|(c, &n)| (0..n).map(move |i| Sample::new(format!("{}-{}", c, i), c)))
            .collect()
    }

    /// Two classes on a line: class 0 at 0.0, 0.1, 0.5 and class 1 at 0.6, 1.0.
    fn line_pool() -> (CandidatePool, Matrix) {
        let pool = CandidatePool::new(samples(&[3, 2])).unwrap();
        let e = Matrix::from_data(vec![vec![0.0], vec![0.1], vec![0.5], vec![0.6], vec![1.0]]);
        (pool, pairwise_sqdist(&e))
    }

    #[test]
    fn singleton_class_is_excluded_from_pool() {
        let pool = CandidatePool::new(samples(&[3, 3, 1])).unwrap();
        assert_eq!(pool.len(), 6);
        assert_eq!(pool.classes(), &[0, 1]);
        assert_eq!(pool.skipped(), &[MiningError::InsufficientClassSize { class_id: 2, size: 1 }]);

        let e = Matrix::from_data((0..6).map(|i| vec![i as f64]).collect());
        let mined = HardPairSelector::new(NegativePolicy::Hardest, 0.3)
            .select_all(&pool, &pairwise_sqdist(&e))
            .unwrap();
        assert_eq!(mined.len(), 6);
        assert!(mined.iter().all(|t| pool.triplet(*t).is_valid()));
    }

    #[test]
    fn too_few_eligible_classes_is_a_diversity_error() {
        let err = CandidatePool::new(samples(&[4, 1])).unwrap_err();
        assert_eq!(err, MiningError::InsufficientPoolDiversity { eligible: 1 });
    }

    #[test]
    fn picks_farthest_positive_and_closest_negative() {
        let (pool, d) = line_pool();
        let mined = HardPairSelector::new(NegativePolicy::Hardest, 0.3).select(&pool, &d, &[0, 2]).unwrap();
        assert_eq!(mined[0], TripletIndices { anchor: 0, positive: 2, negative: 3 });
        assert_eq!(mined[1], TripletIndices { anchor: 2, positive: 0, negative: 3 });
    }

    #[test]
    fn semi_hard_prefers_negatives_inside_the_margin() {
        let pool = CandidatePool::new(samples(&[2, 2])).unwrap();
        // Anchor 0 at 0.0, positive at 0.3 (ap = 0.09); negatives at 0.2 and 0.4.
        let e = Matrix::from_data(vec![vec![0.0], vec![0.3], vec![0.2], vec![0.4]]);
        let d = pairwise_sqdist(&e);
        let hardest = HardPairSelector::new(NegativePolicy::Hardest, 0.3).select(&pool, &d, &[0]).unwrap();
        let semi = HardPairSelector::new(NegativePolicy::SemiHard, 0.3).select(&pool, &d, &[0]).unwrap();
        assert_eq!(hardest[0].negative, 2);
        assert_eq!(semi[0].negative, 3);
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        let pool = CandidatePool::new(samples(&[3, 2])).unwrap();
        // Both positives and both negatives equidistant from the anchor.
        let e = Matrix::from_data(vec![vec![0.0], vec![1.0], vec![-1.0], vec![2.0], vec![-2.0]]);
        let mined = HardPairSelector::new(NegativePolicy::Hardest, 0.3)
            .select(&pool, &pairwise_sqdist(&e), &[0])
            .unwrap();
        assert_eq!(mined[0], TripletIndices { anchor: 0, positive: 1, negative: 3 });
    }

    #[test]
    fn selection_is_deterministic() {
        let (pool, d) = line_pool();
        let selector = HardPairSelector::new(NegativePolicy::SemiHard, 0.3);
        let first = selector.select_all(&pool, &d).unwrap();
        for _ in 0..5 {
            assert_eq!(selector.select_all(&pool, &d).unwrap(), first);
        }
    }

    #[test]
    fn random_triplets_are_valid() {
        let pool = CandidatePool::new(samples(&[2, 3, 4])).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let t = pool.random_triplet(&mut rng);
            assert_ne!(t.anchor, t.positive);
            assert!(pool.triplet(t).is_valid());
        }
    }
}
