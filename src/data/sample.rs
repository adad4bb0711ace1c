use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Serialize, Deserialize};

/// One image of one individual.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    pub path: PathBuf,
    pub class_id: usize,
}

impl Sample {
    pub fn new(path: impl Into<PathBuf>, class_id: usize) -> Self {
        Sample { path: path.into(), class_id }
    }
}

/// Anchor, positive and negative samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triplet {
    pub anchor: Sample,
    pub positive: Sample,
    pub negative: Sample,
}

impl Triplet {
    /// Anchor and positive share a class that the negative does not.
    pub fn is_valid(&self) -> bool {
        self.anchor.class_id == self.positive.class_id
            && self.anchor.class_id != self.negative.class_id
    }
}

/// Training or evaluation batch laid out as `[a0, p0, n0, a1, p1, n1, ...]`.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub samples: Vec<Sample>,
    /// Preprocessed image for every entry of `samples`.
    pub inputs: Vec<Vec<f64>>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.class_id).collect()
    }

    pub fn triplets(&self) -> impl Iterator<Item = Triplet> + '_ {
        self.samples.chunks_exact(3).map(|t| Triplet {
            anchor: t[0].clone(),
            positive: t[1].clone(),
            negative: t[2].clone(),
        })
    }

    /// Length is a multiple of 3 and every 3-slice is a valid triplet.
    pub fn is_well_formed(&self) -> bool {
        self.samples.len() % 3 == 0
            && self.inputs.len() == self.samples.len()
            && self.triplets().all(|t| t.is_valid())
    }
}

/// Positions of the samples of each class, keyed by `class_id`.
pub fn group_by_class(samples: &[Sample]) -> BTreeMap<usize, Vec<usize>> {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, sample) in samples.iter().enumerate() {
        groups.entry(sample.class_id).or_default().push(i);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triplet_validity_follows_class_rule() {
        let t = Triplet {
            anchor: Sample::new("a", 1),
            positive: Sample::new("b", 1),
            negative: Sample::new("c", 2),
        };
        assert!(t.is_valid());
        let bad = Triplet { negative: Sample::new("d", 1), ..t };
        assert!(!bad.is_valid());
    }

    #[test]
    fn grouping_keeps_sample_order() {
        let samples = vec![Sample::new("x", 2), Sample::new("y", 0), Sample::new("z", 2)];
        let groups = group_by_class(&samples);
        assert_eq!(groups[&2], vec![0, 2]);
        assert_eq!(groups[&0], vec![1]);
    }
}
