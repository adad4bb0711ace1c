use std::collections::BTreeSet;

use tracing::info;

use crate::data::sample::Sample;
use crate::error::{FaceNetError, Result};

/// Train / validation / test partition by class.
///
/// A class appears in exactly one split. With `C` distinct classes in
/// ascending id order, the first `floor(test_split · C)` go to test, the next
/// `floor(valid_split · C)` to validation and the rest to train.
#[derive(Debug, Clone, Default)]
pub struct DatasetSplit {
    pub train: Vec<Sample>,
    pub valid: Vec<Sample>,
    pub test: Vec<Sample>,
}

fn class_ids(samples: &[Sample]) -> BTreeSet<usize> {
    samples.iter().map(|s| s.class_id).collect()
}

impl DatasetSplit {
    pub fn by_classes(samples: Vec<Sample>, test_split: f64, valid_split: f64) -> Result<DatasetSplit> {
        for (name, value) in [("test_split", test_split), ("valid_split", valid_split)] {
            if !(0.0..1.0).contains(&value) {
                return Err(FaceNetError::InvalidConfig(format!("{} must be in [0, 1), got {}", name, value)));
            }
        }
        if test_split + valid_split >= 1.0 {
            return Err(FaceNetError::InvalidConfig(format!(
                "test_split + valid_split must be below 1, got {}",
                test_split + valid_split
            )));
        }

        let classes: Vec<usize> = class_ids(&samples).into_iter().collect();
        let nbof_test = (test_split * classes.len() as f64) as usize;
        let nbof_valid = (valid_split * classes.len() as f64) as usize;
        let test_classes: BTreeSet<usize> = classes[..nbof_test].iter().copied().collect();
        let valid_classes: BTreeSet<usize> = classes[nbof_test..nbof_test + nbof_valid].iter().copied().collect();

        let mut split = DatasetSplit::default();
        for sample in samples {
            if test_classes.contains(&sample.class_id) {
                split.test.push(sample);
            } else if valid_classes.contains(&sample.class_id) {
                split.valid.push(sample);
            } else {
                split.train.push(sample);
            }
        }

        info!(
            train_samples = split.train.len(),
            train_classes = classes.len() - nbof_test - nbof_valid,
            valid_samples = split.valid.len(),
            valid_classes = nbof_valid,
            test_samples = split.test.len(),
            test_classes = nbof_test,
            "dataset split"
        );
        Ok(split)
    }

    pub fn train_classes(&self) -> BTreeSet<usize> {
        class_ids(&self.train)
    }

    pub fn valid_classes(&self) -> BTreeSet<usize> {
        class_ids(&self.valid)
    }

    pub fn test_classes(&self) -> BTreeSet<usize> {
        class_ids(&self.test)
    }

    /// Samples used for per-epoch evaluation: validation, or test when no
    /// validation classes were set aside.
    pub fn evaluation(&self) -> &[Sample] {
        if self.valid.is_empty() { &self.test } else { &self.valid }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(classes: usize, per_class: usize) -> Vec<Sample> {
        (0..classes)
            .flat_map(|c| (0..per_class).map(move |i| Sample::new(format!("{}/{}.jpg", c, i), c)))
            .collect()
    }

    #[test]
    fn splits_are_disjoint_and_sized_by_class_count() {
        let split = DatasetSplit::by_classes(corpus(25, 3), 0.1, 0.2).unwrap();
        let (train, valid, test) = (split.train_classes(), split.valid_classes(), split.test_classes());
        assert!(train.is_disjoint(&test) && train.is_disjoint(&valid) && valid.is_disjoint(&test));
        assert_eq!(test.len(), 2);
        assert_eq!(valid.len(), 5);
        assert_eq!(train.len(), 18);
        assert_eq!(test.iter().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(split.train.len() + split.valid.len() + split.test.len(), 75);
    }

    #[test]
    fn evaluation_falls_back_to_test() {
        let split = DatasetSplit::by_classes(corpus(10, 2), 0.2, 0.0).unwrap();
        assert!(split.valid.is_empty());
        assert_eq!(split.evaluation().len(), 4);
    }

    #[test]
    fn rejects_out_of_range_fractions() {
        assert!(DatasetSplit::by_classes(corpus(4, 2), 0.6, 0.5).is_err());
        assert!(DatasetSplit::by_classes(corpus(4, 2), -0.1, 0.0).is_err());
    }
}
