use serde::{Serialize, Deserialize};

use crate::loss::triplet::BatchMetrics;
use crate::mining::controller::HardnessRatio;

/// Running sums over one epoch's steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningMetrics {
    pub total_loss: f64,
    pub total_accuracy: f64,
    pub steps: usize,
}

impl RunningMetrics {
    pub fn add(&mut self, metrics: BatchMetrics) {
        self.total_loss += metrics.loss;
        self.total_accuracy += metrics.accuracy;
        self.steps += 1;
    }

    pub fn reset(&mut self) {
        *self = RunningMetrics::default();
    }

    /// `total_loss / steps`, zero before the first step.
    pub fn mean_loss(&self) -> f64 {
        if self.steps == 0 { 0.0 } else { self.total_loss / self.steps as f64 }
    }

    pub fn mean_accuracy(&self) -> f64 {
        if self.steps == 0 { 0.0 } else { self.total_accuracy / self.steps as f64 }
    }
}

/// Where the coordinator is in its epoch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Initializing,
    TrainingStep,
    EpochEvaluation,
    Checkpointing,
    Terminating,
}

/// Mutable bookkeeping of a training run.
#[derive(Debug, Clone)]
pub struct TrainingState {
    pub phase: Phase,
    pub epoch: usize,
    pub step: usize,
    pub train: RunningMetrics,
    pub test: RunningMetrics,
    pub ratio: HardnessRatio,
}

impl TrainingState {
    pub fn new(start_epoch: usize) -> Self {
        TrainingState {
            phase: Phase::Initializing,
            epoch: start_epoch,
            step: 0,
            train: RunningMetrics::default(),
            test: RunningMetrics::default(),
            ratio: HardnessRatio::ZERO,
        }
    }

    /// Resets training sums for a new epoch. Test sums keep the previous
    /// epoch's values until evaluation starts so they can be reported.
    pub fn begin_epoch(&mut self, epoch: usize, ratio: HardnessRatio) {
        self.epoch = epoch;
        self.step = 0;
        self.train.reset();
        self.ratio = ratio;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn means_divide_totals_by_steps() {
        let mut m = RunningMetrics::default();
        assert_eq!(m.mean_loss(), 0.0);
        m.add(BatchMetrics { loss: 2.0, accuracy: 0.5 });
        m.add(BatchMetrics { loss: 4.0, accuracy: 1.0 });
        assert_eq!(m.mean_loss(), 3.0);
        assert_eq!(m.mean_accuracy(), 0.75);
        m.reset();
        assert_eq!(m.steps, 0);
    }
}
