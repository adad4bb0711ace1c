use serde::{Serialize, Deserialize};

/// Height of the logistic curve before the shift is subtracted.
pub const RATIO_SCALE: f64 = 1.2;
/// Slope of the logistic curve in accuracy units.
pub const RATIO_STEEPNESS: f64 = 10.0;
/// Horizontal offset: the curve's midpoint sits at accuracy 0.53.
pub const RATIO_OFFSET: f64 = 5.3;
/// Downward shift that keeps the ratio at zero for an untrained model.
pub const RATIO_SHIFT: f64 = 0.19;
/// Loss scale of [`RatioCurve::LossDecay`].
pub const LOSS_DECAY_RATE: f64 = 10.0;

/// Fraction of a cycle's triplets that are mined rather than random. Always
/// within [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct HardnessRatio(f64);

impl HardnessRatio {
    pub const ZERO: HardnessRatio = HardnessRatio(0.0);

    /// Clamps into [0, 1]; NaN becomes 0.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return HardnessRatio::ZERO;
        }
        HardnessRatio(value.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Number of mined triplets out of `capacity`: `floor(ratio · capacity)`.
    pub fn hard_count(self, capacity: usize) -> usize {
        ((self.0 * capacity as f64).floor() as usize).min(capacity)
    }
}

/// Mapping from running training metrics to the next hardness ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioCurve {
    /// `1.2 / (1 + exp(-10·acc + 5.3)) - 0.19`, driven by running accuracy.
    #[default]
    Logistic,
    /// `exp(-loss · 10 / batch_size)`, driven by running loss.
    LossDecay,
}

/// Saturating logistic curve of running accuracy.
pub fn logistic_ratio(running_accuracy: f64) -> HardnessRatio {
    let raw = RATIO_SCALE / (1.0 + (-RATIO_STEEPNESS * running_accuracy + RATIO_OFFSET).exp()) - RATIO_SHIFT;
    HardnessRatio::new(raw)
}

/// Closed-loop controller deriving the hardness ratio from training metrics.
///
/// Re-evaluated after every training step with the epoch's running means.
#[derive(Debug, Clone)]
pub struct AdaptiveController {
    pub curve: RatioCurve,
    pub batch_size: usize,
    current: HardnessRatio,
}

impl AdaptiveController {
    pub fn new(curve: RatioCurve, batch_size: usize) -> Self {
        let mut controller = AdaptiveController { curve, batch_size, current: HardnessRatio::ZERO };
        controller.reset();
        controller
    }

    /// Logistic ratio for a running accuracy.
    pub fn next_ratio(&self, running_accuracy: f64) -> HardnessRatio {
        logistic_ratio(running_accuracy)
    }

    /// Feeds the running means after a step and returns the new ratio.
    pub fn observe(&mut self, mean_loss: f64, mean_accuracy: f64) -> HardnessRatio {
        self.current = match self.curve {
            RatioCurve::Logistic => self.next_ratio(mean_accuracy),
            RatioCurve::LossDecay => {
                HardnessRatio::new((-mean_loss * LOSS_DECAY_RATE / self.batch_size.max(1) as f64).exp())
            }
        };
        self.current
    }

    pub fn current(&self) -> HardnessRatio {
        self.current
    }

    /// Starts a new epoch. The logistic curve starts from zero accuracy;
    /// loss decay starts fully random as no loss has been observed yet.
    pub fn reset(&mut self) {
        self.current = match self.curve {
            RatioCurve::Logistic => self.next_ratio(0.0),
            RatioCurve::LossDecay => HardnessRatio::ZERO,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn midpoint_accuracy_gives_about_four_tenths() {
        let ratio = logistic_ratio(0.53).value();
        assert!((ratio - 0.415).abs() <= 0.01, "got {}", ratio);
    }

    #[test]
    fn extremes_are_clamped() {
        assert_eq!(logistic_ratio(0.0), HardnessRatio::ZERO);
        let top = logistic_ratio(1.0).value();
        assert!(top <= 1.0 && top > 0.95);
    }

    #[test]
    fn nan_maps_to_zero() {
        assert_eq!(HardnessRatio::new(f64::NAN), HardnessRatio::ZERO);
        let mut c = AdaptiveController::new(RatioCurve::LossDecay, 30);
        assert_eq!(c.observe(f64::NAN, 0.5), HardnessRatio::ZERO);
    }

    #[test]
    fn loss_decay_falls_as_loss_grows() {
        let mut c = AdaptiveController::new(RatioCurve::LossDecay, 30);
        let low = c.observe(0.5, 0.0);
        let high = c.observe(5.0, 0.0);
        assert!(low > high);
        assert!((c.observe(0.0, 0.0).value() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn hard_count_floors() {
        assert_eq!(HardnessRatio::new(0.41).hard_count(10), 4);
        assert_eq!(HardnessRatio::new(1.0).hard_count(10), 10);
        assert_eq!(HardnessRatio::ZERO.hard_count(10), 0);
    }

    proptest! {
        #[test]
        fn logistic_is_non_decreasing(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(logistic_ratio(lo) <= logistic_ratio(hi));
        }
    }
}
