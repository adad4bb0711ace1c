use serde::{Serialize, Deserialize};

use crate::mining::distance::sqdist;

/// Default triplet margin.
pub const DEFAULT_ALPHA: f64 = 0.3;

/// Loss and accuracy reported by one training or evaluation step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchMetrics {
    pub loss: f64,
    pub accuracy: f64,
}

/// Triplet margin loss over embeddings laid out as `[a0, p0, n0, a1, p1, n1, ...]`.
///
/// With `ap = ‖a − p‖²` and `an = ‖a − n‖²`, each triplet contributes
/// `max(0, ap − an + alpha)`; the batch loss is the sum over triplets.
/// A triplet counts as correct when `ap + alpha < an`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TripletLoss {
    pub alpha: f64,
}

impl Default for TripletLoss {
    fn default() -> Self {
        TripletLoss { alpha: DEFAULT_ALPHA }
    }
}

impl TripletLoss {
    pub fn new(alpha: f64) -> Self {
        TripletLoss { alpha: alpha.max(0.0) }
    }

    /// Loss contribution of a single triplet given its squared distances.
    pub fn violation(&self, ap: f64, an: f64) -> f64 {
        (ap - an + self.alpha).max(0.0)
    }

    /// Whether a triplet with these squared distances satisfies the margin.
    pub fn satisfied(&self, ap: f64, an: f64) -> bool {
        ap + self.alpha < an
    }

    fn distances(embeddings: &[Vec<f64>]) -> impl Iterator<Item = (f64, f64)> + '_ {
        debug_assert!(embeddings.len() % 3 == 0, "triplet batch length must be a multiple of 3");
        embeddings.chunks_exact(3).map(|t| (sqdist(&t[0], &t[1]), sqdist(&t[0], &t[2])))
    }

    /// Summed triplet loss over the batch.
    pub fn loss(&self, embeddings: &[Vec<f64>]) -> f64 {
        Self::distances(embeddings).map(|(ap, an)| self.violation(ap, an)).sum()
    }

    /// Per-triplet accuracy predicate `ap + alpha < an`.
    pub fn per_triplet(&self, embeddings: &[Vec<f64>]) -> Vec<bool> {
        Self::distances(embeddings).map(|(ap, an)| self.satisfied(ap, an)).collect()
    }

    /// Fraction of triplets satisfying the margin. Zero for an empty batch.
    pub fn accuracy(&self, embeddings: &[Vec<f64>]) -> f64 {
        let hits = self.per_triplet(embeddings);
        if hits.is_empty() {
            return 0.0;
        }
        hits.iter().filter(|&&ok| ok).count() as f64 / hits.len() as f64
    }

    pub fn metrics(&self, embeddings: &[Vec<f64>]) -> BatchMetrics {
        BatchMetrics {
            loss: self.loss(embeddings),
            accuracy: self.accuracy(embeddings),
        }
    }

    /// Gradient of [`TripletLoss::loss`] with respect to every embedding row.
    ///
    /// For an active triplet: ∂L/∂a = 2(n − p), ∂L/∂p = −2(a − p), ∂L/∂n = 2(a − n).
    /// Inactive triplets contribute zero.
    pub fn gradient(&self, embeddings: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let mut grads: Vec<Vec<f64>> = embeddings.iter().map(|e| vec![0.0; e.len()]).collect();
        for (t, triplet) in embeddings.chunks_exact(3).enumerate() {
            let (a, p, n) = (&triplet[0], &triplet[1], &triplet[2]);
            if self.violation(sqdist(a, p), sqdist(a, n)) <= 0.0 {
                continue;
            }
            let base = 3 * t;
            for k in 0..a.len() {
                grads[base][k] = 2.0 * (n[k] - p[k]);
                grads[base + 1][k] = -2.0 * (a[k] - p[k]);
                grads[base + 2][k] = 2.0 * (a[k] - n[k]);
            }
        }
        grads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a 1-D triplet whose squared distances are `ap` and `an`.
    fn triplet(ap: f64, an: f64) -> Vec<Vec<f64>> {
        vec![vec![0.0], vec![ap.sqrt()], vec![-an.sqrt()]]
    }

    #[test]
    fn satisfied_triplet_contributes_nothing() {
        let loss = TripletLoss::new(0.3);
        let batch = triplet(0.1, 0.9);
        assert!(loss.loss(&batch).abs() < 1e-12);
        assert_eq!(loss.per_triplet(&batch), vec![true]);
    }

    #[test]
    fn violating_triplet_pays_margin_plus_gap() {
        let loss = TripletLoss::new(0.3);
        let batch = triplet(0.9, 0.1);
        assert!((loss.loss(&batch) - 1.1).abs() < 1e-9);
        assert_eq!(loss.accuracy(&batch), 0.0);
    }

    #[test]
    fn loss_sums_and_accuracy_averages_over_triplets() {
        let loss = TripletLoss::default();
        let mut batch = triplet(0.1, 0.9);
        batch.extend(triplet(0.9, 0.1));
        assert!((loss.loss(&batch) - 1.1).abs() < 1e-9);
        assert!((loss.accuracy(&batch) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let loss = TripletLoss::new(0.3);
        let batch = vec![vec![0.3, 0.1], vec![0.9, -0.2], vec![0.4, 0.0]];
        let grads = loss.gradient(&batch);
        let h = 1e-6;
        for row in 0..3 {
            for k in 0..2 {
                let mut up = batch.clone();
                up[row][k] += h;
                let mut down = batch.clone();
                down[row][k] -= h;
                let numeric = (loss.loss(&up) - loss.loss(&down)) / (2.0 * h);
                assert!((numeric - grads[row][k]).abs() < 1e-5, "row {} dim {}", row, k);
            }
        }
    }
}
