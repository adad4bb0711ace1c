use rand::{Rng, RngCore};

use crate::network::metadata::ImageShape;

/// Random, label-preserving perturbation of a preprocessed image.
pub trait Augmenter {
    fn augment(&self, image: &mut [f64], rng: &mut dyn RngCore);
}

/// Horizontal flip, small translation and brightness jitter.
#[derive(Debug, Clone)]
pub struct FlipShiftJitter {
    pub shape: ImageShape,
    pub flip_prob: f64,
    /// Maximum translation in pixels along each axis.
    pub max_shift: i64,
    /// Maximum absolute brightness offset.
    pub brightness: f64,
}

impl FlipShiftJitter {
    pub fn new(shape: ImageShape) -> Self {
        FlipShiftJitter {
            shape,
            flip_prob: 0.5,
            max_shift: (shape.width.min(shape.height) / 10) as i64,
            brightness: 0.1,
        }
    }
}

impl Augmenter for FlipShiftJitter {
    fn augment(&self, image: &mut [f64], rng: &mut dyn RngCore) {
        let (w, h, c) = (self.shape.width as i64, self.shape.height as i64, self.shape.channels as i64);
        debug_assert_eq!(image.len() as i64, w * h * c);

        let flip = rng.gen_bool(self.flip_prob.clamp(0.0, 1.0));
        let (dx, dy) = if self.max_shift > 0 {
            (rng.gen_range(-self.max_shift..=self.max_shift), rng.gen_range(-self.max_shift..=self.max_shift))
        } else {
            (0, 0)
        };
        let offset = if self.brightness > 0.0 { rng.gen_range(-self.brightness..=self.brightness) } else { 0.0 };

        let source = image.to_vec();
        for y in 0..h {
            for x in 0..w {
                // Edge pixels are replicated when shifting.
                let sx = (if flip { w - 1 - x } else { x } - dx).clamp(0, w - 1);
                let sy = (y - dy).clamp(0, h - 1);
                for ch in 0..c {
                    let dst = ((y * w + x) * c + ch) as usize;
                    let src = ((sy * w + sx) * c + ch) as usize;
                    image[dst] = (source[src] + offset).clamp(0.0, 1.0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn forced_flip_mirrors_rows() {
        let shape = ImageShape { width: 3, height: 1, channels: 1 };
        let aug = FlipShiftJitter { shape, flip_prob: 1.0, max_shift: 0, brightness: 0.0 };
        let mut image = vec![0.1, 0.2, 0.3];
        aug.augment(&mut image, &mut StdRng::seed_from_u64(0));
        assert_eq!(image, vec![0.3, 0.2, 0.1]);
    }

    #[test]
    fn output_stays_in_unit_range() {
        let shape = ImageShape { width: 4, height: 4, channels: 3 };
        let aug = FlipShiftJitter { brightness: 0.5, max_shift: 1, ..FlipShiftJitter::new(shape) };
        let mut rng = StdRng::seed_from_u64(9);
        let mut image: Vec<f64> = (0..48).map(|i| i as f64 / 47.0).collect();
        for _ in 0..20 {
            aug.augment(&mut image, &mut rng);
            assert!(image.iter().all(|&v| (0.0..=1.0).contains(&v)));
        }
    }
}
