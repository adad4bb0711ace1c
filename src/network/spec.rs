use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::Result;
use crate::network::metadata::ImageShape;

/// Architecture of an [`EmbeddingNet`](crate::network::EmbeddingNet).
///
/// Dense layers of `hidden` sizes (each followed by `activation`), then a
/// linear projection to `emb_size` and L2 normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Human-readable name used as part of checkpoint keys.
    pub name: String,
    pub input: ImageShape,
    pub hidden: Vec<usize>,
    pub activation: ActivationFunction,
    pub emb_size: usize,
}

impl NetworkSpec {
    /// `(size, input_size, activation)` for every layer, input to output.
    pub fn layer_shapes(&self) -> Vec<(usize, usize, ActivationFunction)> {
        let mut shapes = Vec::with_capacity(self.hidden.len() + 1);
        let mut fan_in = self.input.len();
        for &size in &self.hidden {
            shapes.push((size, fan_in, self.activation));
            fan_in = size;
        }
        shapes.push((self.emb_size, fan_in, ActivationFunction::Identity));
        shapes
    }

    /// True when both specs build interchangeable weights. The name is
    /// ignored.
    pub fn same_architecture(&self, other: &NetworkSpec) -> bool {
        self.input == other.input
            && self.hidden == other.hidden
            && self.activation == other.activation
            && self.emb_size == other.emb_size
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<NetworkSpec> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_shapes_chain_fan_in() {
        let spec = NetworkSpec {
            name: "t".into(),
            input: ImageShape { width: 4, height: 2, channels: 1 },
            hidden: vec![6, 5],
            activation: ActivationFunction::ReLU,
            emb_size: 3,
        };
        let shapes = spec.layer_shapes();
        assert_eq!(shapes.iter().map(|s| (s.0, s.1)).collect::<Vec<_>>(), vec![(6, 8), (5, 6), (3, 5)]);
        assert_eq!(shapes[2].2, ActivationFunction::Identity);
    }

    #[test]
    fn architecture_comparison_ignores_name() {
        let spec = NetworkSpec {
            name: "a".into(),
            input: ImageShape { width: 4, height: 4, channels: 3 },
            hidden: vec![16],
            activation: ActivationFunction::ReLU,
            emb_size: 8,
        };
        assert!(spec.same_architecture(&NetworkSpec { name: "b".into(), ..spec.clone() }));
        assert!(!spec.same_architecture(&NetworkSpec { emb_size: 16, ..spec.clone() }));
        assert!(!spec.same_architecture(&NetworkSpec { hidden: vec![16, 16], ..spec.clone() }));
    }
}
