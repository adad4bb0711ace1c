pub mod matrix;

pub use matrix::{l2_norm, l2_normalize, Matrix};
