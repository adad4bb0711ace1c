//! Image decoding and preprocessing.
//!
//! Every image fed to the network, whether for training, mining or
//! evaluation, goes through the same path: decode, resize to the network's
//! [`ImageShape`], flatten channel-interleaved and scale to [0, 1].

use std::collections::HashMap;
use std::path::PathBuf;

use crate::data::sample::Sample;
use crate::error::{FaceNetError, Result};
use crate::network::metadata::ImageShape;

/// Turns a sample into the flat input vector the network consumes.
pub trait ImageLoader {
    fn shape(&self) -> ImageShape;
    fn load(&self, sample: &Sample) -> Result<Vec<f64>>;
}

/// Loads images from disk with the `image` crate.
#[derive(Debug, Clone)]
pub struct FileImageLoader {
    pub shape: ImageShape,
}

impl FileImageLoader {
    pub fn new(shape: ImageShape) -> Self {
        FileImageLoader { shape }
    }

    fn preprocess(&self, img: image::DynamicImage) -> Vec<f64> {
        let ImageShape { width, height, channels } = self.shape;
        let resized = img.resize_exact(width, height, image::imageops::FilterType::Triangle);
        if channels == 1 {
            resized.to_luma8().pixels().map(|p| p.0[0] as f64 / 255.0).collect()
        } else {
            resized.to_rgb8()
                .pixels()
                .flat_map(|p| p.0.iter().map(|&c| c as f64 / 255.0))
                .collect()
        }
    }
}

impl ImageLoader for FileImageLoader {
    fn shape(&self) -> ImageShape {
        self.shape
    }

    fn load(&self, sample: &Sample) -> Result<Vec<f64>> {
        let img = image::open(&sample.path).map_err(|e| FaceNetError::ImageLoad {
            path: sample.path.clone(),
            reason: e.to_string(),
        })?;
        Ok(self.preprocess(img))
    }
}

/// Serves already-preprocessed images keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryImageLoader {
    pub shape: ImageShape,
    images: HashMap<PathBuf, Vec<f64>>,
}

impl MemoryImageLoader {
    pub fn new(shape: ImageShape) -> Self {
        MemoryImageLoader { shape, images: HashMap::new() }
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, image: Vec<f64>) {
        self.images.insert(path.into(), image);
    }
}

impl ImageLoader for MemoryImageLoader {
    fn shape(&self) -> ImageShape {
        self.shape
    }

    fn load(&self, sample: &Sample) -> Result<Vec<f64>> {
        let image = self.images.get(&sample.path).ok_or_else(|| FaceNetError::ImageLoad {
            path: sample.path.clone(),
            reason: "no such image".to_string(),
        })?;
        if image.len() != self.shape.len() {
            return Err(FaceNetError::ImageLoad {
                path: sample.path.clone(),
                reason: format!("expected {} values, found {}", self.shape.len(), image.len()),
            });
        }
        Ok(image.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_loader_resizes_and_scales() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dog.png");
        let img = image::RgbImage::from_pixel(8, 6, image::Rgb([255, 0, 51]));
        img.save(&path).unwrap();

        let loader = FileImageLoader::new(ImageShape::rgb(4, 4));
        let input = loader.load(&Sample::new(&path, 0)).unwrap();
        assert_eq!(input.len(), 48);
        assert!((input[0] - 1.0).abs() < 0.01);
        assert!(input[1].abs() < 0.01);
        assert!((input[2] - 0.2).abs() < 0.01);
    }

    #[test]
    fn missing_file_is_an_image_load_error() {
        let loader = FileImageLoader::new(ImageShape::rgb(4, 4));
        let err = loader.load(&Sample::new("/nonexistent/dog.jpg", 0)).unwrap_err();
        assert!(matches!(err, FaceNetError::ImageLoad { .. }));
    }

    #[test]
    fn memory_loader_checks_length() {
        let mut loader = MemoryImageLoader::new(ImageShape { width: 1, height: 2, channels: 1 });
        loader.insert("a", vec![0.1, 0.2]);
        loader.insert("b", vec![0.1]);
        assert_eq!(loader.load(&Sample::new("a", 0)).unwrap(), vec![0.1, 0.2]);
        assert!(loader.load(&Sample::new("b", 0)).is_err());
    }
}
