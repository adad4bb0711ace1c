use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::data::sample::Sample;
use crate::error::Result;

/// File extensions the image loader can decode.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "gif"];

/// Result of a read-only walk over a corpus directory.
#[derive(Debug, Clone, Default)]
pub struct CorpusScan {
    pub root: PathBuf,
    pub samples: Vec<Sample>,
    pub class_count: usize,
    /// Directories holding exactly one image. They are not classes and are
    /// left on disk unless [`prune_singletons`] is called.
    pub singletons: Vec<PathBuf>,
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Walks `root` depth-first in sorted order. Each directory holding at least
/// two images becomes a class; class ids follow discovery order.
pub fn scan_corpus(root: impl AsRef<Path>) -> Result<CorpusScan> {
    let root = root.as_ref();
    let mut scan = CorpusScan { root: root.to_path_buf(), ..CorpusScan::default() };
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut files = Vec::new();
        let mut subdirs = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                subdirs.push(path);
            } else if is_image(&path) {
                files.push(path);
            }
        }
        files.sort();
        subdirs.sort();

        match files.len() {
            0 => {}
            1 => {
                debug!(dir = %dir.display(), "single-image directory skipped");
                scan.singletons.push(dir.clone());
            }
            _ => {
                let class_id = scan.class_count;
                scan.samples.extend(files.into_iter().map(|p| Sample::new(p, class_id)));
                scan.class_count += 1;
            }
        }
        // Reverse so the stack pops subdirectories in sorted order.
        pending.extend(subdirs.into_iter().rev());
    }

    info!(
        root = %root.display(),
        samples = scan.samples.len(),
        classes = scan.class_count,
        singletons = scan.singletons.len(),
        "corpus scanned"
    );
    Ok(scan)
}

/// Deletes every singleton directory reported by `scan`. Returns how many
/// directories were removed.
pub fn prune_singletons(scan: &CorpusScan) -> Result<usize> {
    for dir in &scan.singletons {
        warn!(dir = %dir.display(), "removing single-image directory");
        fs::remove_dir_all(dir)?;
    }
    Ok(scan.singletons.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn classes_follow_sorted_traversal_and_singletons_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("b_dog/1.jpg"));
        touch(&root.join("b_dog/2.jpg"));
        touch(&root.join("a_dog/1.png"));
        touch(&root.join("a_dog/2.png"));
        touch(&root.join("a_dog/3.png"));
        touch(&root.join("c_dog/only.jpg"));
        touch(&root.join("c_dog/notes.txt"));

        let scan = scan_corpus(root).unwrap();
        assert_eq!(scan.class_count, 2);
        assert_eq!(scan.samples.len(), 5);
        assert!(scan.samples[..3].iter().all(|s| s.class_id == 0 && s.path.starts_with(root.join("a_dog"))));
        assert!(scan.samples[3..].iter().all(|s| s.class_id == 1));
        assert_eq!(scan.singletons, vec![root.join("c_dog")]);
        assert!(root.join("c_dog").exists(), "scan must not delete anything");

        assert_eq!(prune_singletons(&scan).unwrap(), 1);
        assert!(!root.join("c_dog").exists());
    }
}
