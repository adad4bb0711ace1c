use std::fmt;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::{FaceNetError, Result};
use crate::train::history::History;

/// Identifies one epoch's artifacts: `{date}.{network_name}.{epoch}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointKey {
    pub date: String,
    pub network_name: String,
    pub epoch: usize,
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.date, self.network_name, self.epoch)
    }
}

/// Durable storage for per-epoch weights and history.
pub trait CheckpointStore<M: ?Sized> {
    fn save(&mut self, key: &CheckpointKey, model: &M, history: &History) -> Result<()>;
}

/// Writes `{model_dir}/{key}.json` and `{history_dir}/{key}.history.json`.
/// Each epoch gets new files; nothing is overwritten across epochs.
#[derive(Debug, Clone)]
pub struct JsonCheckpointStore {
    pub model_dir: PathBuf,
    pub history_dir: PathBuf,
}

impl JsonCheckpointStore {
    pub fn new(model_dir: impl Into<PathBuf>, history_dir: impl Into<PathBuf>) -> Self {
        JsonCheckpointStore { model_dir: model_dir.into(), history_dir: history_dir.into() }
    }

    pub fn model_path(&self, key: &CheckpointKey) -> PathBuf {
        self.model_dir.join(format!("{}.json", key))
    }

    pub fn history_path(&self, key: &CheckpointKey) -> PathBuf {
        self.history_dir.join(format!("{}.history.json", key))
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let wrap = |source: io::Error| FaceNetError::CheckpointWrite { path: path.to_path_buf(), source };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(wrap)?;
    }
    let file = fs::File::create(path).map_err(wrap)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value).map_err(|e| wrap(io::Error::new(io::ErrorKind::Other, e)))?;
    writer.flush().map_err(wrap)
}

impl<M: Serialize + ?Sized> CheckpointStore<M> for JsonCheckpointStore {
    fn save(&mut self, key: &CheckpointKey, model: &M, history: &History) -> Result<()> {
        let model_path = self.model_path(key);
        let history_path = self.history_path(key);
        write_json(&model_path, model)?;
        write_json(&history_path, history)?;
        info!(model = %model_path.display(), history = %history_path.display(), "checkpoint saved");
        Ok(())
    }
}
