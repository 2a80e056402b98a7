use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{
    data::DataConfig,
    error::{Result, TrainError},
    model::TextClassifierConfig,
    training::identity::RunIdentity,
};

/// All hyperparameters for training in one place
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Last epoch to train up to (inclusive); resumed runs continue from the checkpoint
    pub epochs: usize,
    /// Number of samples per batch
    pub batch_size: usize,
    /// Learning rate for the optimizer
    pub learning_rate: f64,
    /// Maximum L2 norm of the gradients before each optimizer step
    pub grad_clip_norm: f32,
    /// Seed for shuffling and splitting
    pub seed: u64,
    /// Data loader worker threads
    pub num_workers: usize,
    /// Log running loss every N batches
    pub log_every: usize,
    /// Directory holding one checkpoint file per run identity
    pub checkpoint_dir: PathBuf,
    /// Directory the loss/accuracy curves are written to
    pub curves_dir: PathBuf,
    pub identity: RunIdentity,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 20,
            batch_size: 16,
            learning_rate: 1e-4,
            grad_clip_norm: 0.1,
            seed: 42,
            num_workers: 1,
            log_every: 10,
            checkpoint_dir: PathBuf::from("model"),
            curves_dir: PathBuf::from("loss_graphs"),
            identity: RunIdentity::default(),
        }
    }
}

/// Layout of the TOML file accepted by `--config`.
///
/// ```toml
/// [training]
/// epochs = 5
///
/// [training.identity]
/// model_kind = "TextClassifier"
/// optimizer_kind = "Adam"
/// loss_kind = "CrossEntropy"
///
/// [model]
/// hidden_size = 64
///
/// [data]
/// path = "data/reviews.tsv"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub training: TrainingConfig,
    pub model: TextClassifierConfig,
    pub data: DataConfig,
}

impl AppConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| TrainError::io(path, e))?;
        Self::from_toml(&text)
    }
}
