pub mod batcher;
pub mod corpus;
pub mod dataset;
pub mod encoder;
pub mod loader;

use std::path::PathBuf;

use serde::Deserialize;

pub use batcher::{ClassificationBatch, ClassificationBatcher};
pub use corpus::{load_tsv, synthetic_sentiment, LabeledText};
pub use dataset::{ClassificationDataset, ClassificationItem, SplitDataset};
pub use encoder::{EncodedText, TextEncoder};
pub use loader::{eval_loader, BatchLoader, PhaseLoaders};

/// Where examples come from and how they are encoded and split
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// TSV corpus; a synthetic corpus is generated when unset
    pub path: Option<PathBuf>,
    /// HuggingFace `tokenizer.json`; hashed word ids when unset
    pub tokenizer: Option<PathBuf>,
    pub max_length: usize,
    /// Bucket count of the hashed word encoder
    pub hashed_vocab: usize,
    pub val_ratio: f64,
    pub test_ratio: f64,
    /// Size of the synthetic corpus
    pub synthetic_size: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: None,
            tokenizer: None,
            max_length: 64,
            hashed_vocab: 4096,
            val_ratio: 0.2,
            test_ratio: 0.1,
            synthetic_size: 400,
        }
    }
}
