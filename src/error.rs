use std::path::PathBuf;

/// Errors raised while preparing data, training, or persisting a run.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint {path} could not be encoded or decoded: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    #[error("checkpoint {path} has format version {found}, expected {expected}")]
    CheckpointVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("failed to write curve image {path}: {source}")]
    Render {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("could not install interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

impl TrainError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = TrainError> = std::result::Result<T, E>;
