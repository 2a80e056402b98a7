use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use burn::{
    record::{FullPrecisionSettings, Record},
    tensor::backend::Backend,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{Result, TrainError},
    training::{identity::RunIdentity, metrics::MetricsHistory},
};

const FORMAT_VERSION: u32 = 1;

type Precision = FullPrecisionSettings;

/// Everything needed to resume a run: weights, best weights, optimizer
/// state and the metric series so far.
#[derive(Debug)]
pub struct Checkpoint<MR, OR> {
    pub epoch: usize,
    pub model: MR,
    pub best_model: Option<MR>,
    pub optimizer: OR,
    pub metrics: MetricsHistory,
}

#[derive(Serialize, Deserialize)]
#[serde(bound(
    serialize = "M: Serialize, O: Serialize",
    deserialize = "M: DeserializeOwned, O: DeserializeOwned"
))]
struct CheckpointFile<M, O> {
    version: u32,
    epoch: usize,
    model: M,
    best_model: Option<M>,
    optimizer: O,
    metrics: MetricsHistory,
}

/// On-disk store with one checkpoint file per run identity.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, identity: &RunIdentity) -> PathBuf {
        identity.checkpoint_path(&self.dir)
    }

    pub fn exists(&self, identity: &RunIdentity) -> bool {
        self.path(identity).is_file()
    }

    /// Loads the checkpoint for `identity`. A missing file is `Ok(None)`;
    /// an unreadable or corrupt one is an error.
    pub fn load<B, MR, OR>(
        &self,
        identity: &RunIdentity,
        device: &B::Device,
    ) -> Result<Option<Checkpoint<MR, OR>>>
    where
        B: Backend,
        MR: Record<B>,
        OR: Record<B>,
    {
        let path = self.path(identity);
        if !path.is_file() {
            debug!("No checkpoint at {}", path.display());
            return Ok(None);
        }

        let file = fs::File::open(&path).map_err(|e| TrainError::io(&path, e))?;
        let stored: CheckpointFile<MR::Item<Precision>, OR::Item<Precision>> =
            bincode::deserialize_from(BufReader::new(file)).map_err(|source| {
                TrainError::Checkpoint {
                    path: path.clone(),
                    source,
                }
            })?;

        if stored.version != FORMAT_VERSION {
            return Err(TrainError::CheckpointVersion {
                path,
                found: stored.version,
                expected: FORMAT_VERSION,
            });
        }

        info!("Loaded checkpoint {} (epoch {})", path.display(), stored.epoch);
        Ok(Some(Checkpoint {
            epoch: stored.epoch,
            model: MR::from_item(stored.model, device),
            best_model: stored.best_model.map(|item| MR::from_item(item, device)),
            optimizer: OR::from_item(stored.optimizer, device),
            metrics: stored.metrics,
        }))
    }

    /// Replaces the checkpoint for `identity` in full.
    ///
    /// The bundle is written to a sibling temp file first and renamed over
    /// the target, so a crash mid-write leaves the previous checkpoint intact.
    pub fn save<B, MR, OR>(
        &self,
        identity: &RunIdentity,
        checkpoint: Checkpoint<MR, OR>,
    ) -> Result<PathBuf>
    where
        B: Backend,
        MR: Record<B>,
        OR: Record<B>,
    {
        fs::create_dir_all(&self.dir).map_err(|e| TrainError::io(&self.dir, e))?;
        let path = self.path(identity);
        let tmp_path = path.with_extension("pth.tmp");

        let stored = CheckpointFile {
            version: FORMAT_VERSION,
            epoch: checkpoint.epoch,
            model: checkpoint.model.into_item::<Precision>(),
            best_model: checkpoint.best_model.map(|r| r.into_item::<Precision>()),
            optimizer: checkpoint.optimizer.into_item::<Precision>(),
            metrics: checkpoint.metrics,
        };

        let file = fs::File::create(&tmp_path).map_err(|e| TrainError::io(&tmp_path, e))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, &stored).map_err(|source| {
            TrainError::Checkpoint {
                path: tmp_path.clone(),
                source,
            }
        })?;
        writer.flush().map_err(|e| TrainError::io(&tmp_path, e))?;
        drop(writer);
        fs::rename(&tmp_path, &path).map_err(|e| TrainError::io(&path, e))?;

        info!("Checkpoint saved: {} (epoch {})", path.display(), stored.epoch);
        Ok(path)
    }
}
