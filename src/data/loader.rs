use std::sync::Arc;

use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    tensor::backend::AutodiffBackend,
};

use crate::data::{
    batcher::{ClassificationBatch, ClassificationBatcher},
    dataset::{ClassificationDataset, SplitDataset},
};

pub type BatchLoader<B> = Arc<dyn DataLoader<B, ClassificationBatch<B>>>;

/// Per-phase batch sources plus the dataset size of each phase.
///
/// The training loader yields autodiff tensors; the validation loader
/// yields tensors for the inner backend, where no graph is recorded.
pub struct PhaseLoaders<B: AutodiffBackend> {
    pub train: BatchLoader<B>,
    pub val: BatchLoader<B::InnerBackend>,
    pub train_len: usize,
    pub val_len: usize,
}

impl<B: AutodiffBackend> PhaseLoaders<B> {
    pub fn new(
        split: &SplitDataset,
        batch_size: usize,
        seed: u64,
        num_workers: usize,
        device: &B::Device,
    ) -> Self {
        let train = DataLoaderBuilder::new(ClassificationBatcher::<B>::new(device.clone()))
            .batch_size(batch_size)
            .shuffle(seed)
            .num_workers(num_workers)
            .build(split.train.clone());

        Self {
            train,
            val: eval_loader::<B::InnerBackend>(&split.val, batch_size, num_workers, device),
            train_len: split.train.len(),
            val_len: split.val.len(),
        }
    }
}

/// Unshuffled loader for evaluation splits.
pub fn eval_loader<B: burn::tensor::backend::Backend>(
    dataset: &ClassificationDataset,
    batch_size: usize,
    num_workers: usize,
    device: &B::Device,
) -> BatchLoader<B> {
    DataLoaderBuilder::new(ClassificationBatcher::<B>::new(device.clone()))
        .batch_size(batch_size)
        .num_workers(num_workers)
        .build(dataset.clone())
}
