use burn::tensor::{backend::Backend, ElementConversion};
use tracing::info;

use crate::{data::BatchLoader, model::Classifier};

/// Aggregate accuracy over a held-out split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccuracyReport {
    pub correct: usize,
    pub total: usize,
    /// `100 * correct / total`, floored
    pub percent: usize,
}

/// Runs `model` over every batch of `loader` and reports how many argmax
/// predictions match the labels.
///
/// Pass an inference module (`model.valid()`) so no autodiff graph is
/// recorded; neither the model nor any checkpoint is modified.
pub fn total_accuracy<B, M>(model: &M, loader: &BatchLoader<B>, dataset_len: usize) -> AccuracyReport
where
    B: Backend,
    M: Classifier<B>,
{
    let mut correct = 0;
    let mut total = 0;

    for batch in loader.iter() {
        let [batch_size] = batch.labels.dims();
        let (_, probs) = model.classify(batch.input_ids, batch.attention_mask, batch.token_type_ids);
        let predicted = probs.argmax(1).reshape([batch_size]);
        let hits: i64 = predicted.equal(batch.labels).int().sum().into_scalar().elem();
        correct += hits as usize;
        total += batch_size;
    }

    let percent = if total == 0 { 0 } else { 100 * correct / total };
    info!(
        "Accuracy of the network on the {} test items: {} %",
        dataset_len, percent
    );

    AccuracyReport {
        correct,
        total,
        percent,
    }
}
