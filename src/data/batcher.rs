use burn::{
    data::dataloader::batcher::Batcher,
    tensor::{backend::Backend, Int, Tensor},
};
use crate::data::dataset::ClassificationItem;

#[derive(Debug, Clone)]
pub struct ClassificationBatch<B: Backend> {
    pub input_ids: Tensor<B, 2, Int>,
    pub attention_mask: Tensor<B, 2, Int>,
    pub token_type_ids: Tensor<B, 2, Int>,
    pub labels: Tensor<B, 1, Int>,
}

/// Stacks encoded items into batch tensors on the compute device.
#[derive(Clone, Debug)]
pub struct ClassificationBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> ClassificationBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn stack(items: &[ClassificationItem], field: fn(&ClassificationItem) -> &[u32], device: &B::Device) -> Tensor<B, 2, Int> {
        let seq_len = items[0].input_ids.len();
        let flat: Vec<i32> = items
            .iter()
            .flat_map(|item| field(item).iter().map(|&v| v as i32))
            .collect();

        Tensor::<B, 1, Int>::from_ints(flat.as_slice(), device).reshape([items.len(), seq_len])
    }
}

impl<B: Backend> Batcher<B, ClassificationItem, ClassificationBatch<B>> for ClassificationBatcher<B> {
    fn batch(&self, items: Vec<ClassificationItem>, _device: &B::Device) -> ClassificationBatch<B> {
        // Tensors go to the device this batcher was built for.
        let device = &self.device;

        let labels: Vec<i32> = items.iter().map(|item| item.label as i32).collect();

        ClassificationBatch {
            input_ids: Self::stack(&items, |item| item.input_ids.as_slice(), device),
            attention_mask: Self::stack(&items, |item| item.attention_mask.as_slice(), device),
            token_type_ids: Self::stack(&items, |item| item.token_type_ids.as_slice(), device),
            labels: Tensor::<B, 1, Int>::from_ints(labels.as_slice(), device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn item(ids: [u32; 4], label: u32) -> ClassificationItem {
        ClassificationItem {
            input_ids: ids.to_vec(),
            attention_mask: ids.iter().map(|&id| (id != 0) as u32).collect(),
            token_type_ids: vec![0; 4],
            label,
        }
    }

    #[test]
    fn batch_has_one_row_per_item() {
        let batcher = ClassificationBatcher::<B>::new(Default::default());
        let batch = batcher.batch(
            vec![item([1, 5, 2, 0], 1), item([1, 7, 8, 2], 0)],
            &Default::default(),
        );
        assert_eq!(batch.input_ids.dims(), [2, 4]);
        assert_eq!(batch.attention_mask.dims(), [2, 4]);
        assert_eq!(batch.token_type_ids.dims(), [2, 4]);
        let labels: Vec<i64> = batch.labels.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(labels, vec![1, 0]);
        let mask: Vec<i64> = batch.attention_mask.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(mask, vec![1, 1, 1, 0, 1, 1, 1, 1]);
    }
}
