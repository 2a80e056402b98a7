use burn::data::dataset::Dataset;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::info;

use crate::{
    data::{corpus::LabeledText, encoder::TextEncoder},
    error::{Result, TrainError},
    training::Phase,
};

/// A single encoded example ready to be batched
#[derive(Debug, Clone)]
pub struct ClassificationItem {
    /// Token ids, padded to the encoder's max length
    pub input_ids: Vec<u32>,
    /// 1 for real tokens, 0 for padding
    pub attention_mask: Vec<u32>,
    /// 0 for the first segment, 1 for the second of a pair
    pub token_type_ids: Vec<u32>,
    pub label: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ClassificationDataset {
    pub items: Vec<ClassificationItem>,
}

impl ClassificationDataset {
    pub fn from_items(items: Vec<ClassificationItem>) -> Self {
        Self { items }
    }

    /// Encodes labelled texts with `encoder`.
    pub fn encode(texts: &[LabeledText], encoder: &TextEncoder) -> Result<Self> {
        let items = texts
            .iter()
            .map(|text| {
                let encoded = encoder.encode(&text.text, text.text_pair.as_deref())?;
                Ok(ClassificationItem {
                    input_ids: encoded.input_ids,
                    attention_mask: encoded.attention_mask,
                    token_type_ids: encoded.token_type_ids,
                    label: text.label,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Largest label + 1.
    pub fn num_classes(&self) -> usize {
        self.items
            .iter()
            .map(|item| item.label as usize + 1)
            .max()
            .unwrap_or(0)
    }
}

impl Dataset<ClassificationItem> for ClassificationDataset {
    fn get(&self, index: usize) -> Option<ClassificationItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Train / validation / held-out test splits of one corpus.
#[derive(Debug, Clone, Default)]
pub struct SplitDataset {
    pub train: ClassificationDataset,
    pub val: ClassificationDataset,
    pub test: ClassificationDataset,
}

impl SplitDataset {
    /// Shuffles with `seed`, then carves off the validation and test
    /// fractions; the rest is training data.
    pub fn split(
        mut items: Vec<ClassificationItem>,
        val_ratio: f64,
        test_ratio: f64,
        seed: u64,
    ) -> Result<Self> {
        if !(0.0..1.0).contains(&(val_ratio + test_ratio)) || val_ratio < 0.0 || test_ratio < 0.0 {
            return Err(TrainError::Dataset(format!(
                "split ratios val={val_ratio} test={test_ratio} leave no training data"
            )));
        }
        let n = items.len();
        let n_val = (n as f64 * val_ratio).round() as usize;
        let n_test = (n as f64 * test_ratio).round() as usize;
        if n_val == 0 || n <= n_val + n_test {
            return Err(TrainError::Dataset(format!(
                "{n} items are too few for a train/val split"
            )));
        }

        items.shuffle(&mut StdRng::seed_from_u64(seed));
        let test = items.split_off(n - n_test);
        let val = items.split_off(items.len() - n_val);

        info!(
            "Split: {} training, {} validation, {} test items",
            items.len(),
            val.len(),
            test.len()
        );

        Ok(Self {
            train: ClassificationDataset::from_items(items),
            val: ClassificationDataset::from_items(val),
            test: ClassificationDataset::from_items(test),
        })
    }

    pub fn phase(&self, phase: Phase) -> &ClassificationDataset {
        match phase {
            Phase::Train => &self.train,
            Phase::Val => &self.val,
        }
    }

    pub fn len(&self, phase: Phase) -> usize {
        self.phase(phase).len()
    }
}
