use burn::{
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{activation, backend::Backend, Int, Tensor},
};
use serde::Deserialize;

use crate::model::embeddings::{TextEmbeddings, TextEmbeddingsConfig};

/// A sequence classifier the training loop can drive.
///
/// Implemented for both the autodiff module and its inner (inference)
/// module, so the same forward serves the train and val phases.
pub trait Classifier<B: Backend> {
    /// input_ids, attention_mask, token_type_ids: [batch, seq_len]
    /// -> (logits, probabilities), both [batch, classes]
    fn classify(
        &self,
        input_ids: Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
        token_type_ids: Tensor<B, 2, Int>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>);
}

/// Full configuration for the bundled classifier
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TextClassifierConfig {
    /// Taken from the encoder when zero
    pub vocab_size: usize,
    pub hidden_size: usize,
    /// Taken from the training labels when zero
    pub num_classes: usize,
    pub max_position: usize,
    pub dropout: f64,
}

impl Default for TextClassifierConfig {
    fn default() -> Self {
        Self {
            vocab_size: 0,
            hidden_size: 64,
            num_classes: 0,
            max_position: 512,
            dropout: 0.1,
        }
    }
}

impl TextClassifierConfig {
    pub fn new(vocab_size: usize, num_classes: usize) -> Self {
        Self {
            vocab_size,
            num_classes,
            ..Self::default()
        }
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    /// Initializes the model on the given device
    pub fn init<B: Backend>(&self, device: &B::Device) -> TextClassifier<B> {
        let mut embeddings = TextEmbeddingsConfig::new(self.vocab_size, self.hidden_size);
        embeddings.max_position = self.max_position;
        embeddings.dropout = self.dropout;

        TextClassifier {
            embeddings: embeddings.init(device),
            pooler: LinearConfig::new(self.hidden_size, self.hidden_size).init(device),
            head: LinearConfig::new(self.hidden_size, self.num_classes.max(1)).init(device),
        }
    }
}

/// Embeddings, masked mean pooling, a tanh pooler and a linear head
#[derive(Module, Debug)]
pub struct TextClassifier<B: Backend> {
    embeddings: TextEmbeddings<B>,
    pooler: Linear<B>,
    head: Linear<B>,
}

impl<B: Backend> TextClassifier<B> {
    /// Returns the class logits [batch, classes]
    pub fn forward(
        &self,
        input_ids: Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
        token_type_ids: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2> {
        let [batch_size, _] = input_ids.dims();
        let x = self.embeddings.forward(input_ids, token_type_ids);
        let [_, _, hidden] = x.dims();

        // Padding positions do not contribute to the pooled vector.
        let mask = attention_mask.float().unsqueeze_dim::<3>(2);
        let summed = (x * mask.clone()).sum_dim(1);
        let counts = mask.sum_dim(1).clamp_min(1.0);
        let pooled = (summed / counts).reshape([batch_size, hidden]);

        let pooled = activation::tanh(self.pooler.forward(pooled));
        self.head.forward(pooled)
    }
}

impl<B: Backend> Classifier<B> for TextClassifier<B> {
    fn classify(
        &self,
        input_ids: Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
        token_type_ids: Tensor<B, 2, Int>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let logits = self.forward(input_ids, attention_mask, token_type_ids);
        let probs = activation::softmax(logits.clone(), 1);
        (logits, probs)
    }
}
