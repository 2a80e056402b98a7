use burn::{
    module::Module,
    nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, LayerNorm, LayerNormConfig},
    tensor::{backend::Backend, Int, Tensor},
};

/// Configuration for the embedding layer
#[derive(Debug, Clone)]
pub struct TextEmbeddingsConfig {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub max_position: usize,
    pub type_vocab_size: usize,
    pub dropout: f64,
}

impl TextEmbeddingsConfig {
    pub fn new(vocab_size: usize, hidden_size: usize) -> Self {
        Self {
            vocab_size,
            hidden_size,
            max_position: 512,
            type_vocab_size: 2,
            dropout: 0.1,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> TextEmbeddings<B> {
        TextEmbeddings {
            token_embedding: EmbeddingConfig::new(self.vocab_size, self.hidden_size).init(device),
            position_embedding: EmbeddingConfig::new(self.max_position, self.hidden_size)
                .init(device),
            token_type_embedding: EmbeddingConfig::new(self.type_vocab_size, self.hidden_size)
                .init(device),
            norm: LayerNormConfig::new(self.hidden_size).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// Sum of token, position and segment embeddings
#[derive(Module, Debug)]
pub struct TextEmbeddings<B: Backend> {
    token_embedding: Embedding<B>,
    position_embedding: Embedding<B>,
    token_type_embedding: Embedding<B>,
    norm: LayerNorm<B>,
    dropout: Dropout,
}

impl<B: Backend> TextEmbeddings<B> {
    /// input_ids, token_type_ids: [batch, seq_len] -> [batch, seq_len, hidden]
    pub fn forward(
        &self,
        input_ids: Tensor<B, 2, Int>,
        token_type_ids: Tensor<B, 2, Int>,
    ) -> Tensor<B, 3> {
        let [batch_size, seq_len] = input_ids.dims();
        let device = input_ids.device();

        let position_ids = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &device)
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);

        let embeddings = self.token_embedding.forward(input_ids)
            + self.position_embedding.forward(position_ids)
            + self.token_type_embedding.forward(token_type_ids);

        self.dropout.forward(self.norm.forward(embeddings))
    }
}
