pub mod classifier;
pub mod embeddings;

pub use classifier::{Classifier, TextClassifier, TextClassifierConfig};
pub use embeddings::{TextEmbeddings, TextEmbeddingsConfig};
