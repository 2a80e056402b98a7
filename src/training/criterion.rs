use burn::tensor::{activation::log_softmax, backend::Backend, Int, Tensor};

/// Loss function applied to classifier logits.
///
/// Generic over the backend so the same criterion scores the autodiff
/// model during training and the inner model during validation.
pub trait Criterion {
    /// logits: [batch, classes], labels: [batch] -> scalar loss [1]
    fn forward<B: Backend>(&self, logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1>;
}

/// Mean negative log-likelihood of the labelled class under softmax.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropy;

impl Criterion for CrossEntropy {
    fn forward<B: Backend>(&self, logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let [batch_size, _] = logits.dims();
        log_softmax(logits, 1)
            .gather(1, labels.reshape([batch_size, 1]))
            .mean()
            .neg()
    }
}
