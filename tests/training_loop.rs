use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use burn::{
    backend::{Autodiff, NdArray},
    module::{AutodiffModule, Module},
    optim::{Adam, AdamConfig},
    tensor::{backend::Backend, ElementConversion, Int, Tensor},
};
use textclf::{
    data::{
        eval_loader, synthetic_sentiment, ClassificationDataset, PhaseLoaders, SplitDataset,
        TextEncoder,
    },
    model::{Classifier, TextClassifier, TextClassifierConfig},
    training::{
        total_accuracy, CheckpointStore, Criterion, CrossEntropy, CurveKind, CurveRenderer,
        OptimizerRecord, RunIdentity, StopSignal, Trainer, TrainingConfig,
    },
};

type Inner = NdArray<f32>;
type TB = Autodiff<Inner>;
type ModelRecord = <TextClassifier<TB> as Module<TB>>::Record;
type AdamRecord = OptimizerRecord<Adam, TextClassifier<TB>, TB>;

const MAX_LEN: usize = 12;
const VOCAB: usize = 256;
const BATCH: usize = 8;

fn split() -> SplitDataset {
    let encoder = TextEncoder::hashed(MAX_LEN, VOCAB);
    let texts = synthetic_sentiment(40, 5);
    let dataset = ClassificationDataset::encode(&texts, &encoder).unwrap();
    SplitDataset::split(dataset.items, 0.2, 0.1, 5).unwrap()
}

fn config(dir: &Path, epochs: usize) -> TrainingConfig {
    TrainingConfig {
        epochs,
        batch_size: BATCH,
        learning_rate: 1e-2,
        num_workers: 1,
        checkpoint_dir: dir.join("model"),
        curves_dir: dir.join("loss_graphs"),
        identity: RunIdentity::new("Tiny", "Adam", "CrossEntropy"),
        ..TrainingConfig::default()
    }
}

fn model() -> TextClassifier<TB> {
    TextClassifierConfig::new(VOCAB, 2)
        .with_hidden_size(8)
        .init::<TB>(&Default::default())
}

fn fit_with<C: Criterion>(
    config: TrainingConfig,
    criterion: C,
    stop: StopSignal,
    split: &SplitDataset,
) -> Option<textclf::training::TrainingState<TextClassifier<TB>>> {
    let device = Default::default();
    let loaders = PhaseLoaders::<TB>::new(split, config.batch_size, config.seed, 1, &device);
    let mut trainer = Trainer::new(config, criterion, stop, device);
    trainer
        .fit(model(), AdamConfig::new().init(), &loaders)
        .unwrap()
}

fn fit(config: TrainingConfig, split: &SplitDataset) -> Option<textclf::training::TrainingState<TextClassifier<TB>>> {
    fit_with(config, CrossEntropy, StopSignal::new(), split)
}

fn curve_paths(config: &TrainingConfig) -> Vec<std::path::PathBuf> {
    let renderer = CurveRenderer::new(&config.curves_dir);
    CurveKind::ALL
        .iter()
        .map(|&kind| renderer.path(kind, &config.identity))
        .collect()
}

/// Raises the stop signal on the `after`-th loss evaluation.
struct StopAfter {
    calls: AtomicUsize,
    after: usize,
    stop: StopSignal,
}

impl Criterion for StopAfter {
    fn forward<B: Backend>(&self, logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
            self.stop.raise();
        }
        CrossEntropy.forward(logits, labels)
    }
}

/// Reports a fixed loss value while still back-propagating cross entropy,
/// so weights move but every epoch scores the same.
struct FlatLoss(f32);

impl Criterion for FlatLoss {
    fn forward<B: Backend>(&self, logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let loss = CrossEntropy.forward(logits, labels);
        loss.clone().sub(loss.detach()).add_scalar(self.0)
    }
}

/// Inference logits of `model` on the first validation batch.
fn val_logits(model: &TextClassifier<TB>, split: &SplitDataset) -> Vec<f32> {
    let loader = eval_loader::<Inner>(&split.val, BATCH, 1, &Default::default());
    let batch = loader.iter().next().expect("non-empty val split");
    let (logits, _) = model
        .valid()
        .classify(batch.input_ids, batch.attention_mask, batch.token_type_ids);
    logits.into_data().to_vec().unwrap()
}

fn same_outputs(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-6)
}

#[test]
fn fresh_run_writes_checkpoint_and_curves() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 1);
    let split = split();

    let state = fit(config.clone(), &split).expect("one epoch completed");
    assert_eq!(state.epoch, 1);
    let history = &state.history;
    assert!(history.is_consistent());
    assert_eq!(history.train_loss.len(), 1);
    assert_eq!(history.val_loss.len(), 1);
    assert_eq!(history.train_acc.len(), 1);
    assert_eq!(history.val_acc.len(), 1);
    for acc in history.train_acc.iter().chain(&history.val_acc) {
        assert!((0.0..=100.0).contains(acc));
    }
    for loss in history.train_loss.iter().chain(&history.val_loss) {
        assert!(loss.is_finite() && *loss >= 0.0);
    }
    // a single val loss is always the best so far
    assert!(state.best_model.is_some());

    let store = CheckpointStore::new(&config.checkpoint_dir);
    assert!(config
        .checkpoint_dir
        .join("state-Tiny-optimizer-Adam-loss-CrossEntropy.pth")
        .is_file());
    let saved = store
        .load::<TB, ModelRecord, AdamRecord>(&config.identity, &Default::default())
        .unwrap()
        .unwrap();
    assert_eq!(saved.epoch, 1);
    assert_eq!(saved.metrics, state.history);

    for path in curve_paths(&config) {
        assert!(path.is_file(), "missing {}", path.display());
    }
}

#[test]
fn resumed_run_keeps_earlier_history() {
    let dir = tempfile::tempdir().unwrap();
    let split = split();

    let first = fit(config(dir.path(), 2), &split).unwrap();
    let resumed = fit(config(dir.path(), 3), &split).unwrap();

    assert_eq!(resumed.epoch, 3);
    assert!(resumed.history.is_consistent());
    assert_eq!(&resumed.history.train_loss[..2], &first.history.train_loss[..]);
    assert_eq!(&resumed.history.val_loss[..2], &first.history.val_loss[..]);
    assert_eq!(&resumed.history.train_acc[..2], &first.history.train_acc[..]);
    assert_eq!(&resumed.history.val_acc[..2], &first.history.val_acc[..]);
}

#[test]
fn resume_at_target_epoch_returns_loaded_state_without_saving() {
    let dir = tempfile::tempdir().unwrap();
    let split = split();
    let config = config(dir.path(), 2);

    let first = fit(config.clone(), &split).unwrap();
    let checkpoint = config
        .checkpoint_dir
        .join(config.identity.checkpoint_file_name());
    let written = std::fs::metadata(&checkpoint).unwrap().modified().unwrap();
    std::fs::remove_dir_all(&config.curves_dir).unwrap();

    let again = fit(config.clone(), &split).unwrap();
    assert_eq!(again.epoch, 2);
    assert_eq!(again.history, first.history);
    assert_eq!(
        std::fs::metadata(&checkpoint).unwrap().modified().unwrap(),
        written
    );
    assert!(!config.curves_dir.exists());
}

#[test]
fn interrupt_before_first_epoch_saves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 3);
    let stop = StopSignal::new();
    stop.raise();

    let state = fit_with(config.clone(), CrossEntropy, stop, &split());
    assert!(state.is_none());
    assert!(!CheckpointStore::new(&config.checkpoint_dir).exists(&config.identity));
    for path in curve_paths(&config) {
        assert!(!path.exists());
    }
}

#[test]
fn interrupt_mid_epoch_keeps_last_committed_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 5);
    let split = split();

    let batches = |n: usize| n.div_ceil(BATCH);
    let per_epoch = batches(split.train.len()) + batches(split.val.len());
    assert!(batches(split.train.len()) >= 2);

    let stop = StopSignal::new();
    let criterion = StopAfter {
        calls: AtomicUsize::new(0),
        // first training batch of epoch 2
        after: per_epoch + 1,
        stop: stop.clone(),
    };

    let state = fit_with(config.clone(), criterion, stop, &split).expect("epoch 1 was committed");
    assert_eq!(state.epoch, 1);
    assert_eq!(state.history.len(), 1);
    assert!(state.history.is_consistent());

    let saved = CheckpointStore::new(&config.checkpoint_dir)
        .load::<TB, ModelRecord, AdamRecord>(&config.identity, &Default::default())
        .unwrap()
        .unwrap();
    assert_eq!(saved.epoch, 1);
    assert_eq!(saved.metrics.val_loss.len(), 1);
}

#[test]
fn best_model_reproduces_lowest_val_loss() {
    let dir = tempfile::tempdir().unwrap();
    let split = split();
    let state = fit(config(dir.path(), 3), &split).unwrap();

    let best = state.best_model.expect("best model tracked").valid();
    let loader = eval_loader::<Inner>(&split.val, BATCH, 1, &Default::default());
    let mut weighted = 0.0;
    for batch in loader.iter() {
        let [batch_size] = batch.labels.dims();
        let (logits, _) = best.classify(batch.input_ids, batch.attention_mask, batch.token_type_ids);
        let loss: f64 = CrossEntropy.forward(logits, batch.labels).into_scalar().elem();
        weighted += loss * batch_size as f64;
    }
    let recomputed = weighted / split.val.len() as f64;
    assert!(
        (recomputed - state.history.best_val_loss()).abs() < 1e-4,
        "best model loss {recomputed} vs recorded {}",
        state.history.best_val_loss()
    );
}

#[test]
fn accuracy_report_covers_test_split() {
    let dir = tempfile::tempdir().unwrap();
    let split = split();
    let state = fit(config(dir.path(), 1), &split).unwrap();

    let loader = eval_loader::<Inner>(&split.test, BATCH, 1, &Default::default());
    let report = total_accuracy(&state.model.valid(), &loader, split.test.len());
    assert_eq!(report.total, split.test.len());
    assert!(report.correct <= report.total);
    assert!(report.percent <= 100);
    assert_eq!(report.percent, 100 * report.correct / report.total);
}

#[test]
fn equal_val_loss_replaces_best_model() {
    let dir = tempfile::tempdir().unwrap();
    let split = split();

    let first = fit_with(config(dir.path(), 1), FlatLoss(1.0), StopSignal::new(), &split).unwrap();
    let state = fit_with(config(dir.path(), 3), FlatLoss(1.0), StopSignal::new(), &split).unwrap();

    assert_eq!(state.history.val_loss, vec![1.0; 3]);
    let best = state.best_model.as_ref().expect("best model tracked");
    let latest = val_logits(&state.model, &split);
    assert!(same_outputs(&val_logits(best, &split), &latest));
    // training moved the weights, so the tie really swapped the snapshot
    assert!(!same_outputs(&val_logits(&first.model, &split), &latest));
}

#[test]
fn resumed_best_loss_guards_loaded_best_model() {
    let dir = tempfile::tempdir().unwrap();
    let split = split();

    let first = fit_with(config(dir.path(), 1), FlatLoss(0.5), StopSignal::new(), &split).unwrap();
    let epoch_one = val_logits(&first.model, &split);

    let state = fit_with(config(dir.path(), 3), FlatLoss(2.0), StopSignal::new(), &split).unwrap();
    assert_eq!(state.history.val_loss, vec![0.5, 2.0, 2.0]);
    assert_eq!(state.history.best_val_loss(), 0.5);

    let best = state.best_model.as_ref().expect("loaded best model kept");
    assert!(same_outputs(&val_logits(best, &split), &epoch_one));
    assert!(!same_outputs(&val_logits(&state.model, &split), &epoch_one));
}

#[test]
fn interrupt_during_validation_discards_the_partial_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path(), 5);
    config.batch_size = 4;
    let split = split();

    let batches = |n: usize| n.div_ceil(config.batch_size);
    let train_batches = batches(split.train.len());
    let val_batches = batches(split.val.len());
    assert!(val_batches >= 2);

    let stop = StopSignal::new();
    let criterion = StopAfter {
        calls: AtomicUsize::new(0),
        // first validation batch of epoch 2
        after: train_batches + val_batches + train_batches + 1,
        stop: stop.clone(),
    };

    let state = fit_with(config.clone(), criterion, stop, &split).expect("epoch 1 was committed");
    assert_eq!(state.epoch, 1);
    assert_eq!(state.history.len(), 1);

    let saved = CheckpointStore::new(&config.checkpoint_dir)
        .load::<TB, ModelRecord, AdamRecord>(&config.identity, &Default::default())
        .unwrap()
        .unwrap();
    assert_eq!(saved.epoch, 1);
    assert_eq!(saved.metrics, state.history);
}
