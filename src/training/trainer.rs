use std::time::Instant;

use burn::{
    module::{AutodiffModule, Module},
    optim::{adaptor::OptimizerAdaptor, GradientsParams, Optimizer, SimpleOptimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use tracing::{debug, info, warn};

use crate::{
    data::PhaseLoaders,
    error::{Result, TrainError},
    model::Classifier,
    training::{
        checkpoint::{Checkpoint, CheckpointStore},
        clipping::clip_grad_norm,
        config::TrainingConfig,
        criterion::Criterion,
        curves::{CurveKind, CurveRenderer},
        metrics::{EpochSummary, MetricsHistory, Phase, PhaseAccumulator},
        signal::StopSignal,
    },
};

/// Optimizer state as stored in a checkpoint.
pub type OptimizerRecord<O, M, B> = <OptimizerAdaptor<O, M, B> as Optimizer<M, B>>::Record;

/// Model, best model and history at the end of the last committed epoch.
#[derive(Debug, Clone)]
pub struct TrainingState<M> {
    pub epoch: usize,
    pub model: M,
    /// Weights at the lowest validation loss seen so far.
    pub best_model: Option<M>,
    pub history: MetricsHistory,
}

/// Why the epoch loop stopped early.
enum Halt {
    Interrupted,
    Failed(TrainError),
}

impl From<TrainError> for Halt {
    fn from(err: TrainError) -> Self {
        Halt::Failed(err)
    }
}

/// The last fully finished epoch of this run, kept so an interrupt can
/// persist it.
struct Committed<M, OR> {
    state: TrainingState<M>,
    optimizer: OR,
}

#[derive(Debug, Clone, Copy)]
struct PhaseResult {
    loss: f64,
    accuracy: f64,
}

/// Computes how many argmax predictions match the labels
fn count_correct<B: Backend>(probs: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> usize {
    let [batch_size, _] = probs.dims();
    let predictions = probs.argmax(1).reshape([batch_size]);
    let sum: i64 = predictions.equal(labels).int().sum().into_scalar().elem();
    sum as usize
}

/// Drives train/val epochs with checkpoint resume, best-model tracking and
/// curve rendering.
pub struct Trainer<B: AutodiffBackend, C> {
    config: TrainingConfig,
    criterion: C,
    stop: StopSignal,
    store: CheckpointStore,
    renderer: CurveRenderer,
    device: B::Device,
}

impl<B, C> Trainer<B, C>
where
    B: AutodiffBackend,
    C: Criterion,
{
    pub fn new(config: TrainingConfig, criterion: C, stop: StopSignal, device: B::Device) -> Self {
        Self {
            store: CheckpointStore::new(&config.checkpoint_dir),
            renderer: CurveRenderer::new(&config.curves_dir),
            config,
            criterion,
            stop,
            device,
        }
    }

    /// Trains `model` up to `config.epochs`, resuming from the identity's
    /// checkpoint when one exists.
    ///
    /// Returns `None` when no epoch was completed or loaded, e.g. when the
    /// stop signal fired during the first epoch. A resumed run that is
    /// already at `config.epochs` returns the loaded state without saving.
    pub fn fit<M, O>(
        &mut self,
        model: M,
        optimizer: OptimizerAdaptor<O, M, B>,
        loaders: &PhaseLoaders<B>,
    ) -> Result<Option<TrainingState<M>>>
    where
        M: AutodiffModule<B> + Classifier<B>,
        M::InnerModule: Classifier<B::InnerBackend>,
        O: SimpleOptimizer<B::InnerBackend>,
    {
        let (state, mut optimizer, resumed) = self.resume(model, optimizer)?;

        info!(
            "Training {} from epoch {} to {} ({} train / {} val items)",
            self.config.identity,
            state.history.epoch + 1,
            self.config.epochs,
            loaders.train_len,
            loaders.val_len
        );

        let mut committed = None;
        match self.run_epochs(state, &mut optimizer, loaders, &mut committed) {
            Ok(state) if committed.is_some() => Ok(Some(state)),
            Ok(state) if resumed => {
                info!(
                    "Checkpoint is already at epoch {}, nothing to train",
                    state.epoch
                );
                Ok(Some(state))
            }
            Ok(_) => Ok(None),
            Err(Halt::Failed(err)) => Err(err),
            Err(Halt::Interrupted) => match committed {
                Some(Committed { state, optimizer }) => {
                    warn!("Stopping, saving epoch {}", state.epoch);
                    self.save(&state, optimizer)?;
                    Ok(Some(state))
                }
                None => {
                    warn!("Stopping before any epoch completed, nothing saved");
                    Ok(None)
                }
            },
        }
    }

    /// Loads weights, optimizer state and history from the checkpoint, or
    /// starts fresh when there is none.
    fn resume<M, O>(
        &self,
        model: M,
        optimizer: OptimizerAdaptor<O, M, B>,
    ) -> Result<(TrainingState<M>, OptimizerAdaptor<O, M, B>, bool)>
    where
        M: AutodiffModule<B>,
        O: SimpleOptimizer<B::InnerBackend>,
    {
        let identity = &self.config.identity;
        let path = self.store.path(identity);
        let loaded = self
            .store
            .load::<B, M::Record, OptimizerRecord<O, M, B>>(identity, &self.device)?;

        let Some(checkpoint) = loaded else {
            info!("{} not found, starting fresh", path.display());
            return Ok((
                TrainingState {
                    epoch: 0,
                    model,
                    best_model: None,
                    history: MetricsHistory::new(),
                },
                optimizer,
                false,
            ));
        };

        info!("{} exists, resuming after epoch {}", path.display(), checkpoint.metrics.epoch);
        let optimizer = optimizer.load_record(checkpoint.optimizer);
        let best_model = checkpoint
            .best_model
            .map(|record| model.clone().load_record(record));
        Ok((
            TrainingState {
                epoch: checkpoint.metrics.epoch,
                model: model.load_record(checkpoint.model),
                best_model,
                history: checkpoint.metrics,
            },
            optimizer,
            true,
        ))
    }

    fn run_epochs<M, O>(
        &mut self,
        mut state: TrainingState<M>,
        optimizer: &mut OptimizerAdaptor<O, M, B>,
        loaders: &PhaseLoaders<B>,
        committed: &mut Option<Committed<M, OptimizerRecord<O, M, B>>>,
    ) -> std::result::Result<TrainingState<M>, Halt>
    where
        M: AutodiffModule<B> + Classifier<B>,
        M::InnerModule: Classifier<B::InnerBackend>,
        O: SimpleOptimizer<B::InnerBackend>,
    {
        let mut best_val_loss = state.history.best_val_loss();

        for epoch in state.history.epoch + 1..=self.config.epochs {
            let started = Instant::now();

            let (model, train) = self.train_phase(state.model, optimizer, loaders, epoch)?;
            state.model = model;
            let val = self.val_phase(&state.model, loaders, epoch)?;

            if val.loss <= best_val_loss {
                best_val_loss = val.loss;
                state.best_model = Some(state.model.clone());
                info!("### BETTER NET STATE ### (val loss {:.6})", val.loss);
            }

            state.history.record(Phase::Train, train.loss, train.accuracy);
            state.history.record(Phase::Val, val.loss, val.accuracy);
            state.history.epoch = epoch;
            state.epoch = epoch;

            EpochSummary {
                epoch,
                train_loss: train.loss,
                val_loss: val.loss,
                train_accuracy: train.accuracy,
                val_accuracy: val.accuracy,
                duration_secs: started.elapsed().as_secs_f64(),
            }
            .log();

            for kind in CurveKind::ALL {
                self.renderer
                    .render(kind, epoch, &self.config.identity, &state.history)?;
            }

            self.save(&state, optimizer.to_record())?;
            *committed = Some(Committed {
                state: state.clone(),
                optimizer: optimizer.to_record(),
            });
        }

        Ok(state)
    }

    /// Autodiff forward/backward over the training split; dropout is active.
    fn train_phase<M, O>(
        &self,
        mut model: M,
        optimizer: &mut OptimizerAdaptor<O, M, B>,
        loaders: &PhaseLoaders<B>,
        epoch: usize,
    ) -> std::result::Result<(M, PhaseResult), Halt>
    where
        M: AutodiffModule<B> + Classifier<B>,
        O: SimpleOptimizer<B::InnerBackend>,
    {
        let mut accumulator = PhaseAccumulator::new();

        for batch in loaders.train.iter() {
            if self.stop.is_raised() {
                return Err(Halt::Interrupted);
            }
            let batch_size = batch.labels.dims()[0];

            let (logits, probs) =
                model.classify(batch.input_ids, batch.attention_mask, batch.token_type_ids);
            let loss = self.criterion.forward(logits, batch.labels.clone());
            let loss_value: f64 = loss.clone().into_scalar().elem();
            let correct = count_correct(probs.inner(), batch.labels.inner());

            // Gradients are fresh per backward pass, nothing to zero.
            let mut grads = GradientsParams::from_grads(loss.backward(), &model);
            clip_grad_norm::<B, M>(&model, &mut grads, self.config.grad_clip_norm.into());
            model = optimizer.step(self.config.learning_rate, model, grads);

            accumulator.update(loss_value, correct, batch_size);
            self.log_progress(epoch, Phase::Train, &accumulator);
        }

        let result = PhaseResult {
            loss: accumulator.average_loss(loaders.train_len),
            accuracy: accumulator.accuracy(),
        };
        Ok((model, result))
    }

    /// Inference-only pass over the validation split.
    fn val_phase<M>(
        &self,
        model: &M,
        loaders: &PhaseLoaders<B>,
        epoch: usize,
    ) -> std::result::Result<PhaseResult, Halt>
    where
        M: AutodiffModule<B>,
        M::InnerModule: Classifier<B::InnerBackend>,
    {
        let model = model.valid();
        let mut accumulator = PhaseAccumulator::new();

        for batch in loaders.val.iter() {
            if self.stop.is_raised() {
                return Err(Halt::Interrupted);
            }
            let batch_size = batch.labels.dims()[0];

            let (logits, probs) =
                model.classify(batch.input_ids, batch.attention_mask, batch.token_type_ids);
            let loss: f64 = self
                .criterion
                .forward(logits, batch.labels.clone())
                .into_scalar()
                .elem();
            let correct = count_correct(probs, batch.labels);

            accumulator.update(loss, correct, batch_size);
            self.log_progress(epoch, Phase::Val, &accumulator);
        }

        Ok(PhaseResult {
            loss: accumulator.average_loss(loaders.val_len),
            accuracy: accumulator.accuracy(),
        })
    }

    fn log_progress(&self, epoch: usize, phase: Phase, accumulator: &PhaseAccumulator) {
        let batches = accumulator.num_batches();
        if self.config.log_every > 0 && batches % self.config.log_every == 0 {
            debug!(
                epoch,
                %phase,
                batch = batches,
                "loss {:.4}",
                accumulator.running_loss()
            );
        }
    }

    fn save<M, OR>(&self, state: &TrainingState<M>, optimizer: OR) -> Result<()>
    where
        M: Module<B>,
        OR: burn::record::Record<B>,
    {
        self.store.save::<B, _, _>(
            &self.config.identity,
            Checkpoint {
                epoch: state.epoch,
                model: state.model.clone().into_record(),
                best_model: state.best_model.clone().map(|model| model.into_record()),
                optimizer,
                metrics: state.history.clone(),
            },
        )?;
        Ok(())
    }
}
