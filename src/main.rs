use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::{
    backend::{Autodiff, NdArray},
    module::{AutodiffModule, Module},
    optim::{Adam, AdamConfig},
};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use textclf::{
    data::{
        eval_loader, load_tsv, synthetic_sentiment, ClassificationDataset, PhaseLoaders,
        SplitDataset, TextEncoder,
    },
    model::{TextClassifier, TextClassifierConfig},
    training::{
        total_accuracy, AppConfig, CheckpointStore, CrossEntropy, OptimizerRecord, StopSignal,
        Trainer,
    },
};

type InferBackend = NdArray<f32>;
type TrainBackend = Autodiff<InferBackend>;

type ModelRecord = <TextClassifier<TrainBackend> as Module<TrainBackend>>::Record;
type AdamRecord = OptimizerRecord<Adam, TextClassifier<TrainBackend>, TrainBackend>;

#[derive(Parser, Debug)]
#[command(name = "textclf", version, about = "Train and evaluate a text classifier with resumable checkpoints")]
struct Cli {
    /// TOML file with [training], [model] and [data] sections
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train (or resume training) up to the configured epoch
    Train(TrainArgs),
    /// Report held-out accuracy of the checkpointed model
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug)]
struct DataArgs {
    /// label<TAB>text[<TAB>text_pair] corpus; synthetic data when omitted
    #[arg(long)]
    data: Option<PathBuf>,

    /// HuggingFace tokenizer.json
    #[arg(long)]
    tokenizer: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TrainArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Train up to this epoch
    #[arg(long)]
    epochs: Option<usize>,

    /// Also write the metric history as CSV
    #[arg(long)]
    history_csv: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Use the best-validation weights instead of the latest
    #[arg(long)]
    best: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::default(),
    };

    match cli.command {
        Command::Train(args) => {
            apply_data_args(&mut config, &args.data);
            if let Some(epochs) = args.epochs {
                config.training.epochs = epochs;
            }
            train(config, args.history_csv)
        }
        Command::Evaluate(args) => {
            apply_data_args(&mut config, &args.data);
            evaluate(config, args.best)
        }
    }
}

fn apply_data_args(config: &mut AppConfig, args: &DataArgs) {
    if let Some(path) = &args.data {
        config.data.path = Some(path.clone());
    }
    if let Some(path) = &args.tokenizer {
        config.data.tokenizer = Some(path.clone());
    }
}

/// Encodes and splits the corpus, and fills in vocab/class counts the
/// model config leaves at zero.
fn prepare(config: &AppConfig) -> Result<(SplitDataset, TextClassifierConfig)> {
    let data = &config.data;
    let encoder = TextEncoder::new(data.tokenizer.as_deref(), data.max_length, data.hashed_vocab)?;

    let texts = match &data.path {
        Some(path) => load_tsv(path)?,
        None => {
            info!("No dataset given, generating {} synthetic examples", data.synthetic_size);
            synthetic_sentiment(data.synthetic_size, config.training.seed)
        }
    };

    let dataset = ClassificationDataset::encode(&texts, &encoder)?;
    let num_classes = dataset.num_classes();
    let split = SplitDataset::split(dataset.items, data.val_ratio, data.test_ratio, config.training.seed)?;

    let mut model = config.model.clone();
    if model.vocab_size == 0 {
        model.vocab_size = encoder.vocab_size();
    }
    if model.num_classes == 0 {
        model.num_classes = num_classes;
    }
    model.max_position = model.max_position.max(data.max_length);
    Ok((split, model))
}

fn train(config: AppConfig, history_csv: Option<PathBuf>) -> Result<()> {
    let device = Default::default();
    let (split, model_config) = prepare(&config)?;
    let training = config.training;

    let loaders = PhaseLoaders::<TrainBackend>::new(
        &split,
        training.batch_size,
        training.seed,
        training.num_workers,
        &device,
    );
    let model = model_config.init::<TrainBackend>(&device);
    let optimizer = AdamConfig::new().init();

    let stop = StopSignal::install_ctrlc()?;
    let mut trainer = Trainer::new(training.clone(), CrossEntropy, stop, device.clone());
    let Some(state) = trainer.fit(model, optimizer, &loaders)? else {
        info!("No completed epoch to report");
        return Ok(());
    };

    info!(
        "Finished at epoch {}, best val loss {:.6}",
        state.epoch,
        state.history.best_val_loss()
    );
    if let Some(path) = history_csv {
        state.history.save_csv(&path)?;
    }

    if !split.test.is_empty() {
        let loader = eval_loader::<InferBackend>(&split.test, training.batch_size, training.num_workers, &device);
        let model = state.best_model.as_ref().unwrap_or(&state.model).valid();
        total_accuracy(&model, &loader, split.test.len());
    }
    Ok(())
}

fn evaluate(config: AppConfig, best: bool) -> Result<()> {
    let device = Default::default();
    let (split, model_config) = prepare(&config)?;
    let training = &config.training;

    let store = CheckpointStore::new(&training.checkpoint_dir);
    let checkpoint = store
        .load::<TrainBackend, ModelRecord, AdamRecord>(&training.identity, &device)?
        .with_context(|| format!("no checkpoint at {}", store.path(&training.identity).display()))?;

    let record = match (best, checkpoint.best_model) {
        (true, Some(best)) => best,
        _ => checkpoint.model,
    };
    let model = model_config
        .init::<TrainBackend>(&device)
        .load_record(record)
        .valid();

    let loader = eval_loader::<InferBackend>(&split.test, training.batch_size, training.num_workers, &device);
    let report = total_accuracy(&model, &loader, split.test.len());
    info!(
        "Epoch {} checkpoint: {}/{} correct",
        checkpoint.epoch, report.correct, report.total
    );
    Ok(())
}
