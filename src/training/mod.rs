pub mod checkpoint;
pub mod clipping;
pub mod config;
pub mod criterion;
pub mod curves;
pub mod evaluate;
pub mod identity;
pub mod metrics;
pub mod signal;
pub mod trainer;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use clipping::{clip_grad_norm, global_grad_norm};
pub use config::{AppConfig, TrainingConfig};
pub use criterion::{Criterion, CrossEntropy};
pub use curves::{CurveKind, CurveRenderer};
pub use evaluate::{total_accuracy, AccuracyReport};
pub use identity::RunIdentity;
pub use metrics::{EpochSummary, MetricsHistory, Phase, PhaseAccumulator};
pub use signal::StopSignal;
pub use trainer::{OptimizerRecord, Trainer, TrainingState};
