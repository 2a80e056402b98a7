use std::fmt;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TrainError};

/// One sweep over a data split inside an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Train,
    Val,
}

impl Phase {
    /// Phases in the order every epoch runs them.
    pub const ALL: [Phase; 2] = [Phase::Train, Phase::Val];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Train => "train",
            Phase::Val => "val",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-epoch summary, logged once both phases are done
#[derive(Debug, Clone, Default)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    pub train_accuracy: f64,
    pub val_accuracy: f64,
    pub duration_secs: f64,
}

impl EpochSummary {
    pub fn log(&self) {
        info!(
            "[{:.0}s] Epoch {} loss : {:.8} acc: {} val: {:.8} acc: {}%",
            self.duration_secs,
            self.epoch,
            self.train_loss,
            self.train_accuracy,
            self.val_loss,
            self.val_accuracy,
        );
    }
}

/// Running totals for a single phase.
#[derive(Debug, Default)]
pub struct PhaseAccumulator {
    weighted_loss: f64,
    correct: usize,
    total: usize,
    num_batches: usize,
}

impl PhaseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `loss` is the batch mean; it is weighted by `batch_size`.
    pub fn update(&mut self, loss: f64, correct: usize, batch_size: usize) {
        self.weighted_loss += loss * batch_size as f64;
        self.correct += correct;
        self.total += batch_size;
        self.num_batches += 1;
    }

    /// Weighted loss divided by the size of the phase's dataset.
    pub fn average_loss(&self, dataset_len: usize) -> f64 {
        if dataset_len == 0 {
            return 0.0;
        }
        self.weighted_loss / dataset_len as f64
    }

    /// Sample-weighted mean loss over the batches seen so far, for progress logs.
    pub fn running_loss(&self) -> f64 {
        if self.num_batches == 0 {
            return 0.0;
        }
        self.weighted_loss / self.total as f64
    }

    /// Percentage of correct predictions rounded to two decimals.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let pct = 100.0 * self.correct as f64 / self.total as f64;
        (pct * 100.0).round() / 100.0
    }

    pub fn num_batches(&self) -> usize {
        self.num_batches
    }
}

/// Loss and accuracy series of a run, one entry per phase per epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsHistory {
    pub train_loss: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub train_acc: Vec<f64>,
    pub val_acc: Vec<f64>,
    /// Last completed epoch.
    pub epoch: usize,
}

impl MetricsHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, phase: Phase, loss: f64, accuracy: f64) {
        match phase {
            Phase::Train => {
                self.train_loss.push(loss);
                self.train_acc.push(accuracy);
            }
            Phase::Val => {
                self.val_loss.push(loss);
                self.val_acc.push(accuracy);
            }
        }
    }

    pub fn loss(&self, phase: Phase) -> &[f64] {
        match phase {
            Phase::Train => &self.train_loss,
            Phase::Val => &self.val_loss,
        }
    }

    pub fn accuracy(&self, phase: Phase) -> &[f64] {
        match phase {
            Phase::Train => &self.train_acc,
            Phase::Val => &self.val_acc,
        }
    }

    /// Number of fully recorded epochs.
    pub fn len(&self) -> usize {
        self.train_loss
            .len()
            .min(self.val_loss.len())
            .min(self.train_acc.len())
            .min(self.val_acc.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All four series have one entry per completed epoch.
    pub fn is_consistent(&self) -> bool {
        let n = self.epoch;
        self.train_loss.len() == n
            && self.val_loss.len() == n
            && self.train_acc.len() == n
            && self.val_acc.len() == n
    }

    /// Lowest validation loss recorded, or +inf when there is none.
    pub fn best_val_loss(&self) -> f64 {
        self.val_loss.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn save_csv(&self, path: &Path) -> Result<()> {
        let write = || -> std::io::Result<()> {
            let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
            writeln!(file, "epoch,train_loss,val_loss,train_acc,val_acc")?;
            for i in 0..self.len() {
                writeln!(
                    file,
                    "{},{:.6},{:.6},{:.2},{:.2}",
                    i + 1,
                    self.train_loss[i],
                    self.val_loss[i],
                    self.train_acc[i],
                    self.val_acc[i]
                )?;
            }
            file.flush()
        };
        write().map_err(|e| TrainError::io(path, e))?;
        info!("Training history saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn loss_is_weighted_by_batch_size_over_dataset_len() {
        let mut acc = PhaseAccumulator::new();
        acc.update(1.0, 3, 4);
        acc.update(0.5, 2, 2);
        // (1.0 * 4 + 0.5 * 2) / 6
        assert!((acc.average_loss(6) - 5.0 / 6.0).abs() < 1e-12);
        assert_eq!(acc.accuracy(), 83.33);
        assert_eq!(acc.num_batches(), 2);
        // the running figure is weighted too, not the 0.75 batch mean
        assert!((acc.running_loss() - 5.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn empty_phase_reports_zero() {
        let acc = PhaseAccumulator::new();
        assert_eq!(acc.average_loss(0), 0.0);
        assert_eq!(acc.accuracy(), 0.0);
        assert_eq!(acc.running_loss(), 0.0);
    }

    #[test]
    fn best_val_loss_defaults_to_infinity() {
        let mut history = MetricsHistory::new();
        assert!(history.best_val_loss().is_infinite());
        history.record(Phase::Val, 0.7, 50.0);
        history.record(Phase::Val, 0.4, 60.0);
        history.record(Phase::Val, 0.9, 55.0);
        assert_eq!(history.best_val_loss(), 0.4);
    }

    #[test]
    fn consistency_tracks_epoch_counter() {
        let mut history = MetricsHistory::new();
        for phase in Phase::ALL {
            history.record(phase, 1.0, 10.0);
        }
        assert!(!history.is_consistent());
        history.epoch = 1;
        assert!(history.is_consistent());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn csv_has_one_row_per_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let mut history = MetricsHistory::new();
        for epoch in 1..=2 {
            history.record(Phase::Train, 1.0 / epoch as f64, 40.0);
            history.record(Phase::Val, 2.0 / epoch as f64, 30.0);
            history.epoch = epoch;
        }
        history.save_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "epoch,train_loss,val_loss,train_acc,val_acc");
        assert!(lines[2].starts_with("2,0.500000,1.000000"));
    }

    proptest! {
        #[test]
        fn accuracy_stays_in_percent_range(
            batches in proptest::collection::vec((0usize..64, 1usize..64, 0.0f64..10.0), 1..20)
        ) {
            let mut acc = PhaseAccumulator::new();
            let mut len = 0;
            for (correct, size, loss) in batches {
                acc.update(loss, correct.min(size), size);
                len += size;
            }
            let pct = acc.accuracy();
            prop_assert!((0.0..=100.0).contains(&pct));
            let loss = acc.average_loss(len);
            prop_assert!(loss.is_finite() && loss >= 0.0);
        }
    }
}
