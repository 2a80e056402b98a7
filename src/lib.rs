//! Resumable training loop for burn sequence classifiers.
//!
//! A run is identified by its (model, optimizer, loss) kinds. Each epoch
//! trains then validates, appends to the metric history, redraws the
//! loss/accuracy curves and overwrites the run's checkpoint; the next run
//! with the same identity picks up where it left off.

pub mod data;
pub mod error;
pub mod model;
pub mod training;

pub use error::{Result, TrainError};
