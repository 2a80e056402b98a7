use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Names the (model, optimizer, loss) combination a run belongs to.
///
/// Every checkpoint and curve file is namespaced by this triple, so two runs
/// with the same identity share (and resume) the same state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunIdentity {
    pub model_kind: String,
    pub optimizer_kind: String,
    pub loss_kind: String,
}

impl RunIdentity {
    pub fn new(
        model_kind: impl Into<String>,
        optimizer_kind: impl Into<String>,
        loss_kind: impl Into<String>,
    ) -> Self {
        Self {
            model_kind: model_kind.into(),
            optimizer_kind: optimizer_kind.into(),
            loss_kind: loss_kind.into(),
        }
    }

    /// `state-{model}-optimizer-{optimizer}-loss-{loss}.pth`
    pub fn checkpoint_file_name(&self) -> String {
        format!(
            "state-{}-optimizer-{}-loss-{}.pth",
            self.model_kind, self.optimizer_kind, self.loss_kind
        )
    }

    /// `{prefix}_{model}-{optimizer}_{loss}.jpg`
    pub fn curve_file_name(&self, prefix: &str) -> String {
        format!(
            "{}_{}-{}_{}.jpg",
            prefix, self.model_kind, self.optimizer_kind, self.loss_kind
        )
    }

    pub fn checkpoint_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.checkpoint_file_name())
    }
}

impl Default for RunIdentity {
    fn default() -> Self {
        Self::new("TextClassifier", "Adam", "CrossEntropy")
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.model_kind, self.optimizer_kind, self.loss_kind
        )
    }
}
