use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::warn;

use crate::error::Result;

/// Shared stop flag, raised by Ctrl-C or by the caller.
///
/// The training loop checks it before every batch; once raised it stays
/// raised.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    raised: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a signal that is raised on SIGINT/SIGTERM.
    ///
    /// Only one handler can be installed per process.
    pub fn install_ctrlc() -> Result<Self> {
        let signal = Self::new();
        let handle = signal.clone();
        ctrlc::set_handler(move || {
            warn!("Interrupt received, stopping after the current batch");
            handle.raise();
        })?;
        Ok(signal)
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}
