//! Cooperative stop signal for the capture loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};

/// Process-wide stop request.
///
/// Written only by the interrupt handler (or tests), read by the capture loop once per
/// iteration. Never reset once set.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Route Ctrl+C (SIGINT) to [`StopFlag::request_stop`].
    ///
    /// Can only be installed once per process.
    pub fn install_ctrlc_handler(&self) -> Result<()> {
        let flag = self.clone();
        ctrlc::set_handler(move || flag.request_stop()).context("install Ctrl+C handler")
    }
}
