//! Capture runtime helpers.
//!
//! Provides device listing and the capture session used by the binary.

use std::io;

use anyhow::{Context, Result};

use crate::capture::{self, CaptureSummary};
use crate::config::CaptureConfig;
use crate::device::{self, Inventory, SelectionReason};
use crate::input;
use crate::shutdown::StopFlag;
use crate::sink;

/// Print every device the default host enumerates to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    let inventory = Inventory::scan(&host)?;
    tracing::info!(
        host = host.id().name(),
        count = inventory.infos.len(),
        "available audio devices"
    );
    let mut out = io::stdout().lock();
    device::write_listing(&mut out, &inventory.infos).context("write device listing")
}

/// Select a device, open it, and stream raw PCM to stdout until Ctrl+C or a fatal error.
pub fn run_capture(config: CaptureConfig) -> Result<CaptureSummary> {
    let stop = StopFlag::new();
    stop.install_ctrlc_handler()?;
    capture_to_stdout(config, &stop)
}

fn capture_to_stdout(config: CaptureConfig, stop: &StopFlag) -> Result<CaptureSummary> {
    config.validate()?;

    let host = cpal::default_host();
    let inventory = Inventory::scan(&host)?;
    let selection =
        device::select_device(config.device_index, &inventory.infos, inventory.default_input)?;
    let info = &inventory.infos[selection.index];
    match selection.reason {
        SelectionReason::Explicit => {
            tracing::info!(index = info.index, device = %info.name, "using requested device")
        }
        SelectionReason::NameMatch(needle) => tracing::info!(
            index = info.index,
            device = %info.name,
            matched = needle,
            "using line-in device"
        ),
        SelectionReason::SystemDefault => {
            tracing::info!(index = info.index, device = %info.name, "using default input device")
        }
    }

    let device = inventory
        .device(selection.index)
        .with_context(|| format!("Failed to get device info for index {}", selection.index))?;
    let mut capture = input::open_input(host, device, info, &config)?;
    let plan = capture.plan().clone();

    tracing::info!(
        device = %info.name,
        channels = plan.channels,
        rate_hz = plan.sample_rate_hz,
        frames_per_buffer = plan.frames_per_buffer,
        "capturing"
    );
    tracing::info!("press Ctrl+C to stop; raw PCM (s16le) is written to stdout");

    let mut sink = sink::stdout_sink();
    let summary = capture::run_session(
        &mut capture,
        plan.frames_per_buffer as usize,
        plan.channels,
        stop,
        |samples, frames, channels| {
            sink.process(samples, frames, channels)
                .context("write PCM to stdout")
        },
    );
    Ok(summary)
}
