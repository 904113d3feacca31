//! Line Capture — a small CLI utility that opens an input device (line-in when one can be
//! found by name, otherwise the system default) and writes raw PCM to stdout.
//!
//! ## Pipeline
//! 1. **Input**: the CPAL callback converts samples to `i16` and queues them without blocking.
//! 2. **Capture loop**: the main thread performs blocking reads of exactly one block.
//! 3. **Hook**: each block is written to stdout as s16le bytes and flushed.
//!
//! Logs go to stderr, so `line-capture > capture.raw` produces a clean raw stream.

use anyhow::Result;
use line_capture::{cli, config::CaptureConfig, runtime};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,line_capture=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = match cli::parse_lenient(std::env::args_os()) {
        Ok(args) => args,
        Err(err) if !err.use_stderr() => err.exit(),
        Err(err) => return Err(err.into()),
    };

    if args.list_devices {
        return runtime::list_devices();
    }

    let config = CaptureConfig::try_from(&args)?;
    let summary = runtime::run_capture(config)?;
    tracing::info!(
        blocks = summary.blocks,
        overflows = summary.overflows,
        timeouts = summary.timeouts,
        exit = ?summary.exit,
        "capture finished"
    );
    Ok(())
}
