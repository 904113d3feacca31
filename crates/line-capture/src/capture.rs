//! Blocking capture loop.
//!
//! The loop is written against [`CaptureBackend`] so it does not care whether blocks come from
//! CPAL ([`crate::input::CpalCapture`]) or a test double:
//! 1. check the stop flag (only ever between reads)
//! 2. blocking read of exactly one block into a reused buffer
//! 3. hand the block to the hook, synchronously, before the next read
//!
//! Overflows and timeouts are logged and skipped; any other read error ends the loop.
//! [`run_session`] always tears the backend down afterwards.

use anyhow::Result;
use thiserror::Error;

use crate::shutdown::StopFlag;

/// Failure of a single blocking read.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// Samples were dropped because reads fell behind the device.
    #[error("input overflow (samples dropped)")]
    Overflowed,
    /// No full block arrived within the backend's read timeout.
    #[error("read timed out")]
    TimedOut,
    #[error("input stream error: {0}")]
    Device(String),
}

impl ReadError {
    /// Whether the loop should log and keep reading.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Overflowed | Self::TimedOut)
    }
}

/// An opened input stream plus the subsystem that owns it.
pub trait CaptureBackend {
    /// Fill `block` with exactly `block.len()` interleaved samples, blocking until available.
    fn read_block(&mut self, block: &mut [i16]) -> Result<(), ReadError>;

    fn stop(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Release the audio subsystem.
    fn terminate(&mut self) -> Result<()>;
}

/// Why the loop ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopExit {
    Stopped,
    ReadFailed(ReadError),
    HookFailed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureSummary {
    /// Blocks handed to the hook.
    pub blocks: u64,
    pub overflows: u64,
    pub timeouts: u64,
    pub exit: LoopExit,
}

/// Read blocks of `frames` × `channels` samples until stopped or a fatal error.
///
/// `hook(samples, frames, channels)` sees a borrowed view of the reused buffer.
pub fn capture_loop<B, F>(
    backend: &mut B,
    frames: usize,
    channels: u16,
    stop: &StopFlag,
    mut hook: F,
) -> CaptureSummary
where
    B: CaptureBackend + ?Sized,
    F: FnMut(&[i16], usize, u16) -> Result<()>,
{
    let mut block = vec![0i16; frames * usize::from(channels)];
    let mut summary = CaptureSummary {
        blocks: 0,
        overflows: 0,
        timeouts: 0,
        exit: LoopExit::Stopped,
    };

    while !stop.is_stop_requested() {
        match backend.read_block(&mut block) {
            Ok(()) => {
                if let Err(e) = hook(&block[..], frames, channels) {
                    tracing::error!("block hook failed: {e:#}");
                    summary.exit = LoopExit::HookFailed(format!("{e:#}"));
                    break;
                }
                summary.blocks += 1;
            }
            Err(e) if e.is_recoverable() => {
                if e == ReadError::Overflowed {
                    summary.overflows += 1;
                } else {
                    summary.timeouts += 1;
                }
                tracing::warn!("{e}; continuing");
            }
            Err(e) => {
                tracing::error!("read error: {e}");
                summary.exit = LoopExit::ReadFailed(e);
                break;
            }
        }
    }

    summary
}

/// Run [`capture_loop`], then stop, close and terminate the backend.
///
/// Teardown runs exactly once whatever ended the loop; each step's failure is logged and the
/// next step still runs.
pub fn run_session<B, F>(
    backend: &mut B,
    frames: usize,
    channels: u16,
    stop: &StopFlag,
    hook: F,
) -> CaptureSummary
where
    B: CaptureBackend + ?Sized,
    F: FnMut(&[i16], usize, u16) -> Result<()>,
{
    let summary = capture_loop(backend, frames, channels, stop, hook);
    teardown(backend);
    summary
}

fn teardown<B: CaptureBackend + ?Sized>(backend: &mut B) {
    tracing::info!("stopping capture");
    if let Err(e) = backend.stop() {
        tracing::warn!("stop stream error: {e:#}");
    }
    if let Err(e) = backend.close() {
        tracing::warn!("close stream error: {e:#}");
    }
    if let Err(e) = backend.terminate() {
        tracing::warn!("terminate audio subsystem error: {e:#}");
    }
    tracing::info!("terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedBackend {
        script: VecDeque<Result<(), ReadError>>,
        reads: usize,
        stops: usize,
        closes: usize,
        terminates: usize,
        fail_stop: bool,
        fail_close: bool,
    }

    impl ScriptedBackend {
        fn new(script: impl IntoIterator<Item = Result<(), ReadError>>) -> Self {
            Self {
                script: script.into_iter().collect(),
                ..Self::default()
            }
        }
    }

    impl CaptureBackend for ScriptedBackend {
        fn read_block(&mut self, block: &mut [i16]) -> Result<(), ReadError> {
            self.reads += 1;
            let next = self
                .script
                .pop_front()
                .unwrap_or_else(|| Err(ReadError::Device("script exhausted".into())));
            if next.is_ok() {
                block.fill(self.reads as i16);
            }
            next
        }

        fn stop(&mut self) -> Result<()> {
            self.stops += 1;
            if self.fail_stop {
                return Err(anyhow!("device vanished"));
            }
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.closes += 1;
            if self.fail_close {
                return Err(anyhow!("already closed"));
            }
            Ok(())
        }

        fn terminate(&mut self) -> Result<()> {
            self.terminates += 1;
            Ok(())
        }
    }

    fn fatal() -> Result<(), ReadError> {
        Err(ReadError::Device("device unplugged".into()))
    }

    #[test]
    fn recoverable_errors_skip_hook_and_fatal_error_ends_loop() {
        let mut backend =
            ScriptedBackend::new([Ok(()), Err(ReadError::Overflowed), Ok(()), fatal()]);
        let mut seen = Vec::new();
        let summary = run_session(&mut backend, 4, 2, &StopFlag::new(), |samples, _, _| {
            seen.push(samples[0]);
            Ok(())
        });

        assert_eq!(seen, vec![1, 3]);
        assert_eq!(summary.blocks, 2);
        assert_eq!(summary.overflows, 1);
        assert_eq!(
            summary.exit,
            LoopExit::ReadFailed(ReadError::Device("device unplugged".into()))
        );
        assert_eq!(backend.reads, 4);
        assert_eq!(
            (backend.stops, backend.closes, backend.terminates),
            (1, 1, 1)
        );
    }

    #[test]
    fn timeouts_are_recoverable() {
        let mut backend = ScriptedBackend::new([
            Err(ReadError::TimedOut),
            Err(ReadError::TimedOut),
            Ok(()),
            fatal(),
        ]);
        let mut calls = 0;
        let summary = run_session(&mut backend, 1, 1, &StopFlag::new(), |_, _, _| {
            calls += 1;
            Ok(())
        });
        assert_eq!(calls, 1);
        assert_eq!(summary.timeouts, 2);
        assert!(matches!(summary.exit, LoopExit::ReadFailed(_)));
    }

    #[test]
    fn stop_requested_in_hook_halts_before_next_read() {
        let mut backend = ScriptedBackend::new([Ok(()), Ok(()), Ok(())]);
        let stop = StopFlag::new();
        let signal = stop.clone();
        let mut calls = 0;
        let summary = run_session(&mut backend, 8, 1, &stop, |_, _, _| {
            signal.request_stop();
            calls += 1;
            Ok(())
        });

        assert_eq!(calls, 1);
        assert_eq!(backend.reads, 1);
        assert_eq!(summary.blocks, 1);
        assert_eq!(summary.exit, LoopExit::Stopped);
        assert_eq!(
            (backend.stops, backend.closes, backend.terminates),
            (1, 1, 1)
        );
    }

    #[test]
    fn stop_before_start_reads_nothing() {
        let mut backend = ScriptedBackend::new([Ok(())]);
        let stop = StopFlag::new();
        stop.request_stop();
        let summary = run_session(&mut backend, 8, 1, &stop, |_, _, _| Ok(()));
        assert_eq!(backend.reads, 0);
        assert_eq!(summary.blocks, 0);
        assert_eq!(backend.terminates, 1);
    }

    #[test]
    fn hook_receives_full_block_shape() {
        let mut backend = ScriptedBackend::new([Ok(()), fatal()]);
        let mut shape = None;
        run_session(&mut backend, 256, 2, &StopFlag::new(), |samples, frames, channels| {
            shape = Some((samples.len(), frames, channels));
            Ok(())
        });
        assert_eq!(shape, Some((512, 256, 2)));
    }

    #[test]
    fn hook_error_ends_loop_and_still_tears_down() {
        let mut backend = ScriptedBackend::new([Ok(()), Ok(())]);
        let summary = run_session(&mut backend, 1, 1, &StopFlag::new(), |_, _, _| {
            Err(anyhow!("broken pipe"))
        });
        assert_eq!(summary.exit, LoopExit::HookFailed("broken pipe".into()));
        assert_eq!(summary.blocks, 0);
        assert_eq!(backend.reads, 1);
        assert_eq!(
            (backend.stops, backend.closes, backend.terminates),
            (1, 1, 1)
        );
    }

    #[test]
    fn teardown_failures_do_not_skip_later_steps() {
        let mut backend = ScriptedBackend::new([fatal()]);
        backend.fail_stop = true;
        backend.fail_close = true;
        run_session(&mut backend, 1, 1, &StopFlag::new(), |_, _, _| Ok(()));
        assert_eq!(
            (backend.stops, backend.closes, backend.terminates),
            (1, 1, 1)
        );
    }

    #[test]
    fn only_overflow_and_timeout_are_recoverable() {
        assert!(ReadError::Overflowed.is_recoverable());
        assert!(ReadError::TimedOut.is_recoverable());
        assert!(!ReadError::Device("x".into()).is_recoverable());
    }
}
