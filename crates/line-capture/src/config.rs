//! Capture configuration built from the CLI.

use std::time::Duration;

use anyhow::{Result, bail};

use crate::cli::Args;

/// Lower bound for the blocking read timeout.
const MIN_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Read timeout expressed in blocks; a read that takes this many block durations is a timeout.
const READ_TIMEOUT_BLOCKS: u32 = 4;

/// Largest block (frames × channels) a single read may ask for: 32 MiB of `i16` samples.
pub const MAX_BLOCK_SAMPLES: u64 = 16 * 1024 * 1024;

/// What to capture and from where.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureConfig {
    /// Frames per blocking read.
    pub frames_per_buffer: u32,
    /// Requested channel count; may be reduced to the device maximum when the stream opens.
    pub channels: u16,
    /// Requested sample rate in Hz.
    pub sample_rate: f64,
    /// Explicit device index; `None` means line-in heuristic, then system default.
    pub device_index: Option<i64>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frames_per_buffer: 4096,
            channels: 2,
            sample_rate: 44_100.0,
            device_index: None,
        }
    }
}

impl CaptureConfig {
    /// Reject values no device could be opened with.
    pub fn validate(&self) -> Result<()> {
        if self.frames_per_buffer == 0 {
            bail!("frames per buffer must be greater than zero");
        }
        if self.channels == 0 {
            bail!("channel count must be greater than zero");
        }
        let block_samples = u64::from(self.frames_per_buffer) * u64::from(self.channels);
        if block_samples > MAX_BLOCK_SAMPLES {
            bail!(
                "block of {} frames x {} channels exceeds the {MAX_BLOCK_SAMPLES}-sample limit",
                self.frames_per_buffer,
                self.channels
            );
        }
        if !self.sample_rate.is_finite()
            || self.sample_rate < 1.0
            || self.sample_rate > f64::from(u32::MAX)
        {
            bail!("invalid sample rate: {}", self.sample_rate);
        }
        Ok(())
    }

    /// Sample rate rounded to whole Hz, as the audio backend takes it.
    pub fn sample_rate_hz(&self) -> u32 {
        let hz = self.sample_rate.round();
        if hz != self.sample_rate {
            tracing::warn!(
                requested = self.sample_rate,
                using = hz,
                "sample rate rounded to whole Hz"
            );
        }
        hz as u32
    }

    /// How long a blocking read may wait for a full block before reporting a timeout.
    pub fn read_timeout(&self) -> Duration {
        let block = Duration::from_secs_f64(f64::from(self.frames_per_buffer) / self.sample_rate);
        (block * READ_TIMEOUT_BLOCKS).max(MIN_READ_TIMEOUT)
    }
}

impl TryFrom<&Args> for CaptureConfig {
    type Error = anyhow::Error;

    fn try_from(args: &Args) -> Result<Self> {
        let config = Self {
            frames_per_buffer: args.frames_per_buffer,
            channels: args.channels,
            sample_rate: args.sample_rate,
            device_index: args.device,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn default_config_is_valid() {
        let config = CaptureConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sample_rate_hz(), 44_100);
    }

    #[test]
    fn from_args_copies_fields() {
        let args = Args::try_parse_from(["line-capture", "2048", "1", "48000", "--device", "3"])
            .unwrap();
        let config = CaptureConfig::try_from(&args).unwrap();
        assert_eq!(
            config,
            CaptureConfig {
                frames_per_buffer: 2048,
                channels: 1,
                sample_rate: 48_000.0,
                device_index: Some(3),
            }
        );
    }

    #[test]
    fn rejects_zero_sizes() {
        let args = Args::try_parse_from(["line-capture", "0"]).unwrap();
        assert!(CaptureConfig::try_from(&args).is_err());
        let args = Args::try_parse_from(["line-capture", "4096", "0"]).unwrap();
        assert!(CaptureConfig::try_from(&args).is_err());
    }

    #[test]
    fn rejects_oversized_blocks() {
        let args = Args::try_parse_from(["line-capture", "4000000000"]).unwrap();
        assert!(CaptureConfig::try_from(&args).is_err());

        let at_limit = CaptureConfig {
            frames_per_buffer: (MAX_BLOCK_SAMPLES / 2) as u32,
            channels: 2,
            ..CaptureConfig::default()
        };
        at_limit.validate().unwrap();
        let over = CaptureConfig {
            channels: 3,
            ..at_limit
        };
        assert!(over.validate().is_err());
    }

    #[test]
    fn rejects_unusable_sample_rates() {
        for rate in [0.0, 0.5, f64::NAN, f64::INFINITY, 1e12] {
            let config = CaptureConfig {
                sample_rate: rate,
                ..CaptureConfig::default()
            };
            assert!(config.validate().is_err(), "rate {rate} accepted");
        }
    }

    #[test]
    fn fractional_rate_rounds() {
        let config = CaptureConfig {
            sample_rate: 22_050.4,
            ..CaptureConfig::default()
        };
        assert_eq!(config.sample_rate_hz(), 22_050);
    }

    #[test]
    fn read_timeout_scales_with_block_duration() {
        let small = CaptureConfig {
            frames_per_buffer: 256,
            ..CaptureConfig::default()
        };
        assert_eq!(small.read_timeout(), MIN_READ_TIMEOUT);

        let large = CaptureConfig {
            frames_per_buffer: 48_000,
            sample_rate: 48_000.0,
            ..CaptureConfig::default()
        };
        assert_eq!(large.read_timeout(), Duration::from_secs(4));
    }
}
