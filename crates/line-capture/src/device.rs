//! Input device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - snapshotting every device the host enumerates, with its input capabilities
//! - printing that snapshot for `--list-devices`
//! - choosing a device: explicit index, a "line in" name match, or the system default

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use cpal::traits::{DeviceTrait, HostTrait};

/// Lower-cased name fragments that mark a device as a line-level input.
pub const LINE_IN_NEEDLES: &[&str] = &["line", "line in", "line-in", "stereo mix"];

/// Read-only description of one enumerated device.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub host_api: String,
    pub max_input_channels: u16,
    pub default_sample_rate: Option<u32>,
    /// Smallest buffer the device reports at its default rate, as a duration.
    pub default_low_input_latency: Option<Duration>,
}

impl DeviceInfo {
    pub fn has_input(&self) -> bool {
        self.max_input_channels > 0
    }
}

/// Why a device was chosen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionReason {
    Explicit,
    /// Name contained this fragment of [`LINE_IN_NEEDLES`].
    NameMatch(&'static str),
    SystemDefault,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    pub reason: SelectionReason,
}

/// Resolve the device to capture from.
///
/// - `explicit`: must name an existing device with at least one input channel.
/// - otherwise the first device (by index) whose name matches [`LINE_IN_NEEDLES`] and has inputs.
/// - otherwise `default_input`, the host's default input device.
pub fn select_device(
    explicit: Option<i64>,
    devices: &[DeviceInfo],
    default_input: Option<usize>,
) -> Result<Selection> {
    if let Some(requested) = explicit {
        let info = usize::try_from(requested)
            .ok()
            .and_then(|i| devices.get(i))
            .ok_or_else(|| anyhow!("Invalid device index: {requested}"))?;
        if !info.has_input() {
            bail!("Selected device {requested} ({}) has no input channels", info.name);
        }
        return Ok(Selection {
            index: info.index,
            reason: SelectionReason::Explicit,
        });
    }

    if let Some((index, needle)) = find_line_in_device(devices) {
        return Ok(Selection {
            index,
            reason: SelectionReason::NameMatch(needle),
        });
    }

    match default_input {
        Some(index) if index < devices.len() => Ok(Selection {
            index,
            reason: SelectionReason::SystemDefault,
        }),
        _ => Err(anyhow!("No default input device")),
    }
}

/// First input-capable device whose name contains a line-in fragment (case-insensitive).
pub fn find_line_in_device(devices: &[DeviceInfo]) -> Option<(usize, &'static str)> {
    devices.iter().filter(|d| d.has_input()).find_map(|d| {
        let name = d.name.to_lowercase();
        LINE_IN_NEEDLES
            .iter()
            .find(|needle| name.contains(*needle))
            .map(|needle| (d.index, *needle))
    })
}

/// Reduce `requested` to what the device can deliver.
///
/// Logs a warning when clamping; errors when the device has no input channels at all.
pub fn clamp_channels(requested: u16, info: &DeviceInfo) -> Result<u16> {
    if !info.has_input() {
        bail!("No input channels available on {}", info.name);
    }
    if requested > info.max_input_channels {
        tracing::warn!(
            device = %info.name,
            requested,
            max = info.max_input_channels,
            "device supports fewer input channels than requested; reducing"
        );
        return Ok(info.max_input_channels);
    }
    Ok(requested)
}

/// Write one line per device: index, name, host API, input channels, default rate.
pub fn write_listing(out: &mut impl Write, devices: &[DeviceInfo]) -> io::Result<()> {
    for d in devices {
        let rate = d
            .default_sample_rate
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        write!(
            out,
            "Index {}: {} (hostApi = {}) maxInputChannels={} defaultSampleRate={}",
            d.index, d.name, d.host_api, d.max_input_channels, rate
        )?;
        if let Some(latency) = d.default_low_input_latency {
            write!(out, " defaultLowInputLatency={:.4}s", latency.as_secs_f64())?;
        }
        writeln!(out)?;
    }
    out.flush()
}

/// Snapshot of the host's devices, index-aligned with [`DeviceInfo::index`].
pub struct Inventory {
    devices: Vec<cpal::Device>,
    pub infos: Vec<DeviceInfo>,
    /// Index of the host default input device, if it has one.
    pub default_input: Option<usize>,
}

impl Inventory {
    /// Enumerate every device of `host` (input and output alike, so indices are stable).
    pub fn scan(host: &cpal::Host) -> Result<Self> {
        let host_api = host.id().name().to_string();
        let mut devices: Vec<cpal::Device> =
            host.devices().context("enumerate audio devices")?.collect();

        let default_input = match host.default_input_device() {
            Some(default) => {
                let key = device_key(&default);
                match devices.iter().position(|d| device_key(d) == key) {
                    Some(index) => Some(index),
                    None => {
                        devices.push(default);
                        Some(devices.len() - 1)
                    }
                }
            }
            None => None,
        };

        let infos = devices
            .iter()
            .enumerate()
            .map(|(index, d)| describe(index, &host_api, d))
            .collect();

        Ok(Self {
            devices,
            infos,
            default_input,
        })
    }

    pub fn device(&self, index: usize) -> Option<&cpal::Device> {
        self.devices.get(index)
    }
}

fn device_key(device: &cpal::Device) -> Option<String> {
    if let Ok(id) = device.id() {
        return Some(id.to_string());
    }
    device.description().ok().map(|d| d.to_string())
}

fn describe(index: usize, host_api: &str, device: &cpal::Device) -> DeviceInfo {
    let name = device
        .description()
        .map(|d| d.name().to_string())
        .unwrap_or_else(|_| format!("device #{index}"));

    let max_input_channels = device
        .supported_input_configs()
        .map(|ranges| ranges.map(|r| r.channels()).max().unwrap_or(0))
        .unwrap_or(0);

    let (default_sample_rate, default_low_input_latency) = match device.default_input_config() {
        Ok(cfg) => {
            let rate = cfg.sample_rate();
            let latency = match cfg.buffer_size() {
                cpal::SupportedBufferSize::Range { min, .. } if rate > 0 => {
                    Some(Duration::from_secs_f64(f64::from(*min) / f64::from(rate)))
                }
                _ => None,
            };
            (Some(rate), latency)
        }
        Err(_) => (None, None),
    };

    DeviceInfo {
        index,
        name,
        host_api: host_api.to_string(),
        max_input_channels,
        default_sample_rate,
        default_low_input_latency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(index: usize, name: &str, inputs: u16) -> DeviceInfo {
        DeviceInfo {
            index,
            name: name.to_string(),
            host_api: "ALSA".to_string(),
            max_input_channels: inputs,
            default_sample_rate: Some(44_100),
            default_low_input_latency: None,
        }
    }

    fn sample_devices() -> Vec<DeviceInfo> {
        vec![
            info(0, "Speakers (Realtek)", 0),
            info(1, "Microphone Array", 2),
            info(2, "Line In (Realtek)", 2),
            info(3, "USB Audio", 1),
        ]
    }

    #[test]
    fn explicit_index_out_of_range_fails() {
        let devices = sample_devices();
        let err = select_device(Some(9), &devices, Some(1)).unwrap_err();
        assert!(err.to_string().contains("Invalid device index: 9"));
        assert!(select_device(Some(-1), &devices, Some(1)).is_err());
    }

    #[test]
    fn explicit_index_without_inputs_fails() {
        let devices = sample_devices();
        let err = select_device(Some(0), &devices, Some(1)).unwrap_err();
        assert!(err.to_string().contains("no input channels"));
    }

    #[test]
    fn explicit_index_wins_over_heuristics() {
        let devices = sample_devices();
        let selection = select_device(Some(3), &devices, Some(1)).unwrap();
        assert_eq!(
            selection,
            Selection {
                index: 3,
                reason: SelectionReason::Explicit
            }
        );
    }

    #[test]
    fn line_in_name_beats_system_default() {
        let devices = sample_devices();
        let selection = select_device(None, &devices, Some(1)).unwrap();
        assert_eq!(selection.index, 2);
        assert_eq!(selection.reason, SelectionReason::NameMatch("line"));
    }

    #[test]
    fn line_in_match_requires_inputs() {
        let devices = vec![
            info(0, "Line Out", 0),
            info(1, "Mic", 1),
            info(2, "Stereo Mix (Realtek)", 2),
        ];
        let selection = select_device(None, &devices, Some(1)).unwrap();
        assert_eq!(selection.index, 2);
        assert_eq!(selection.reason, SelectionReason::NameMatch("stereo mix"));
    }

    #[test]
    fn falls_back_to_system_default() {
        let devices = vec![info(0, "Speakers", 0), info(1, "Mic", 1)];
        let selection = select_device(None, &devices, Some(1)).unwrap();
        assert_eq!(
            selection,
            Selection {
                index: 1,
                reason: SelectionReason::SystemDefault
            }
        );
    }

    #[test]
    fn no_default_input_is_an_error() {
        let devices = vec![info(0, "Speakers", 0)];
        let err = select_device(None, &devices, None).unwrap_err();
        assert_eq!(err.to_string(), "No default input device");
    }

    #[test]
    fn clamp_reduces_to_device_maximum() {
        let dev = info(0, "Line In", 2);
        assert_eq!(clamp_channels(4, &dev).unwrap(), 2);
        assert_eq!(clamp_channels(2, &dev).unwrap(), 2);
        assert_eq!(clamp_channels(1, &dev).unwrap(), 1);
    }

    /// Run `f` with a subscriber that records formatted events; returns `f`'s value and the log.
    fn with_captured_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Captured(Arc<Mutex<Vec<u8>>>);

        impl Write for Captured {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        let value = tracing::subscriber::with_default(subscriber, f);
        let log = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        (value, log)
    }

    #[test]
    fn clamp_logs_a_warning_only_when_reducing() {
        let dev = info(0, "Line In", 2);

        let (channels, log) = with_captured_logs(|| clamp_channels(6, &dev).unwrap());
        assert_eq!(channels, 2);
        assert!(log.contains("WARN"), "{log}");
        assert!(log.contains("fewer input channels than requested"), "{log}");
        assert!(log.contains("requested=6"), "{log}");

        let (channels, log) = with_captured_logs(|| clamp_channels(2, &dev).unwrap());
        assert_eq!(channels, 2);
        assert!(log.is_empty(), "{log}");
    }

    #[test]
    fn clamp_fails_without_inputs() {
        assert!(clamp_channels(2, &info(0, "Speakers", 0)).is_err());
    }

    #[test]
    fn listing_has_one_line_per_device() {
        let mut devices = sample_devices();
        devices[3].default_sample_rate = None;
        devices[2].default_low_input_latency = Some(Duration::from_millis(10));

        let mut out = Vec::new();
        write_listing(&mut out, &devices).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "Index 0: Speakers (Realtek) (hostApi = ALSA) maxInputChannels=0 defaultSampleRate=44100"
        );
        assert!(lines[2].ends_with("defaultLowInputLatency=0.0100s"));
        assert!(lines[3].ends_with("defaultSampleRate=unknown"));
    }
}
