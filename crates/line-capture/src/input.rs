//! Input stage (CPAL input stream) exposed as a blocking reader.
//!
//! CPAL delivers audio through a real-time callback. The callback here:
//! - converts samples from the device format to `i16`
//! - hands them to the reader through a bounded channel without blocking
//! - drops the packet and raises an overflow flag when the reader has fallen behind
//! - reuses packet buffers handed back by the reader, so steady-state capture does not allocate
//!
//! Stream errors are sorted by [`StreamFaults`]: device overruns become overflows, lost devices
//! end the capture, anything else is logged.
//!
//! [`CpalCapture`] reassembles packets into exact-size blocks for
//! [`crate::capture::capture_loop`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::capture::{CaptureBackend, ReadError};
use crate::config::CaptureConfig;
use crate::device::{self, DeviceInfo};

/// Callback packets buffered between the CPAL thread and the reader.
const QUEUE_DEPTH_PACKETS: usize = 256;

/// Capacity reserved up front for each pooled packet; larger callbacks grow a packet once.
const PACKET_PREALLOC_SAMPLES: usize = 16_384;

/// Stream parameters after reconciling the request with the device.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamPlan {
    pub channels: u16,
    pub sample_rate_hz: u32,
    pub frames_per_buffer: u32,
    pub read_timeout: Duration,
}

/// Reconcile `config` with the device: clamp channels, settle the rate, derive the timeout.
pub fn plan_stream(config: &CaptureConfig, info: &DeviceInfo) -> Result<StreamPlan> {
    config.validate()?;
    Ok(StreamPlan {
        channels: device::clamp_channels(config.channels, info)?,
        sample_rate_hz: config.sample_rate_hz(),
        frames_per_buffer: config.frames_per_buffer,
        read_timeout: config.read_timeout(),
    })
}

/// Open and start a blocking-read input stream on `device`.
///
/// Takes ownership of `host` so that [`CaptureBackend::terminate`] can release it.
pub fn open_input(
    host: cpal::Host,
    device: &cpal::Device,
    info: &DeviceInfo,
    config: &CaptureConfig,
) -> Result<CpalCapture> {
    let plan = plan_stream(config, info)?;
    let sample_format = pick_sample_format(device, &plan)?;
    let mut stream_config = cpal::StreamConfig {
        channels: plan.channels,
        sample_rate: plan.sample_rate_hz,
        buffer_size: cpal::BufferSize::Default,
    };
    if let Some(buf) = pick_buffer_size(device, &plan, sample_format) {
        stream_config.buffer_size = buf;
    }
    tracing::info!(
        device = %info.name,
        channels = plan.channels,
        rate_hz = plan.sample_rate_hz,
        frames_per_buffer = plan.frames_per_buffer,
        sample_format = ?sample_format,
        buffer_size = ?stream_config.buffer_size,
        "opening input stream"
    );

    let block_samples = plan.frames_per_buffer as usize * usize::from(plan.channels);
    let (writer, faults, reader) = packet_channel(
        QUEUE_DEPTH_PACKETS,
        block_samples.min(PACKET_PREALLOC_SAMPLES),
        plan.read_timeout,
    );
    let stream = match sample_format {
        cpal::SampleFormat::I16 => build_stream::<i16>(device, &stream_config, writer, faults),
        cpal::SampleFormat::F32 => build_stream::<f32>(device, &stream_config, writer, faults),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, &stream_config, writer, faults),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, &stream_config, writer, faults),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
    .with_context(|| format!("open input stream on {}", info.name))?;

    stream.play().context("start input stream")?;

    Ok(CpalCapture {
        host: Some(host),
        stream: Some(stream),
        reader,
        plan,
    })
}

/// A started CPAL input stream read one block at a time.
pub struct CpalCapture {
    host: Option<cpal::Host>,
    stream: Option<cpal::Stream>,
    reader: PacketReader,
    plan: StreamPlan,
}

impl CpalCapture {
    /// Parameters the stream was actually opened with.
    pub fn plan(&self) -> &StreamPlan {
        &self.plan
    }
}

impl CaptureBackend for CpalCapture {
    fn read_block(&mut self, block: &mut [i16]) -> Result<(), ReadError> {
        self.reader.read_block(block)
    }

    fn stop(&mut self) -> Result<()> {
        match &self.stream {
            Some(stream) => stream.pause().context("pause input stream"),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        drop(self.stream.take());
        Ok(())
    }

    fn terminate(&mut self) -> Result<()> {
        drop(self.host.take());
        Ok(())
    }
}

/// Type-specialized stream builder for CPAL sample formats.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    writer: PacketWriter,
    faults: StreamFaults,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample,
    i16: cpal::FromSample<T>,
{
    let err_fn = move |err: cpal::StreamError| faults.report(&err);

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| writer.push(data),
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Prefer native `i16`; otherwise the best-ranked format that fits the plan, else the default.
fn pick_sample_format(device: &cpal::Device, plan: &StreamPlan) -> Result<cpal::SampleFormat> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_input_configs()
        .context("query supported input configs")?
        .collect();

    let best = ranges
        .iter()
        .filter(|r| range_fits(r, plan))
        .map(|r| r.sample_format())
        .min_by_key(|f| sample_format_rank(*f));
    if let Some(format) = best {
        return Ok(format);
    }

    let default = device
        .default_input_config()
        .context("query default input config")?;
    Ok(default.sample_format())
}

/// Use `frames_per_buffer` as the device buffer when the device accepts it.
///
/// Returns `None` (device default, i.e. its low input latency) otherwise.
fn pick_buffer_size(
    device: &cpal::Device,
    plan: &StreamPlan,
    format: cpal::SampleFormat,
) -> Option<cpal::BufferSize> {
    let ranges = device.supported_input_configs().ok()?;
    for range in ranges {
        if range.sample_format() != format || !range_fits(&range, plan) {
            continue;
        }
        if let cpal::SupportedBufferSize::Range { min, max } = range.buffer_size() {
            if (*min..=*max).contains(&plan.frames_per_buffer) {
                return Some(cpal::BufferSize::Fixed(plan.frames_per_buffer));
            }
        }
    }
    None
}

fn range_fits(range: &cpal::SupportedStreamConfigRange, plan: &StreamPlan) -> bool {
    range.channels() == plan.channels
        && range.min_sample_rate() <= plan.sample_rate_hz
        && plan.sample_rate_hz <= range.max_sample_rate()
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::I16 => 0,
        cpal::SampleFormat::F32 => 1,
        cpal::SampleFormat::I32 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn packet_channel(
    depth: usize,
    packet_capacity: usize,
    read_timeout: Duration,
) -> (PacketWriter, StreamFaults, PacketReader) {
    let (data_tx, data_rx) = crossbeam_channel::bounded(depth);
    let (free_tx, free_rx) = crossbeam_channel::bounded(depth);
    let (fault_tx, fault_rx) = crossbeam_channel::bounded(1);
    let overflowed = Arc::new(AtomicBool::new(false));
    for _ in 0..depth {
        let _ = free_tx.try_send(Vec::with_capacity(packet_capacity));
    }
    (
        PacketWriter {
            data_tx,
            free_tx: free_tx.clone(),
            free_rx,
            overflowed: overflowed.clone(),
        },
        StreamFaults {
            fault_tx,
            overflowed: overflowed.clone(),
        },
        PacketReader {
            data_rx,
            free_tx,
            fault_rx,
            overflowed,
            pending: VecDeque::with_capacity(packet_capacity * 2),
            read_timeout,
        },
    )
}

/// Callback side of the hand-off. Never blocks.
struct PacketWriter {
    data_tx: Sender<Vec<i16>>,
    /// Returns a packet to the pool when the data channel is full.
    free_tx: Sender<Vec<i16>>,
    /// Empty packets handed back by the reader.
    free_rx: Receiver<Vec<i16>>,
    overflowed: Arc<AtomicBool>,
}

impl PacketWriter {
    fn push<T>(&self, data: &[T])
    where
        T: cpal::Sample,
        i16: cpal::FromSample<T>,
    {
        // Only allocates when every pooled packet is in flight.
        let mut packet = self.free_rx.try_recv().unwrap_or_default();
        packet.clear();
        packet.extend(
            data.iter()
                .map(|&s| <i16 as cpal::Sample>::from_sample::<T>(s)),
        );
        if let Err(TrySendError::Full(packet)) = self.data_tx.try_send(packet) {
            self.overflowed.store(true, Ordering::Release);
            let _ = self.free_tx.try_send(packet);
        }
    }
}

/// What a CPAL stream error means for the reader.
#[derive(Clone, Debug, PartialEq, Eq)]
enum FaultAction {
    /// The device dropped samples; surfaces as [`ReadError::Overflowed`].
    Overflow,
    /// The stream is gone; surfaces as [`ReadError::Device`].
    Fatal(String),
    /// Transient backend hiccup; the stream keeps running.
    Ignore,
}

fn classify_stream_error(err: &cpal::StreamError) -> FaultAction {
    match err {
        cpal::StreamError::BufferUnderrun => FaultAction::Overflow,
        cpal::StreamError::DeviceNotAvailable | cpal::StreamError::StreamInvalidated => {
            FaultAction::Fatal(err.to_string())
        }
        _ => FaultAction::Ignore,
    }
}

/// Error-callback side of the hand-off.
struct StreamFaults {
    fault_tx: Sender<String>,
    overflowed: Arc<AtomicBool>,
}

impl StreamFaults {
    fn report(&self, err: &cpal::StreamError) {
        match classify_stream_error(err) {
            FaultAction::Overflow => {
                tracing::warn!("input stream overrun: {err}");
                self.overflowed.store(true, Ordering::Release);
            }
            FaultAction::Fatal(msg) => {
                tracing::error!("input stream error: {msg}");
                let _ = self.fault_tx.try_send(msg);
            }
            FaultAction::Ignore => tracing::warn!("input stream error: {err}"),
        }
    }
}

/// Reader side: reassembles callback packets into exact-size blocks.
struct PacketReader {
    data_rx: Receiver<Vec<i16>>,
    free_tx: Sender<Vec<i16>>,
    fault_rx: Receiver<String>,
    overflowed: Arc<AtomicBool>,
    /// Samples received but not yet returned; survives timeouts.
    pending: VecDeque<i16>,
    read_timeout: Duration,
}

impl PacketReader {
    fn read_block(&mut self, block: &mut [i16]) -> Result<(), ReadError> {
        let data_rx = &self.data_rx;
        let free_tx = &self.free_tx;
        let fault_rx = &self.fault_rx;
        let pending = &mut self.pending;
        let deadline = Instant::now() + self.read_timeout;

        while pending.len() < block.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            crossbeam_channel::select! {
                recv(fault_rx) -> fault => {
                    let msg = fault.unwrap_or_else(|_| "input stream closed".to_string());
                    return Err(ReadError::Device(msg));
                },
                recv(data_rx) -> packet => match packet {
                    Ok(mut packet) => {
                        pending.extend(packet.drain(..));
                        let _ = free_tx.try_send(packet);
                    }
                    Err(_) => return Err(ReadError::Device("input stream closed".to_string())),
                },
                default(remaining) => return Err(ReadError::TimedOut),
            }
        }

        let want = block.len();
        for (dst, src) in block.iter_mut().zip(pending.drain(..want)) {
            *dst = src;
        }

        if self.overflowed.swap(false, Ordering::AcqRel) {
            return Err(ReadError::Overflowed);
        }
        Ok(())
    }
}
