//! Default block hook: raw PCM to a byte stream.
//!
//! Blocks are written as interleaved signed 16-bit little-endian samples (s16le) and flushed
//! immediately, so `line-capture > capture.raw` yields a headerless raw file.

use std::io::{self, Write};

/// Writes captured blocks to `W` as s16le bytes.
pub struct PcmSink<W: Write> {
    out: W,
    scratch: Vec<u8>,
}

impl<W: Write> PcmSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            scratch: Vec::new(),
        }
    }

    /// Write the first `frames * channels` samples of `samples` and flush.
    pub fn process(&mut self, samples: &[i16], frames: usize, channels: u16) -> io::Result<()> {
        let count = (frames * usize::from(channels)).min(samples.len());
        if count == 0 {
            return Ok(());
        }
        encode_s16le(&samples[..count], &mut self.scratch);
        self.out.write_all(&self.scratch)?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Sink bound to the process's standard output.
pub fn stdout_sink() -> PcmSink<io::StdoutLock<'static>> {
    PcmSink::new(io::stdout().lock())
}

fn encode_s16le(samples: &[i16], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
}
