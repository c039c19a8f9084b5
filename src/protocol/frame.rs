//! Binary frame codec for the data ports
//!
//! Wire layout of one frame: `channels * samples` little-endian f32 values,
//! sample-major, no header and no delimiter:
//!
//! ```text
//! [ s0c0 s0c1 .. s0cN | s1c0 s1c1 .. s1cN | ... ]
//! ```
//!
//! Every consumer wants channel rows, so decoding transposes into a
//! channel-major matrix stored flat (`values[c * samples + s]`). Framing is
//! purely length-based: the byte count must be a positive multiple of
//! `channels * 4`, anything else means the stream lost frame alignment.

use crate::error::{Error, Result};
use crate::protocol::{StreamKind, BYTES_PER_VALUE};

/// One decoded batch of samples across all channels of a stream
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    kind: StreamKind,
    start_sample: u64,
    channels: usize,
    samples: usize,
    values: Vec<f32>,
}

impl DataFrame {
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Logical index of this frame's first sample within its stream
    pub fn start_sample(&self) -> u64 {
        self.start_sample
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Flat channel-major values, `channels * samples` long
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// All samples of one channel
    pub fn row(&self, channel: usize) -> &[f32] {
        &self.values[channel * self.samples..(channel + 1) * self.samples]
    }

    /// Contiguous view of channel rows `[lo, hi)`, or `None` if the range
    /// does not fit this frame
    pub fn row_span(&self, lo: usize, hi: usize) -> Option<&[f32]> {
        if lo > hi || hi > self.channels {
            return None;
        }
        Some(&self.values[lo * self.samples..hi * self.samples])
    }
}

/// Decode one wire frame into a channel-major matrix
///
/// `bytes` must hold `kind.total_channels() * samples * 4` bytes for some
/// `samples >= 1`; fails with [`Error::Framing`] otherwise. The output is
/// pre-sized from the known dimensions, so decoding never reallocates.
pub fn decode_frame(kind: StreamKind, start_sample: u64, bytes: &[u8]) -> Result<DataFrame> {
    let channels = kind.total_channels();
    let stride = channels * BYTES_PER_VALUE;
    if bytes.is_empty() || bytes.len() % stride != 0 {
        return Err(Error::Framing {
            len: bytes.len(),
            channels,
        });
    }

    let samples = bytes.len() / stride;
    let mut values = vec![0.0f32; channels * samples];
    for (i, chunk) in bytes.chunks_exact(BYTES_PER_VALUE).enumerate() {
        let s = i / channels;
        let c = i % channels;
        values[c * samples + s] = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }

    Ok(DataFrame {
        kind,
        start_sample,
        channels,
        samples,
        values,
    })
}

/// Serialize a frame back to its sample-major wire form
///
/// Exact inverse of [`decode_frame`]; used by the mock base station.
pub fn encode_frame(frame: &DataFrame) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(frame.channels * frame.samples * BYTES_PER_VALUE);
    for s in 0..frame.samples {
        for c in 0..frame.channels {
            bytes.extend_from_slice(&frame.values[c * frame.samples + s].to_le_bytes());
        }
    }
    bytes
}

/// Build a frame directly from channel-major values
///
/// `values.len()` must equal `kind.total_channels() * samples`. Used by the
/// mock base station to synthesize traffic without going through bytes.
pub fn frame_from_values(
    kind: StreamKind,
    start_sample: u64,
    samples: usize,
    values: Vec<f32>,
) -> Result<DataFrame> {
    let channels = kind.total_channels();
    if samples == 0 || values.len() != channels * samples {
        return Err(Error::Framing {
            len: values.len() * BYTES_PER_VALUE,
            channels,
        });
    }
    Ok(DataFrame {
        kind,
        start_sample,
        channels,
        samples,
        values,
    })
}
