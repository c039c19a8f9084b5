//! Wire-level constants and stream identification for the sensor hub
//!
//! The base station exposes one plain-text command port and four binary data
//! ports, one per (sensor family, signal kind) pair. Everything that needs a
//! port number or a channel count goes through the [`StreamKind`] table here;
//! nothing else in the crate hard-codes the layout.

pub mod frame;

pub use frame::{decode_frame, encode_frame, frame_from_values, DataFrame};

use std::fmt;

// TCP ports
pub const COMMAND_PORT: u16 = 50040;
pub const LEGACY_EMG_PORT: u16 = 50041;
pub const LEGACY_AUX_PORT: u16 = 50042;
pub const AVANTI_EMG_PORT: u16 = 50043;
pub const AVANTI_AUX_PORT: u16 = 50044;

// Command framing
pub const CMD_TERMINATOR: &str = "\r\n\r\n";

// Frame layout
pub const BYTES_PER_VALUE: usize = 4; // little-endian f32
pub const EMG_TOTAL_CHANNELS: usize = 16;
pub const AVANTI_AUX_TOTAL_CHANNELS: usize = 144;
pub const LEGACY_AUX_TOTAL_CHANNELS: usize = 48;

// Sensor addressing
pub const SENSOR_SLOTS: u8 = 16;
/// AUX channels reserved per sensor slot in the frame layout. Device addressing
/// constant: slot n's AUX rows start at `start_index * AUX_SLOT_STRIDE`.
pub const AUX_SLOT_STRIDE: usize = 9;

/// Scale factor from a max-samples report to the stream rate the base
/// documents for its frame cadence.
pub const RATE_PER_MAX_SAMPLE: f32 = 0.0135;

/// Hardware generation of a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorFamily {
    Avanti,
    Legacy,
}

impl fmt::Display for SensorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorFamily::Avanti => write!(f, "avanti"),
            SensorFamily::Legacy => write!(f, "legacy"),
        }
    }
}

/// Which signal a data port carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Emg,
    Aux,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Emg => write!(f, "emg"),
            SignalKind::Aux => write!(f, "aux"),
        }
    }
}

/// One data stream of the base station: a (family, signal) pair with its own
/// port and frame layout
///
/// | kind      | port  | channels |
/// |-----------|-------|----------|
/// | LegacyEmg | 50041 | 16       |
/// | LegacyAux | 50042 | 48       |
/// | AvantiEmg | 50043 | 16       |
/// | AvantiAux | 50044 | 144      |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    AvantiEmg,
    AvantiAux,
    LegacyEmg,
    LegacyAux,
}

impl StreamKind {
    /// All four kinds, in a fixed order usable for indexing
    pub const ALL: [StreamKind; 4] = [
        StreamKind::AvantiEmg,
        StreamKind::AvantiAux,
        StreamKind::LegacyEmg,
        StreamKind::LegacyAux,
    ];

    pub fn from_parts(family: SensorFamily, signal: SignalKind) -> Self {
        match (family, signal) {
            (SensorFamily::Avanti, SignalKind::Emg) => StreamKind::AvantiEmg,
            (SensorFamily::Avanti, SignalKind::Aux) => StreamKind::AvantiAux,
            (SensorFamily::Legacy, SignalKind::Emg) => StreamKind::LegacyEmg,
            (SensorFamily::Legacy, SignalKind::Aux) => StreamKind::LegacyAux,
        }
    }

    pub fn family(&self) -> SensorFamily {
        match self {
            StreamKind::AvantiEmg | StreamKind::AvantiAux => SensorFamily::Avanti,
            StreamKind::LegacyEmg | StreamKind::LegacyAux => SensorFamily::Legacy,
        }
    }

    pub fn signal(&self) -> SignalKind {
        match self {
            StreamKind::AvantiEmg | StreamKind::LegacyEmg => SignalKind::Emg,
            StreamKind::AvantiAux | StreamKind::LegacyAux => SignalKind::Aux,
        }
    }

    /// TCP data port for this stream
    pub fn port(&self) -> u16 {
        match self {
            StreamKind::AvantiEmg => AVANTI_EMG_PORT,
            StreamKind::AvantiAux => AVANTI_AUX_PORT,
            StreamKind::LegacyEmg => LEGACY_EMG_PORT,
            StreamKind::LegacyAux => LEGACY_AUX_PORT,
        }
    }

    /// Total channel rows in every frame of this stream
    pub fn total_channels(&self) -> usize {
        match self {
            StreamKind::AvantiEmg | StreamKind::LegacyEmg => EMG_TOTAL_CHANNELS,
            StreamKind::AvantiAux => AVANTI_AUX_TOTAL_CHANNELS,
            StreamKind::LegacyAux => LEGACY_AUX_TOTAL_CHANNELS,
        }
    }

    /// Stable position in [`StreamKind::ALL`], for per-kind arrays
    pub fn index(&self) -> usize {
        match self {
            StreamKind::AvantiEmg => 0,
            StreamKind::AvantiAux => 1,
            StreamKind::LegacyEmg => 2,
            StreamKind::LegacyAux => 3,
        }
    }

    /// Pick this stream's samples-per-frame from the discovered EMG/AUX pair
    pub fn samples_per_frame(&self, emg_samples: usize, aux_samples: usize) -> usize {
        match self.signal() {
            SignalKind::Emg => emg_samples,
            SignalKind::Aux => aux_samples,
        }
    }

    /// Exact wire size of one frame at the given samples-per-frame
    pub fn frame_len(&self, samples: usize) -> usize {
        self.total_channels() * samples * BYTES_PER_VALUE
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.family(), self.signal())
    }
}

/// Resolved port assignment for one base station
///
/// Defaults to the protocol's well-known ports; the mock base substitutes its
/// ephemeral ones. Data ports are indexed by [`StreamKind::index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMap {
    pub command: u16,
    pub data: [u16; 4],
}

impl PortMap {
    pub fn data_port(&self, kind: StreamKind) -> u16 {
        self.data[kind.index()]
    }
}

impl Default for PortMap {
    fn default() -> Self {
        Self {
            command: COMMAND_PORT,
            data: [
                AVANTI_EMG_PORT,
                AVANTI_AUX_PORT,
                LEGACY_EMG_PORT,
                LEGACY_AUX_PORT,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_table() {
        assert_eq!(StreamKind::LegacyEmg.port(), 50041);
        assert_eq!(StreamKind::LegacyAux.port(), 50042);
        assert_eq!(StreamKind::AvantiEmg.port(), 50043);
        assert_eq!(StreamKind::AvantiAux.port(), 50044);
    }

    #[test]
    fn test_channel_table() {
        assert_eq!(StreamKind::AvantiEmg.total_channels(), 16);
        assert_eq!(StreamKind::LegacyEmg.total_channels(), 16);
        assert_eq!(StreamKind::AvantiAux.total_channels(), 144);
        assert_eq!(StreamKind::LegacyAux.total_channels(), 48);
    }

    #[test]
    fn test_default_port_map_matches_protocol() {
        let map = PortMap::default();
        assert_eq!(map.command, COMMAND_PORT);
        for kind in StreamKind::ALL {
            assert_eq!(map.data_port(kind), kind.port());
        }
    }

    #[test]
    fn test_parts_round_trip() {
        for kind in StreamKind::ALL {
            assert_eq!(StreamKind::from_parts(kind.family(), kind.signal()), kind);
            assert_eq!(StreamKind::ALL[kind.index()], kind);
        }
    }

    #[test]
    fn test_frame_len() {
        // 16 channels x 27 samples x 4 bytes
        assert_eq!(StreamKind::AvantiEmg.frame_len(27), 1728);
        assert_eq!(StreamKind::LegacyAux.frame_len(2), 384);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(StreamKind::AvantiEmg.to_string(), "avanti-emg");
        assert_eq!(StreamKind::LegacyAux.to_string(), "legacy-aux");
    }
}
