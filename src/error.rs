//! Error types for nadi-io

use crate::protocol::StreamKind;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// nadi-io error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame byte count not a positive multiple of the channel width
    #[error("framing error: {len} bytes is not a positive multiple of {channels} channels x 4")]
    Framing {
        /// Length of the rejected buffer
        len: usize,
        /// Channel count the frame was decoded against
        channels: usize,
    },

    /// Data peer closed or reset the connection
    #[error("{kind} stream closed by peer")]
    StreamClosed {
        /// Which stream went away
        kind: StreamKind,
    },

    /// Sensor channel range does not fit the decoded frame
    #[error("routing mismatch: sensor {sensor} rows [{lo}, {hi}) outside frame of {rows} rows")]
    RoutingMismatch {
        /// Sensor slot (1-based)
        sensor: u8,
        /// First row of the requested range
        lo: usize,
        /// One past the last row of the requested range
        hi: usize,
        /// Rows actually present in the frame
        rows: usize,
    },

    /// No reply from the command port within the wait window
    #[error("control timeout waiting for reply to {command:?}")]
    ControlTimeout {
        /// Command that went unanswered
        command: String,
    },

    /// Logical sample counters are not contiguous
    #[error("sample discontinuity: expected start {expected}, got {actual}")]
    Discontinuity {
        /// Start sample the previous chunk predicted
        expected: u64,
        /// Start sample actually observed
        actual: u64,
    },

    /// Unexpected or unparseable control reply
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation requires an open session
    #[error("not connected")]
    NotConnected,

    /// Streaming already running
    #[error("streaming already started")]
    AlreadyStreaming,

    /// Operation requires an active stream
    #[error("streaming not started")]
    NotStreaming,

    /// Configuration parse error
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration write error
    #[error("config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// A supervised thread panicked
    #[error("worker thread panicked")]
    ThreadPanic,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
