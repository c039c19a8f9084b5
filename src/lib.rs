//! NadiIO - Streaming client for multi-sensor EMG/IMU base stations
//!
//! Speaks the base station's TCP surface: one text command channel plus one
//! binary data channel per stream kind. Discovers the paired sensors,
//! decodes the fixed-layout sample frames, and routes each sensor's channel
//! rows into its own ring buffer for asynchronous consumption.
//!
//! [`session::Session`] is the lifecycle entry point; [`mock`] provides an
//! in-process base emulator for hardware-free runs and tests.

pub mod aggregate;
pub mod buffer;
pub mod config;
pub mod control;
pub mod error;
pub mod mock;
pub mod protocol;
pub mod router;
pub mod sensors;
pub mod session;
pub mod stream;
pub mod transport;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
pub use protocol::{DataFrame, SensorFamily, SignalKind, StreamKind};
pub use session::Session;
