//! Configuration for the nadi-io daemon and session defaults
//!
//! Loaded from a TOML file; every section has library defaults suitable for a
//! base station on localhost, plus a mock profile for hardware-free runs.

use crate::aggregate::SyncMode;
use crate::error::Result;
use crate::protocol::COMMAND_PORT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub streaming: StreamingConfig,
    pub logging: LoggingConfig,
}

/// Command-channel connection parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Base station host; the literal `"mock"` runs against the in-process
    /// emulator instead of hardware
    pub host: String,
    /// Command port (data ports are fixed offsets of the protocol, not
    /// configured)
    pub command_port: u16,
    /// TCP connect window, milliseconds
    pub connect_timeout_ms: u64,
    /// Wait window for a command reply, milliseconds
    pub reply_timeout_ms: u64,
    /// Fire-and-forget mode: never read command replies
    pub fast_mode: bool,
}

/// Streaming behavior
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamingConfig {
    /// Round synchronization across kinds: `"barrier"` or `"latest"`
    pub sync_mode: SyncMode,
    /// Barrier round timeout, milliseconds; on expiry the round proceeds
    /// with whatever is fresh
    pub round_timeout_ms: u64,
    /// Chunks retained per sensor per signal
    pub ring_capacity: usize,
    /// Data socket read timeout, milliseconds; unset means block until data
    /// or shutdown
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
    /// Set AUX upsampling at connect; unset leaves the device as-is
    #[serde(default)]
    pub upsampling: Option<bool>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default log level when RUST_LOG is not set (trace, debug, info, warn,
    /// error)
    pub level: String,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Defaults for a base station reachable on localhost
    pub fn local_defaults() -> Self {
        Self {
            connection: ConnectionConfig {
                host: "127.0.0.1".to_string(),
                command_port: COMMAND_PORT,
                connect_timeout_ms: 2000,
                reply_timeout_ms: 2000,
                fast_mode: false,
            },
            streaming: StreamingConfig {
                sync_mode: SyncMode::Barrier,
                round_timeout_ms: 100,
                ring_capacity: 256,
                read_timeout_ms: None,
                upsampling: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    /// Defaults for the in-process mock base station
    pub fn mock_defaults() -> Self {
        let mut config = Self::local_defaults();
        config.connection.host = "mock".to_string();
        config
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::local_defaults()
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

impl StreamingConfig {
    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }
}
