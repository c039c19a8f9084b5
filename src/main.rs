//! NadiIO - Streaming daemon for multi-sensor EMG/IMU base stations
//!
//! Connects to one base station, discovers its paired sensors, and keeps
//! their ring buffers current while logging periodic per-sensor statistics.
//!
//! ## Ports
//!
//! - **TCP 50040**: text command channel (one command in flight)
//! - **TCP 50041-50044**: binary sample frames, one port per stream kind
//!
//! Run `nadi-io mock` to stream from the embedded base emulator instead of
//! hardware.

use nadi_io::config::AppConfig;
use nadi_io::error::{Error, Result};
use nadi_io::protocol::SignalKind;
use nadi_io::session::Session;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often the main loop logs per-sensor statistics
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Parse config path from command line arguments.
///
/// Supports:
/// - `nadi-io <path>` (positional)
/// - `nadi-io --config <path>` (flag-based)
/// - `nadi-io -c <path>` (short flag)
/// - `nadi-io mock` (embedded emulator, no config file)
///
/// Defaults to `/etc/nadiio.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    // Look for --config or -c flag
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    // Fall back to first positional argument (if it doesn't start with -)
    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    // Default path
    "/etc/nadiio.toml".to_string()
}

/// Resolve the effective configuration for this run
fn load_config(path: &str) -> Result<AppConfig> {
    if path == "mock" {
        return Ok(AppConfig::mock_defaults());
    }
    match AppConfig::from_file(path) {
        Ok(config) => Ok(config),
        Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("{path} not found, using defaults (pass `mock` for the emulator)");
            Ok(AppConfig::local_defaults())
        }
        Err(e) => Err(e),
    }
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("NadiIO v0.3.0 starting...");

    let config_path = parse_config_path();
    log::info!("Using config: {}", config_path);
    let config = load_config(&config_path)?;
    let fast_mode = config.connection.fast_mode;

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let mut session = Session::new(config);
    session.connect()?;

    if !fast_mode {
        let control = session.control()?;
        if let (Ok(serial), Ok(firmware)) = (control.base_serial(), control.base_firmware()) {
            log::info!("base station serial {serial}, firmware {firmware}");
        }
    }

    let paired = session.discover()?;
    log::info!("{paired} paired sensor(s)");

    session.start()?;
    log::info!(
        "stream rates: emg {:.3}, aux {:.3} (device max-samples scaling)",
        session.emg_sample_rate(),
        session.aux_sample_rate()
    );
    log::info!("NadiIO running. Press Ctrl-C to stop.");

    // Main loop - keep the rings current, log stats periodically
    let mut last_stats = Instant::now();
    let mut updates: u64 = 0;
    let mut mismatches: u64 = 0;
    let mut gaps: u64 = 0;
    while running.load(Ordering::Relaxed) {
        let stats = session.poll_round()?;
        updates += stats.sensors_updated as u64;
        mismatches += stats.mismatches as u64;
        gaps += stats.discontinuities as u64;
        if stats.sensors_updated == 0 {
            // idle round (latest mode, or a barrier timeout with nothing fresh)
            std::thread::sleep(Duration::from_millis(5));
        }

        if last_stats.elapsed() >= STATS_INTERVAL {
            log::info!(
                "routed {updates} sensor updates ({mismatches} mismatches, {gaps} gaps)"
            );
            for entry in session.registry().entries() {
                let d = &entry.descriptor;
                log::info!(
                    "  sensor {} ({:?}): emg {}/{} chunks, aux {}/{}, gaps {}",
                    d.index,
                    d.model,
                    entry.ring(SignalKind::Emg).len(),
                    entry.ring(SignalKind::Emg).capacity(),
                    entry.ring(SignalKind::Aux).len(),
                    entry.ring(SignalKind::Aux).capacity(),
                    entry.ring(SignalKind::Emg).discontinuities()
                        + entry.ring(SignalKind::Aux).discontinuities(),
                );
            }
            for (kind, healthy) in session.reader_health() {
                if !healthy {
                    log::warn!("{kind} reader is down; its buffers are stale");
                }
            }
            last_stats = Instant::now();
        }
    }

    // Shutdown
    log::info!("Shutting down...");
    session.stop()?;
    session.disconnect()?;

    log::info!("NadiIO stopped");
    Ok(())
}
