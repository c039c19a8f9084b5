//! Quick capture demo using NadiIO - 5 second streaming run
//!
//! Sequence:
//! 1. Spawn the embedded base emulator (or point NADI_HOST at hardware)
//! 2. Connect and scan the pairing slots
//! 3. Stream for 5 seconds, routing rounds into the ring buffers
//! 4. Print a per-sensor summary with the freshest sample of every channel
//! 5. Stop and disconnect with supervised joins
//!
//! Run against the emulator:
//! ```sh
//! RUST_LOG=info cargo run --example quick_capture
//! ```
//!
//! Run against a real base:
//! ```sh
//! NADI_HOST=10.0.0.42 RUST_LOG=info cargo run --example quick_capture
//! ```

use nadi_io::config::AppConfig;
use nadi_io::protocol::SignalKind;
use nadi_io::session::Session;
use std::time::{Duration, Instant};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    log::info!("=== NadiIO Quick Capture (5s) ===");

    // === 1. Pick a target ===
    let config = match std::env::var("NADI_HOST") {
        Ok(host) => {
            log::info!("1. Targeting base station at {host}...");
            let mut config = AppConfig::local_defaults();
            config.connection.host = host;
            config
        }
        Err(_) => {
            log::info!("1. No NADI_HOST set, using the embedded emulator...");
            AppConfig::mock_defaults()
        }
    };

    // === 2. Connect and discover ===
    let mut session = Session::new(config);
    session.connect()?;
    let paired = session.discover()?;
    log::info!("   ✓ Connected, {paired} paired sensor(s)");

    // === 3. Stream for 5 seconds ===
    log::info!("2. Streaming...");
    session.start()?;
    log::info!(
        "   ✓ Started (rates: emg {:.3}, aux {:.3})",
        session.emg_sample_rate(),
        session.aux_sample_rate()
    );

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut rounds: u64 = 0;
    let mut updates: u64 = 0;
    while Instant::now() < deadline {
        let stats = session.poll_round()?;
        rounds += 1;
        updates += stats.sensors_updated as u64;
    }
    log::info!("   ✓ {rounds} rounds, {updates} sensor updates");

    // === 4. Per-sensor summary ===
    log::info!("3. Capture summary:");
    for entry in session.registry().entries() {
        let d = &entry.descriptor;
        log::info!(
            "   sensor {} ({:?}, mode {}): emg rows {:?}, aux rows {:?}",
            d.index,
            d.model,
            d.mode,
            d.emg_range(),
            d.aux_range(),
        );
        for signal in [SignalKind::Emg, SignalKind::Aux] {
            let ring = entry.ring(signal);
            if let Some(chunk) = ring.latest() {
                let freshest: Vec<f32> = (0..chunk.channels)
                    .map(|c| chunk.row(c)[chunk.samples - 1])
                    .collect();
                log::info!(
                    "     {signal}: {} chunks buffered, {} gaps, sample {} = {freshest:.3?}",
                    ring.len(),
                    ring.discontinuities(),
                    chunk.end_sample() - 1,
                );
            } else {
                log::info!("     {signal}: no data");
            }
        }
    }

    // === 5. Stop ===
    log::info!("4. Stopping...");
    session.stop()?;
    session.disconnect()?;
    log::info!("=== Capture Complete ===");

    Ok(())
}
