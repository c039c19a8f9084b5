//! In-process base station emulator for hardware-free development
//!
//! Binds a command listener plus one data listener per stream kind on
//! ephemeral loopback ports and speaks the same text protocol and binary
//! frame format as a real base. Sessions connect to it through the
//! [`PortMap`] it hands back, so nothing above the transport layer knows
//! the difference.
//!
//! # Behavior
//!
//! - Command connections get a banner, then request/reply with the usual
//!   `\r\n\r\n` terminator. Pairing inventory, frame geometry and base
//!   identity all come from [`MockBaseConfig`].
//! - Data listeners accept one client at a time and stay silent until
//!   `START` arrives; frames then flow at `frame_interval` until `STOP`
//!   or the client hangs up. Counters reset per connection, matching a
//!   base that restarts its stream on reconnect.
//! - Synthesized values follow a deterministic ramp, `channel * 10_000 +
//!   absolute_sample`, exact in `f32` for any plausible test duration.
//!   Optional Gaussian noise on top makes demo plots look alive.
//!
//! # Thread model
//!
//! One `mock-base-cmd` thread owns the command listener, four
//! `mock-<kind>` threads own the data listeners. All of them poll a
//! shared shutdown flag; [`MockBase::stop`] (or drop) sets it and joins.

use crate::control::find_terminator;
use crate::error::{Error, Result};
use crate::protocol::{encode_frame, frame_from_values, PortMap, StreamKind, CMD_TERMINATOR};
use crate::sensors::SensorModel;
use log::{debug, error, info, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// One emulated sensor occupying a pairing slot
#[derive(Debug, Clone)]
pub struct MockSensor {
    /// Pairing slot, 1-based
    pub slot: u8,
    pub model: SensorModel,
    pub emg_channels: usize,
    pub aux_channels: usize,
    pub start_index: usize,
    /// Mode number reported for `MODE?`
    pub mode: u16,
}

/// Inventory and timing of the emulated base
#[derive(Debug, Clone)]
pub struct MockBaseConfig {
    pub sensors: Vec<MockSensor>,
    /// Reply to `MAX SAMPLES EMG`, i.e. samples per EMG frame
    pub emg_samples: usize,
    /// Reply to `MAX SAMPLES AUX`, i.e. samples per AUX frame
    pub aux_samples: usize,
    /// Pacing between consecutive frames on every data port
    pub frame_interval: Duration,
    /// Gaussian noise added to the ramp; `None` keeps values exact
    pub noise_stddev: Option<f32>,
    /// Seed for the noise source, 0 for entropy
    pub seed: u64,
    pub serial: String,
    pub firmware: String,
}

impl Default for MockBaseConfig {
    fn default() -> Self {
        Self {
            sensors: vec![
                MockSensor {
                    slot: 1,
                    model: SensorModel::Avanti,
                    emg_channels: 1,
                    aux_channels: 9,
                    start_index: 0,
                    mode: 40,
                },
                MockSensor {
                    slot: 2,
                    model: SensorModel::Legacy,
                    emg_channels: 1,
                    aux_channels: 3,
                    start_index: 1,
                    mode: 4,
                },
            ],
            emg_samples: 27,
            aux_samples: 2,
            frame_interval: Duration::from_millis(5),
            noise_stddev: None,
            seed: 42,
            serial: "MB-MOCK-0001".to_string(),
            firmware: "0.0.0-mock".to_string(),
        }
    }
}

/// Running emulator; stops and joins its threads on drop
pub struct MockBase {
    ports: PortMap,
    shutdown: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl MockBase {
    /// Bind all listeners on ephemeral loopback ports and start serving
    pub fn spawn(config: MockBaseConfig) -> Result<Self> {
        let command_listener = TcpListener::bind(("127.0.0.1", 0))?;
        command_listener.set_nonblocking(true)?;
        let command_port = command_listener.local_addr()?.port();

        let mut data = [0u16; 4];
        let mut data_listeners = Vec::with_capacity(StreamKind::ALL.len());
        for kind in StreamKind::ALL {
            let listener = TcpListener::bind(("127.0.0.1", 0))?;
            listener.set_nonblocking(true)?;
            data[kind.index()] = listener.local_addr()?.port();
            data_listeners.push((kind, listener));
        }
        let ports = PortMap {
            command: command_port,
            data,
        };

        let config = Arc::new(config);
        let shutdown = Arc::new(AtomicBool::new(false));
        let streaming = Arc::new(AtomicBool::new(false));
        let mut threads = Vec::with_capacity(1 + data_listeners.len());

        {
            let config = Arc::clone(&config);
            let streaming = Arc::clone(&streaming);
            let shutdown = Arc::clone(&shutdown);
            let handle = thread::Builder::new()
                .name("mock-base-cmd".to_string())
                .spawn(move || command_loop(command_listener, &config, &streaming, &shutdown))
                .map_err(|e| Error::Other(format!("failed to spawn mock command thread: {e}")))?;
            threads.push(handle);
        }

        for (kind, listener) in data_listeners {
            let config = Arc::clone(&config);
            let streaming = Arc::clone(&streaming);
            let shutdown = Arc::clone(&shutdown);
            let handle = thread::Builder::new()
                .name(format!("mock-{kind}"))
                .spawn(move || data_loop(listener, kind, &config, &streaming, &shutdown))
                .map_err(|e| Error::Other(format!("failed to spawn mock {kind} thread: {e}")))?;
            threads.push(handle);
        }

        info!(
            "mock base up: command port {}, data ports {:?}",
            ports.command, ports.data
        );
        Ok(Self {
            ports,
            shutdown,
            threads,
        })
    }

    /// Ports the emulator actually bound; feed these to the session
    pub fn ports(&self) -> PortMap {
        self.ports
    }

    /// Signal all threads and wait for them to exit
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for MockBase {
    fn drop(&mut self) {
        self.stop();
    }
}

fn command_loop(
    listener: TcpListener,
    config: &MockBaseConfig,
    streaming: &AtomicBool,
    shutdown: &AtomicBool,
) {
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                debug!("mock base: command client {addr} connected");
                if let Err(e) = serve_commands(stream, config, streaming, shutdown) {
                    debug!("mock base: command client ended: {e}");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                warn!("mock base: command accept failed: {e}");
                thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

fn serve_commands(
    mut stream: TcpStream,
    config: &MockBaseConfig,
    streaming: &AtomicBool,
    shutdown: &AtomicBool,
) -> std::io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_millis(50)))?;
    stream.write_all(b"MOCK BASE READY\r\n\r\n")?;

    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 256];
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return Ok(());
        }
        match stream.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => pending.extend_from_slice(&buf[..n]),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => return Err(e),
        }
        while let Some(pos) = find_terminator(&pending) {
            let command = String::from_utf8_lossy(&pending[..pos]).trim().to_string();
            pending.drain(..pos + CMD_TERMINATOR.len());
            let reply = reply_for(&command, config, streaming);
            debug!("mock base: {command:?} -> {reply:?}");
            stream.write_all(reply.as_bytes())?;
            stream.write_all(CMD_TERMINATOR.as_bytes())?;
        }
    }
}

/// Reply table for the command surface the emulator understands
fn reply_for(command: &str, config: &MockBaseConfig, streaming: &AtomicBool) -> String {
    if let Some(rest) = command.strip_prefix("SENSOR ") {
        return sensor_reply(rest, config);
    }
    match command {
        "START" => {
            streaming.store(true, Ordering::SeqCst);
            "OK".to_string()
        }
        "STOP" => {
            streaming.store(false, Ordering::SeqCst);
            "OK".to_string()
        }
        "MAX SAMPLES EMG" => config.emg_samples.to_string(),
        "MAX SAMPLES AUX" => config.aux_samples.to_string(),
        "BACKWARDS COMPATIBILITY?" => "OFF".to_string(),
        "UPSAMPLING?" => "ON".to_string(),
        "ENDIANNESS?" => "LITTLE".to_string(),
        "TRIGGER?" => "TRIGGER START OFF, TRIGGER STOP OFF".to_string(),
        "BASE SERIAL?" => config.serial.clone(),
        "BASE FIRMWARE?" => config.firmware.clone(),
        _ if command.starts_with("BACKWARDS COMPATIBILITY")
            || command.starts_with("UPSAMPLE")
            || command.starts_with("ENDIAN")
            || command.starts_with("TRIGGER") =>
        {
            "OK".to_string()
        }
        _ => "INVALID COMMAND".to_string(),
    }
}

fn sensor_reply(rest: &str, config: &MockBaseConfig) -> String {
    let mut parts = rest.splitn(2, ' ');
    let slot = match parts.next().and_then(|s| s.parse::<u8>().ok()) {
        Some(slot) => slot,
        None => return "INVALID COMMAND".to_string(),
    };
    let query = match parts.next() {
        Some(query) => query,
        None => return "INVALID COMMAND".to_string(),
    };
    let sensor = config.sensors.iter().find(|s| s.slot == slot);

    if query == "PAIRED?" {
        return if sensor.is_some() { "YES" } else { "NO" }.to_string();
    }
    if query == "PAIR" || query.starts_with("SETMODE ") {
        return "OK".to_string();
    }
    let sensor = match sensor {
        Some(sensor) => sensor,
        None => return "INVALID COMMAND".to_string(),
    };
    match query {
        "TYPE?" => sensor.model.type_code().to_string(),
        "EMGCHANNELCOUNT?" => sensor.emg_channels.to_string(),
        "AUXCHANNELCOUNT?" => sensor.aux_channels.to_string(),
        "STARTINDEX?" => sensor.start_index.to_string(),
        "MODE?" => sensor.mode.to_string(),
        _ => "INVALID COMMAND".to_string(),
    }
}

fn data_loop(
    listener: TcpListener,
    kind: StreamKind,
    config: &MockBaseConfig,
    streaming: &AtomicBool,
    shutdown: &AtomicBool,
) {
    let samples = kind.samples_per_frame(config.emg_samples, config.aux_samples);
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, _)) => {
                debug!("mock base: {kind} data client connected");
                pump_frames(stream, kind, samples, config, streaming, shutdown);
                debug!("mock base: {kind} data client gone");
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                warn!("mock base: {kind} accept failed: {e}");
                thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

/// Serve one data client until it disconnects or the emulator stops
fn pump_frames(
    mut stream: TcpStream,
    kind: StreamKind,
    samples: usize,
    config: &MockBaseConfig,
    streaming: &AtomicBool,
    shutdown: &AtomicBool,
) {
    let channels = kind.total_channels();
    let mut noise = config
        .noise_stddev
        .map(|stddev| NoiseSource::new(config.seed.wrapping_add(kind.index() as u64), stddev));
    let mut start: u64 = 0;

    while !shutdown.load(Ordering::Relaxed) {
        if !streaming.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(2));
            continue;
        }
        let values = synth_values(channels, samples, start, noise.as_mut());
        let frame = match frame_from_values(kind, start, samples, values) {
            Ok(frame) => frame,
            Err(e) => {
                error!("mock base: {kind} frame synthesis failed: {e}");
                return;
            }
        };
        if stream.write_all(&encode_frame(&frame)).is_err() {
            return;
        }
        start += samples as u64;
        thread::sleep(config.frame_interval);
    }
}

/// Ramp value at `(channel, absolute sample)`, before noise
fn ramp(channel: usize, sample: u64) -> f32 {
    (channel as u64 * 10_000 + sample) as f32
}

fn synth_values(
    channels: usize,
    samples: usize,
    start: u64,
    mut noise: Option<&mut NoiseSource>,
) -> Vec<f32> {
    let mut values = Vec::with_capacity(channels * samples);
    for c in 0..channels {
        for s in 0..samples {
            let mut v = ramp(c, start + s as u64);
            if let Some(n) = noise.as_deref_mut() {
                v += n.gaussian();
            }
            values.push(v);
        }
    }
    values
}

/// Seeded Gaussian source for making the ramp look like a live signal
struct NoiseSource {
    rng: SmallRng,
    stddev: f32,
}

impl NoiseSource {
    fn new(seed: u64, stddev: f32) -> Self {
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(seed)
        };
        Self { rng, stddev }
    }

    fn gaussian(&mut self) -> f32 {
        if self.stddev == 0.0 {
            return 0.0;
        }
        let n: f32 = self.rng.sample(StandardNormal);
        n * self.stddev
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlChannel;
    use crate::protocol::decode_frame;
    use crate::transport::TcpTransport;

    fn control_for(ports: PortMap) -> ControlChannel {
        let transport = TcpTransport::connect(
            "127.0.0.1",
            ports.command,
            Duration::from_secs(1),
            Duration::from_millis(10),
        )
        .unwrap();
        ControlChannel::new(Box::new(transport), Duration::from_secs(2), false)
    }

    #[test]
    fn test_reply_table() {
        let config = MockBaseConfig::default();
        let streaming = AtomicBool::new(false);

        assert_eq!(reply_for("MAX SAMPLES EMG", &config, &streaming), "27");
        assert_eq!(reply_for("MAX SAMPLES AUX", &config, &streaming), "2");
        assert_eq!(reply_for("SENSOR 1 PAIRED?", &config, &streaming), "YES");
        assert_eq!(reply_for("SENSOR 1 TYPE?", &config, &streaming), "O");
        assert_eq!(reply_for("SENSOR 2 TYPE?", &config, &streaming), "A");
        assert_eq!(reply_for("SENSOR 2 STARTINDEX?", &config, &streaming), "1");
        assert_eq!(reply_for("SENSOR 9 PAIRED?", &config, &streaming), "NO");
        assert_eq!(
            reply_for("SENSOR 9 TYPE?", &config, &streaming),
            "INVALID COMMAND"
        );
        assert_eq!(reply_for("BASE SERIAL?", &config, &streaming), "MB-MOCK-0001");
        assert_eq!(
            reply_for("FLUX CAPACITOR?", &config, &streaming),
            "INVALID COMMAND"
        );

        assert_eq!(reply_for("START", &config, &streaming), "OK");
        assert!(streaming.load(Ordering::SeqCst));
        assert_eq!(reply_for("STOP", &config, &streaming), "OK");
        assert!(!streaming.load(Ordering::SeqCst));
    }

    #[test]
    fn test_command_surface_over_tcp() {
        let mut base = MockBase::spawn(MockBaseConfig::default()).unwrap();
        let mut control = control_for(base.ports());

        // banner must not leak into the first reply
        control.drain(Duration::from_millis(200));

        assert_eq!(control.max_emg_samples().unwrap(), 27);
        assert_eq!(control.max_aux_samples().unwrap(), 2);
        assert!(control.is_paired(1).unwrap());
        assert!(!control.is_paired(5).unwrap());
        assert_eq!(control.sensor_type_code(1).unwrap(), "O");
        assert_eq!(control.base_serial().unwrap(), "MB-MOCK-0001");

        base.stop();
    }

    #[test]
    fn test_data_port_streams_after_start() {
        let config = MockBaseConfig {
            emg_samples: 4,
            frame_interval: Duration::from_millis(1),
            ..MockBaseConfig::default()
        };
        let mut base = MockBase::spawn(config).unwrap();
        let ports = base.ports();

        let mut control = control_for(ports);
        control.drain(Duration::from_millis(200));

        // data socket connects first, then START opens the tap
        let kind = StreamKind::AvantiEmg;
        let mut data = TcpStream::connect(("127.0.0.1", ports.data_port(kind))).unwrap();
        data.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        control.start_streaming().unwrap();

        let mut buf = vec![0u8; kind.frame_len(4)];
        data.read_exact(&mut buf).unwrap();
        let first = decode_frame(kind, 0, &buf).unwrap();
        assert_eq!(first.samples(), 4);
        assert_eq!(first.row(3)[1], ramp(3, 1));

        data.read_exact(&mut buf).unwrap();
        let second = decode_frame(kind, 4, &buf).unwrap();
        // ramp continues across frames
        assert_eq!(second.row(0)[0], ramp(0, 4));

        control.stop_streaming().unwrap();
        base.stop();
    }

    #[test]
    fn test_noise_rides_on_ramp() {
        let mut source = NoiseSource::new(7, 0.5);
        let noisy = synth_values(2, 3, 10, Some(&mut source));
        assert_eq!(noisy.len(), 6);
        for (i, v) in noisy.iter().enumerate() {
            let c = i / 3;
            let s = (i % 3) as u64;
            assert!((v - ramp(c, 10 + s)).abs() < 5.0);
        }

        // zero stddev keeps the ramp exact
        let mut silent = NoiseSource::new(7, 0.0);
        let clean = synth_values(2, 3, 10, Some(&mut silent));
        assert_eq!(clean[0], ramp(0, 10));
        assert_eq!(clean[5], ramp(1, 12));
    }
}
