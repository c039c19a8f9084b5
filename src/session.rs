//! Session lifecycle against one base station
//!
//! A [`Session`] walks the device through connect, discovery, streaming and
//! teardown, and owns everything with a lifetime: the control channel, the
//! sensor registry with its ring buffers, the reader threads and the round
//! aggregator. Control commands flow through it one at a time; decoded data
//! flows around it, from readers through slots into the registry.
//!
//! Stopping is supervised: `stop()` sends `STOP`, raises the shared
//! cancellation flag, shuts down every data socket so blocked reads return,
//! and joins every reader before it reports the stream stopped. A reader
//! that died early (peer closed its port, framing went bad) only stales its
//! own kind; the session keeps running and reports it via
//! [`Session::reader_health`].

use crate::aggregate::{doorbell, Aggregator, Round};
use crate::config::AppConfig;
use crate::control::ControlChannel;
use crate::error::{Error, Result};
use crate::mock::{MockBase, MockBaseConfig};
use crate::protocol::{PortMap, StreamKind, RATE_PER_MAX_SAMPLE};
use crate::router::{route_round, RouteStats};
use crate::sensors::SensorRegistry;
use crate::stream::{spawn_reader, FrameSlot, ReaderHandle};
use crate::transport::{connect_tcp, TcpTransport};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Host value that swaps the hardware for the in-process emulator
pub const MOCK_HOST: &str = "mock";

/// How long connect() listens for the unsolicited banner
const BANNER_DRAIN_WINDOW: Duration = Duration::from_millis(250);

/// Poll slice for command-port reads; replies are bounded separately
const CONTROL_READ_POLL: Duration = Duration::from_millis(20);

/// One client lifetime against one base station
pub struct Session {
    config: AppConfig,
    ports: PortMap,
    /// Kept alive for the session when the host is [`MOCK_HOST`]
    mock: Option<MockBase>,
    control: Option<ControlChannel>,
    registry: SensorRegistry,
    /// Samples per EMG frame, fixed by `start()`
    emg_samples: usize,
    /// Samples per AUX frame, fixed by `start()`
    aux_samples: usize,
    shutdown: Arc<AtomicBool>,
    readers: Vec<ReaderHandle>,
    aggregator: Option<Aggregator>,
}

impl Session {
    pub fn new(config: AppConfig) -> Self {
        Self::with_ports(config, PortMap::default())
    }

    /// Target non-standard ports, e.g. the ephemeral ones a [`MockBase`]
    /// hands back
    pub fn with_ports(config: AppConfig, ports: PortMap) -> Self {
        let ring_capacity = config.streaming.ring_capacity;
        Self {
            config,
            ports,
            mock: None,
            control: None,
            registry: SensorRegistry::from_descriptors(Vec::new(), ring_capacity),
            emg_samples: 0,
            aux_samples: 0,
            shutdown: Arc::new(AtomicBool::new(false)),
            readers: Vec::new(),
            aggregator: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.control.is_some()
    }

    pub fn is_streaming(&self) -> bool {
        !self.readers.is_empty()
    }

    /// Open the command channel and apply the protocol options
    ///
    /// Drains the connect banner, turns backwards compatibility off so the
    /// frame layout matches the port tables, applies the configured
    /// upsampling choice and refuses to proceed on a big-endian base.
    /// A no-op when already connected.
    pub fn connect(&mut self) -> Result<()> {
        if self.control.is_some() {
            return Ok(());
        }
        if self.config.connection.host == MOCK_HOST {
            let base = MockBase::spawn(MockBaseConfig {
                noise_stddev: Some(0.5),
                ..MockBaseConfig::default()
            })?;
            self.ports = base.ports();
            self.mock = Some(base);
        }
        let host = self.data_host().to_string();
        let transport = TcpTransport::connect(
            &host,
            self.ports.command,
            self.config.connection.connect_timeout(),
            CONTROL_READ_POLL,
        )?;
        let mut control = ControlChannel::new(
            Box::new(transport),
            self.config.connection.reply_timeout(),
            self.config.connection.fast_mode,
        );
        control.drain(BANNER_DRAIN_WINDOW);
        control.set_backwards_compatibility(false)?;
        if let Some(on) = self.config.streaming.upsampling {
            control.set_upsampling(on)?;
        }
        ensure_little_endian(&mut control, self.config.connection.fast_mode)?;
        self.control = Some(control);
        info!("connected to base at {}:{}", host, self.ports.command);
        Ok(())
    }

    /// Scan the pairing slots and rebuild the registry
    pub fn discover(&mut self) -> Result<usize> {
        let ring_capacity = self.config.streaming.ring_capacity;
        let control = self.control.as_mut().ok_or(Error::NotConnected)?;
        self.registry = SensorRegistry::discover(control, ring_capacity)?;
        Ok(self.registry.len())
    }

    /// Fix frame geometry, open the data sockets, send START, spawn readers
    ///
    /// Data sockets are connected before START goes out so the first frame
    /// of the run is never lost.
    pub fn start(&mut self) -> Result<()> {
        if self.is_streaming() {
            return Err(Error::AlreadyStreaming);
        }
        let connect_timeout = self.config.connection.connect_timeout();
        let read_timeout = self.config.streaming.read_timeout();
        let host = self.data_host().to_string();
        let control = self.control.as_mut().ok_or(Error::NotConnected)?;

        let emg_samples = control.max_emg_samples()?;
        let aux_samples = control.max_aux_samples()?;
        let kinds = self.registry.active_kinds();
        if kinds.is_empty() {
            return Err(Error::Other(
                "no active streams; discover paired sensors first".to_string(),
            ));
        }
        debug!(
            "frame geometry: {emg_samples} EMG samples, {aux_samples} AUX samples, kinds {kinds:?}"
        );

        let mut pending = Vec::with_capacity(kinds.len());
        for kind in &kinds {
            let stream = connect_tcp(&host, self.ports.data_port(*kind), connect_timeout)?;
            if let Some(timeout) = read_timeout {
                stream.set_read_timeout(Some(timeout))?;
            }
            pending.push((*kind, stream));
        }

        control.start_streaming()?;

        self.shutdown = Arc::new(AtomicBool::new(false));
        let (bell_tx, bell_rx) = doorbell();
        let mut slots = Vec::with_capacity(pending.len());
        for (kind, stream) in pending {
            let samples = kind.samples_per_frame(emg_samples, aux_samples);
            let slot = Arc::new(FrameSlot::new(kind));
            slots.push(Arc::clone(&slot));
            match spawn_reader(
                kind,
                stream,
                samples,
                slot,
                bell_tx.clone(),
                Arc::clone(&self.shutdown),
            ) {
                Ok(handle) => self.readers.push(handle),
                Err(e) => {
                    self.teardown_readers();
                    return Err(e);
                }
            }
        }

        self.emg_samples = emg_samples;
        self.aux_samples = aux_samples;
        self.aggregator = Some(Aggregator::new(
            slots,
            bell_rx,
            self.config.streaming.sync_mode,
            self.config.streaming.round_timeout(),
        ));
        info!(
            "streaming started: {} readers, {:?} rounds",
            self.readers.len(),
            self.config.streaming.sync_mode
        );
        Ok(())
    }

    /// Collect one round of frames per the configured sync mode
    pub fn collect_round(&mut self) -> Result<Round> {
        let aggregator = self.aggregator.as_ref().ok_or(Error::NotStreaming)?;
        Ok(aggregator.collect_round())
    }

    /// Collect one round and route it into the per-sensor rings
    pub fn poll_round(&mut self) -> Result<RouteStats> {
        let round = self.collect_round()?;
        Ok(route_round(&round, &mut self.registry))
    }

    /// Stop streaming: STOP, cancel, unblock and join every reader
    ///
    /// A no-op when not streaming. The stopped state is only reported after
    /// the last reader thread has been joined.
    pub fn stop(&mut self) -> Result<()> {
        if !self.is_streaming() {
            return Ok(());
        }
        if let Some(control) = self.control.as_mut() {
            if let Err(e) = control.stop_streaming() {
                warn!("STOP not acknowledged: {e}");
            }
        }
        self.teardown_readers();
        self.aggregator = None;
        info!("streaming stopped");
        Ok(())
    }

    /// Stop if needed and drop the control channel (and any mock base)
    pub fn disconnect(&mut self) -> Result<()> {
        self.stop()?;
        if self.control.take().is_some() {
            info!("disconnected from base");
        }
        if let Some(mut base) = self.mock.take() {
            base.stop();
        }
        Ok(())
    }

    /// Liveness per active kind; `false` means that reader gave up
    pub fn reader_health(&self) -> Vec<(StreamKind, bool)> {
        self.readers
            .iter()
            .map(|r| (r.kind(), !r.has_failed()))
            .collect()
    }

    pub fn registry(&self) -> &SensorRegistry {
        &self.registry
    }

    /// EMG stream rate: the discovered samples-per-frame under the device's
    /// [`RATE_PER_MAX_SAMPLE`] scaling
    pub fn emg_sample_rate(&self) -> f32 {
        self.emg_samples as f32 * RATE_PER_MAX_SAMPLE
    }

    /// AUX stream rate: the discovered samples-per-frame under the device's
    /// [`RATE_PER_MAX_SAMPLE`] scaling
    pub fn aux_sample_rate(&self) -> f32 {
        self.aux_samples as f32 * RATE_PER_MAX_SAMPLE
    }

    /// Direct access to the command surface (trigger, base identity, ...)
    pub fn control(&mut self) -> Result<&mut ControlChannel> {
        self.control.as_mut().ok_or(Error::NotConnected)
    }

    /// Ask the base to pair the next sensor it hears into slot `n`
    pub fn pair_sensor(&mut self, n: u8) -> Result<String> {
        self.control()?.pair_sensor(n)
    }

    /// Switch a sensor's acquisition mode; effective from the next START
    pub fn set_sensor_mode(&mut self, n: u8, mode: u16) -> Result<String> {
        self.control()?.set_sensor_mode(n, mode)
    }

    fn data_host(&self) -> &str {
        if self.config.connection.host == MOCK_HOST {
            "127.0.0.1"
        } else {
            &self.config.connection.host
        }
    }

    /// Cancel, unblock and join every reader; keeps the worst outcome quiet
    fn teardown_readers(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for reader in &self.readers {
            reader.shutdown_socket();
        }
        for mut reader in self.readers.drain(..) {
            let kind = reader.kind();
            if let Err(e) = reader.join() {
                warn!("{kind} reader: {e}");
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

/// Verify (or in fast mode just request) little-endian framing
fn ensure_little_endian(control: &mut ControlChannel, fast_mode: bool) -> Result<()> {
    if fast_mode {
        control.set_endian_little()?;
        return Ok(());
    }
    let mut endian = control.endianness()?;
    if endian != "LITTLE" {
        warn!("base reports {endian} endian framing, requesting LITTLE");
        control.set_endian_little()?;
        endian = control.endianness()?;
    }
    if endian != "LITTLE" {
        return Err(Error::Protocol(format!(
            "base insists on {endian} endian framing"
        )));
    }
    Ok(())
}
