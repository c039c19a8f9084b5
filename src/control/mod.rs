//! Plain-text command channel to the base station
//!
//! Commands and replies are ASCII strings, each closed by the 4-byte
//! terminator `\r\n\r\n`. One command is in flight at a time; a query waits up
//! to the configured window for its reply and fails with
//! [`Error::ControlTimeout`] otherwise. In fast mode every command is
//! fire-and-forget: the device still answers, but nobody reads it, which the
//! hardware tolerates.

use crate::error::{Error, Result};
use crate::protocol::CMD_TERMINATOR;
use crate::transport::Transport;
use std::thread;
use std::time::{Duration, Instant};

/// Which trigger edge a `TRIGGER` command addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEdge {
    Start,
    Stop,
}

impl TriggerEdge {
    fn as_word(&self) -> &'static str {
        match self {
            TriggerEdge::Start => "START",
            TriggerEdge::Stop => "STOP",
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

/// Synchronous command/reply channel, one command in flight
pub struct ControlChannel {
    transport: Box<dyn Transport>,
    reply_timeout: Duration,
    fast_mode: bool,
    /// Bytes read past the last terminator, kept for the next reply
    pending: Vec<u8>,
}

impl ControlChannel {
    pub fn new(transport: Box<dyn Transport>, reply_timeout: Duration, fast_mode: bool) -> Self {
        if fast_mode {
            log::warn!("control channel in fast mode: replies will not be read");
        }
        Self {
            transport,
            reply_timeout,
            fast_mode,
            pending: Vec::new(),
        }
    }

    /// Write one command without reading a reply (fire-and-forget)
    pub fn send(&mut self, command: &str) -> Result<()> {
        log::trace!("control send: {command:?}");
        self.transport.write(command.as_bytes())?;
        self.transport.write(CMD_TERMINATOR.as_bytes())?;
        self.transport.flush()
    }

    /// Send a command and return its trimmed reply
    ///
    /// In fast mode the reply is not read and an empty string is returned.
    pub fn query(&mut self, command: &str) -> Result<String> {
        self.send(command)?;
        if self.fast_mode {
            return Ok(String::new());
        }
        let reply = self.read_reply(command)?;
        log::trace!("control reply to {command:?}: {reply:?}");
        Ok(reply)
    }

    /// Send a command and require an exact reply
    pub fn query_expect(&mut self, command: &str, expected: &str) -> Result<()> {
        let reply = self.query(command)?;
        if self.fast_mode || reply == expected {
            Ok(())
        } else {
            Err(Error::Protocol(format!(
                "{command:?} answered {reply:?}, expected {expected:?}"
            )))
        }
    }

    fn query_int(&mut self, command: &str) -> Result<usize> {
        let reply = self.query(command)?;
        reply.parse::<usize>().map_err(|_| {
            Error::Protocol(format!("expected integer reply to {command:?}, got {reply:?}"))
        })
    }

    fn query_yes_no(&mut self, command: &str) -> Result<bool> {
        match self.query(command)?.as_str() {
            "YES" => Ok(true),
            "NO" => Ok(false),
            other => Err(Error::Protocol(format!(
                "expected YES/NO reply to {command:?}, got {other:?}"
            ))),
        }
    }

    /// Accumulate bytes until the terminator arrives or the window expires
    fn read_reply(&mut self, command: &str) -> Result<String> {
        let deadline = Instant::now() + self.reply_timeout;
        let mut buf = [0u8; 1024];
        loop {
            if let Some(pos) = find_terminator(&self.pending) {
                let reply: Vec<u8> = self.pending.drain(..pos + CMD_TERMINATOR.len()).collect();
                let text = String::from_utf8_lossy(&reply[..pos]).trim().to_string();
                return Ok(text);
            }
            if Instant::now() >= deadline {
                return Err(Error::ControlTimeout {
                    command: command.to_string(),
                });
            }
            let n = self.transport.read(&mut buf)?;
            if n == 0 {
                thread::sleep(Duration::from_millis(1));
            } else {
                self.pending.extend_from_slice(&buf[..n]);
            }
        }
    }

    /// Discard whatever the device sends unprompted (the connect banner)
    ///
    /// Reads until one quiet poll after data arrived, or until `window`
    /// passes with nothing at all. Best-effort; errors are ignored.
    pub fn drain(&mut self, window: Duration) -> usize {
        self.pending.clear();
        let deadline = Instant::now() + window;
        let mut discarded = 0;
        let mut buf = [0u8; 1024];
        loop {
            match self.transport.read(&mut buf) {
                Ok(0) => {
                    if discarded > 0 || Instant::now() >= deadline {
                        break;
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                Ok(n) => discarded += n,
                Err(e) => {
                    log::debug!("banner drain stopped: {e}");
                    break;
                }
            }
        }
        if discarded > 0 {
            log::debug!("drained {discarded} banner bytes");
        }
        discarded
    }

    // --- streaming control ---

    pub fn start_streaming(&mut self) -> Result<()> {
        self.query_expect("START", "OK")
    }

    pub fn stop_streaming(&mut self) -> Result<String> {
        self.query("STOP")
    }

    // --- frame geometry ---

    /// Samples per frame on the EMG ports
    pub fn max_emg_samples(&mut self) -> Result<usize> {
        self.query_int("MAX SAMPLES EMG")
    }

    /// Samples per frame on the AUX ports
    pub fn max_aux_samples(&mut self) -> Result<usize> {
        self.query_int("MAX SAMPLES AUX")
    }

    // --- per-sensor metadata ---

    pub fn is_paired(&mut self, n: u8) -> Result<bool> {
        self.query_yes_no(&format!("SENSOR {n} PAIRED?"))
    }

    /// Raw type code: `"O"` Avanti, `"A"` Legacy, `"23"` goniometer adapter
    pub fn sensor_type_code(&mut self, n: u8) -> Result<String> {
        self.query(&format!("SENSOR {n} TYPE?"))
    }

    pub fn emg_channel_count(&mut self, n: u8) -> Result<usize> {
        self.query_int(&format!("SENSOR {n} EMGCHANNELCOUNT?"))
    }

    pub fn aux_channel_count(&mut self, n: u8) -> Result<usize> {
        self.query_int(&format!("SENSOR {n} AUXCHANNELCOUNT?"))
    }

    pub fn start_index(&mut self, n: u8) -> Result<usize> {
        self.query_int(&format!("SENSOR {n} STARTINDEX?"))
    }

    pub fn sensor_mode(&mut self, n: u8) -> Result<String> {
        self.query(&format!("SENSOR {n} MODE?"))
    }

    pub fn pair_sensor(&mut self, n: u8) -> Result<String> {
        self.query(&format!("SENSOR {n} PAIR"))
    }

    pub fn set_sensor_mode(&mut self, n: u8, mode: u16) -> Result<String> {
        self.query(&format!("SENSOR {n} SETMODE {mode}"))
    }

    // --- base station options ---

    pub fn trigger_state(&mut self) -> Result<String> {
        self.query("TRIGGER?")
    }

    pub fn set_trigger(&mut self, edge: TriggerEdge, on: bool) -> Result<String> {
        self.query(&format!("TRIGGER {} {}", edge.as_word(), on_off(on)))
    }

    pub fn backwards_compatibility(&mut self) -> Result<String> {
        self.query("BACKWARDS COMPATIBILITY?")
    }

    pub fn set_backwards_compatibility(&mut self, on: bool) -> Result<String> {
        self.query(&format!("BACKWARDS COMPATIBILITY {}", on_off(on)))
    }

    pub fn upsampling(&mut self) -> Result<String> {
        self.query("UPSAMPLING?")
    }

    pub fn set_upsampling(&mut self, on: bool) -> Result<String> {
        self.query(&format!("UPSAMPLE {}", on_off(on)))
    }

    pub fn endianness(&mut self) -> Result<String> {
        self.query("ENDIANNESS?")
    }

    pub fn set_endian_little(&mut self) -> Result<String> {
        self.query("ENDIAN LITTLE")
    }

    pub fn base_serial(&mut self) -> Result<String> {
        self.query("BASE SERIAL?")
    }

    pub fn base_firmware(&mut self) -> Result<String> {
        self.query("BASE FIRMWARE?")
    }
}

pub(crate) fn find_terminator(buf: &[u8]) -> Option<usize> {
    let term = CMD_TERMINATOR.as_bytes();
    if buf.len() < term.len() {
        return None;
    }
    (0..=buf.len() - term.len()).find(|&i| &buf[i..i + term.len()] == term)
}
