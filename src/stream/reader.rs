//! Reader loop for one data stream
//!
//! Runs on its own thread. Accumulates exactly one frame's worth of bytes,
//! decodes, publishes to the kind's slot, rings the doorbell, repeats. Short
//! reads are normal; a zero read on a live connection means the base closed
//! the stream. The loop never hands a partial frame to the codec: shutdown
//! and closure both discard whatever is accumulated.

use super::FrameSlot;
use crate::error::Error;
use crate::protocol::frame::decode_frame;
use crate::protocol::StreamKind;
use crossbeam_channel::Sender;
use std::io::Read;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(super) fn reader_loop(
    kind: StreamKind,
    mut stream: TcpStream,
    samples: usize,
    slot: Arc<FrameSlot>,
    doorbell: Sender<StreamKind>,
    shutdown: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
) {
    let frame_len = kind.frame_len(samples);
    let mut buf = vec![0u8; frame_len];
    let mut filled = 0usize;
    let mut next_start: u64 = 0;

    log::info!(
        "{kind} reader started: {} channels x {samples} samples, {frame_len} bytes/frame",
        kind.total_channels()
    );

    while !shutdown.load(Ordering::Relaxed) {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => {
                if !shutdown.load(Ordering::Relaxed) {
                    log::error!("{}", Error::StreamClosed { kind });
                    failed.store(true, Ordering::Relaxed);
                }
                break;
            }
            Ok(n) => {
                filled += n;
                if filled < frame_len {
                    continue;
                }
                match decode_frame(kind, next_start, &buf) {
                    Ok(frame) => {
                        log::trace!("{kind} frame @{next_start}");
                        next_start += samples as u64;
                        if slot.publish(frame) {
                            log::trace!("{kind} slot overrun: replaced unconsumed frame");
                        }
                        let _ = doorbell.try_send(kind);
                    }
                    Err(e) => {
                        log::error!("{kind} reader: {e}");
                        failed.store(true, Ordering::Relaxed);
                        break;
                    }
                }
                filled = 0;
            }
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::Interrupted
                ) =>
            {
                // poll window elapsed; keep the partial accumulation and re-check shutdown
                continue;
            }
            Err(e) => {
                if !shutdown.load(Ordering::Relaxed) {
                    log::error!("{kind} reader socket error: {e}");
                    failed.store(true, Ordering::Relaxed);
                }
                break;
            }
        }
    }

    if filled > 0 {
        log::debug!("{kind} reader discarding {filled} byte partial frame");
    }
    log::info!("{kind} reader exiting");
}
