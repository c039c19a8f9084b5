//! Stream readers and the per-kind frame slots they publish into
//!
//! Each active [`StreamKind`] gets one dedicated reader thread doing blocking
//! reads on its own socket, and one [`FrameSlot`]: a single-slot latest-value
//! exchange. Publishing moves a whole decoded frame in; collecting moves it
//! out. There is no per-kind queue; history belongs to the ring buffers after
//! routing, the slot only carries "current".

mod reader;

use crate::error::{Error, Result};
use crate::protocol::{DataFrame, StreamKind};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Single-slot frame exchange between one reader and the aggregator
///
/// A new frame always replaces an unconsumed one; taking leaves the slot
/// empty. "Empty" is an expected state, expressed as `None`.
pub struct FrameSlot {
    kind: StreamKind,
    frame: Mutex<Option<DataFrame>>,
}

impl FrameSlot {
    pub fn new(kind: StreamKind) -> Self {
        Self {
            kind,
            frame: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Install a frame, returning true when an unconsumed one was replaced
    pub fn publish(&self, frame: DataFrame) -> bool {
        self.frame.lock().replace(frame).is_some()
    }

    /// Move the current frame out, if any
    pub fn take(&self) -> Option<DataFrame> {
        self.frame.lock().take()
    }
}

/// Supervision handle for one running reader thread
pub struct ReaderHandle {
    kind: StreamKind,
    handle: Option<JoinHandle<()>>,
    /// Cloned socket handle used to unblock the reader at shutdown
    socket: TcpStream,
    failed: Arc<AtomicBool>,
}

impl ReaderHandle {
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// True once the reader died on its own (closure or decode failure)
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    /// Close the data socket so a blocked read returns promptly
    pub fn shutdown_socket(&self) {
        let _ = self.socket.shutdown(Shutdown::Both);
    }

    /// Join the reader thread; must follow a shutdown signal + socket close
    pub fn join(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| Error::ThreadPanic)?;
        }
        Ok(())
    }
}

/// Spawn the reader thread for one stream
///
/// `stream` must already be connected to the kind's data port (and carry any
/// configured read timeout). `samples` is the discovered samples-per-frame
/// for this kind's signal; it fixes the exact frame size before the first
/// read.
pub fn spawn_reader(
    kind: StreamKind,
    stream: TcpStream,
    samples: usize,
    slot: Arc<FrameSlot>,
    doorbell: Sender<StreamKind>,
    shutdown: Arc<AtomicBool>,
) -> Result<ReaderHandle> {
    let socket = stream.try_clone()?;
    let failed = Arc::new(AtomicBool::new(false));
    let thread_failed = Arc::clone(&failed);
    let thread_shutdown = Arc::clone(&shutdown);
    let handle = thread::Builder::new()
        .name(format!("{kind}-reader"))
        .spawn(move || {
            reader::reader_loop(
                kind,
                stream,
                samples,
                slot,
                doorbell,
                thread_shutdown,
                thread_failed,
            );
        })
        .map_err(|e| Error::Other(format!("failed to spawn {kind} reader: {e}")))?;

    Ok(ReaderHandle {
        kind,
        handle: Some(handle),
        socket,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::{encode_frame, frame_from_values};
    use crossbeam_channel::bounded;
    use std::io::Write;
    use std::net::TcpListener;
    use std::time::Duration;

    fn test_frame(kind: StreamKind, start: u64, samples: usize, fill: f32) -> DataFrame {
        let values = vec![fill; kind.total_channels() * samples];
        frame_from_values(kind, start, samples, values).unwrap()
    }

    #[test]
    fn test_slot_move_semantics() {
        let slot = FrameSlot::new(StreamKind::AvantiEmg);
        assert!(slot.take().is_none());

        assert!(!slot.publish(test_frame(StreamKind::AvantiEmg, 0, 2, 1.0)));
        let taken = slot.take().unwrap();
        assert_eq!(taken.start_sample(), 0);
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_slot_keeps_latest_on_overrun() {
        let slot = FrameSlot::new(StreamKind::LegacyAux);
        assert!(!slot.publish(test_frame(StreamKind::LegacyAux, 0, 1, 1.0)));
        assert!(slot.publish(test_frame(StreamKind::LegacyAux, 1, 1, 2.0)));
        assert_eq!(slot.take().unwrap().start_sample(), 1);
    }

    /// Serve `frames` on an ephemeral listener, then run `after` on the
    /// accepted socket
    fn serve_frames(
        frames: Vec<DataFrame>,
        after: impl FnOnce(TcpStream) + Send + 'static,
    ) -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            for frame in &frames {
                sock.write_all(&encode_frame(frame)).unwrap();
            }
            sock.flush().unwrap();
            after(sock);
        });
        TcpStream::connect(addr).unwrap()
    }

    #[test]
    fn test_reader_decodes_and_publishes() {
        let kind = StreamKind::AvantiEmg;
        let samples = 3;
        let stream = serve_frames(
            vec![
                test_frame(kind, 0, samples, 1.5),
                test_frame(kind, 3, samples, 2.5),
            ],
            |sock| {
                // keep the connection up until the test is done reading
                thread::sleep(Duration::from_millis(300));
                drop(sock);
            },
        );

        let slot = Arc::new(FrameSlot::new(kind));
        let (tx, rx) = bounded(64);
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handle =
            spawn_reader(kind, stream, samples, Arc::clone(&slot), tx, Arc::clone(&shutdown))
                .unwrap();

        // two doorbell rings, one per frame
        rx.recv_timeout(Duration::from_secs(1)).unwrap();
        rx.recv_timeout(Duration::from_secs(1)).unwrap();

        // latest frame wins; counter advanced by samples-per-frame
        let frame = slot.take().unwrap();
        assert_eq!(frame.start_sample(), 3);
        assert_eq!(frame.row(0), &[2.5, 2.5, 2.5]);

        shutdown.store(true, Ordering::Relaxed);
        handle.shutdown_socket();
        handle.join().unwrap();
        assert!(!handle.has_failed());
    }

    #[test]
    fn test_peer_close_marks_failure_without_partial_publish() {
        let kind = StreamKind::LegacyEmg;
        let samples = 4;
        // half a frame, then the peer goes away
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let half = kind.frame_len(samples) / 2;
        thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            sock.write_all(&vec![0u8; half]).unwrap();
            sock.flush().unwrap();
        });

        let stream = TcpStream::connect(addr).unwrap();
        let slot = Arc::new(FrameSlot::new(kind));
        let (tx, rx) = bounded(64);
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handle =
            spawn_reader(kind, stream, samples, Arc::clone(&slot), tx, shutdown).unwrap();

        handle.join().unwrap();
        assert!(handle.has_failed());
        assert!(slot.take().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_shutdown_unblocks_idle_reader() {
        let kind = StreamKind::AvantiAux;
        // listener accepts but never sends a byte
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (sock, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(500));
            drop(sock);
        });

        let stream = TcpStream::connect(addr).unwrap();
        let slot = Arc::new(FrameSlot::new(kind));
        let (tx, _rx) = bounded(64);
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handle =
            spawn_reader(kind, stream, 2, Arc::clone(&slot), tx, Arc::clone(&shutdown)).unwrap();

        thread::sleep(Duration::from_millis(50));
        shutdown.store(true, Ordering::Relaxed);
        handle.shutdown_socket();
        handle.join().unwrap();

        // clean stop: no failure flag, no partial frame delivered
        assert!(!handle.has_failed());
        assert!(slot.take().is_none());
        server.join().unwrap();
    }
}
