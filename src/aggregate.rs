//! Round collection across the active stream readers
//!
//! The aggregator owns no sample data, only the per-kind frame slots and the
//! doorbell the readers ring after publishing. A round is one hand-off to the
//! data router. Two modes:
//!
//! - **Barrier**: wait until every active kind has a fresh frame, bounded by
//!   the round timeout; on expiry the round proceeds with whatever arrived
//!   (best-effort round).
//! - **Latest**: no waiting, take whatever is fresh right now.
//!
//! Freshness is per round: a frame taken into a round clears its slot, and a
//! frame arriving after its kind was already collected stays in the slot for
//! the next round.

use crate::protocol::{DataFrame, StreamKind};
use crate::stream::FrameSlot;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Doorbell depth; tokens are cheap and duplicates collapse at the sweep
pub const DOORBELL_CAPACITY: usize = 64;

/// Create the channel readers use to announce a fresh frame
pub fn doorbell() -> (Sender<StreamKind>, Receiver<StreamKind>) {
    crossbeam_channel::bounded(DOORBELL_CAPACITY)
}

/// How rounds are synchronized across kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Barrier,
    Latest,
}

/// One distribution round: the frames collected for routing
#[derive(Debug)]
pub struct Round {
    pub frames: Vec<DataFrame>,
    /// True when every active kind contributed a frame to this round
    pub complete: bool,
}

impl Round {
    pub fn frame(&self, kind: StreamKind) -> Option<&DataFrame> {
        self.frames.iter().find(|f| f.kind() == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Collects rounds from the per-kind slots
pub struct Aggregator {
    slots: Vec<Arc<FrameSlot>>,
    doorbell: Receiver<StreamKind>,
    mode: SyncMode,
    round_timeout: Duration,
}

impl Aggregator {
    pub fn new(
        slots: Vec<Arc<FrameSlot>>,
        doorbell: Receiver<StreamKind>,
        mode: SyncMode,
        round_timeout: Duration,
    ) -> Self {
        Self {
            slots,
            doorbell,
            mode,
            round_timeout,
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Kinds this aggregator is watching
    pub fn kinds(&self) -> Vec<StreamKind> {
        self.slots.iter().map(|s| s.kind()).collect()
    }

    /// Collect one round per the configured mode
    pub fn collect_round(&self) -> Round {
        match self.mode {
            SyncMode::Barrier => self.barrier_round(),
            SyncMode::Latest => self.latest_round(),
        }
    }

    fn latest_round(&self) -> Round {
        let frames: Vec<DataFrame> = self.slots.iter().filter_map(|s| s.take()).collect();
        let complete = frames.len() == self.slots.len();
        Round { frames, complete }
    }

    fn barrier_round(&self) -> Round {
        if self.slots.is_empty() {
            return Round {
                frames: Vec::new(),
                complete: true,
            };
        }

        let deadline = Instant::now() + self.round_timeout;
        let mut collected: Vec<Option<DataFrame>> = self.slots.iter().map(|s| s.take()).collect();

        while collected.iter().any(|c| c.is_none()) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match self.doorbell.recv_timeout(deadline - now) {
                // a token only says "something published"; sweep the holes
                Ok(_) | Err(RecvTimeoutError::Timeout) => {
                    for (i, slot) in self.slots.iter().enumerate() {
                        if collected[i].is_none() {
                            collected[i] = slot.take();
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let complete = collected.iter().all(|c| c.is_some());
        if !complete {
            let stale: Vec<String> = self
                .slots
                .iter()
                .zip(&collected)
                .filter(|(_, c)| c.is_none())
                .map(|(s, _)| s.kind().to_string())
                .collect();
            log::debug!(
                "best-effort round after {:?}: no fresh frame from {}",
                self.round_timeout,
                stale.join(", ")
            );
        }

        Round {
            frames: collected.into_iter().flatten().collect(),
            complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::frame_from_values;
    use std::thread;

    fn test_frame(kind: StreamKind, start: u64) -> DataFrame {
        let samples = 2;
        let values = vec![0.25; kind.total_channels() * samples];
        frame_from_values(kind, start, samples, values).unwrap()
    }

    fn two_slot_setup() -> (Vec<Arc<FrameSlot>>, Sender<StreamKind>, Receiver<StreamKind>) {
        let slots = vec![
            Arc::new(FrameSlot::new(StreamKind::AvantiEmg)),
            Arc::new(FrameSlot::new(StreamKind::AvantiAux)),
        ];
        let (tx, rx) = doorbell();
        (slots, tx, rx)
    }

    #[test]
    fn test_latest_mode_takes_what_is_there() {
        let (slots, _tx, rx) = two_slot_setup();
        slots[0].publish(test_frame(StreamKind::AvantiEmg, 0));

        let agg = Aggregator::new(slots.clone(), rx, SyncMode::Latest, Duration::ZERO);
        let round = agg.collect_round();
        assert_eq!(round.frames.len(), 1);
        assert!(!round.complete);
        assert!(round.frame(StreamKind::AvantiEmg).is_some());

        // nothing new: empty round, still instantaneous
        let round = agg.collect_round();
        assert!(round.is_empty());
    }

    #[test]
    fn test_barrier_completes_when_all_fresh() {
        let (slots, tx, rx) = two_slot_setup();
        slots[0].publish(test_frame(StreamKind::AvantiEmg, 0));
        slots[1].publish(test_frame(StreamKind::AvantiAux, 0));
        tx.try_send(StreamKind::AvantiEmg).unwrap();
        tx.try_send(StreamKind::AvantiAux).unwrap();

        let agg = Aggregator::new(slots.clone(), rx, SyncMode::Barrier, Duration::from_millis(500));
        let round = agg.collect_round();
        assert!(round.complete);
        assert_eq!(round.frames.len(), 2);

        // slots were drained into the round
        assert!(slots[0].take().is_none());
        assert!(slots[1].take().is_none());
    }

    #[test]
    fn test_barrier_timeout_proceeds_with_fresh_only() {
        let (slots, _tx, rx) = two_slot_setup();
        slots[1].publish(test_frame(StreamKind::AvantiAux, 40));

        let agg = Aggregator::new(slots, rx, SyncMode::Barrier, Duration::from_millis(50));
        let started = Instant::now();
        let round = agg.collect_round();
        let elapsed = started.elapsed();

        assert!(!round.complete);
        assert_eq!(round.frames.len(), 1);
        assert!(round.frame(StreamKind::AvantiAux).is_some());
        assert!(round.frame(StreamKind::AvantiEmg).is_none());
        assert!(elapsed >= Duration::from_millis(45), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(1));
    }

    #[test]
    fn test_barrier_wakes_on_late_publish() {
        let (slots, tx, rx) = two_slot_setup();
        slots[0].publish(test_frame(StreamKind::AvantiEmg, 0));

        let late_slot = Arc::clone(&slots[1]);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            late_slot.publish(test_frame(StreamKind::AvantiAux, 0));
            let _ = tx.try_send(StreamKind::AvantiAux);
        });

        let agg = Aggregator::new(slots, rx, SyncMode::Barrier, Duration::from_millis(500));
        let started = Instant::now();
        let round = agg.collect_round();

        assert!(round.complete);
        assert_eq!(round.frames.len(), 2);
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_stale_tokens_are_harmless() {
        let (slots, tx, rx) = two_slot_setup();
        // tokens with nothing behind them (frames already consumed elsewhere)
        tx.try_send(StreamKind::AvantiEmg).unwrap();
        tx.try_send(StreamKind::AvantiEmg).unwrap();

        let agg = Aggregator::new(slots.clone(), rx, SyncMode::Barrier, Duration::from_millis(30));
        let round = agg.collect_round();
        assert!(!round.complete);
        assert!(round.is_empty());

        // a real publish afterwards still gets through
        slots[0].publish(test_frame(StreamKind::AvantiEmg, 0));
        slots[1].publish(test_frame(StreamKind::AvantiAux, 0));
        let round = agg.collect_round();
        assert!(round.complete);
    }

    #[test]
    fn test_empty_barrier_returns_immediately() {
        let (_tx, rx) = doorbell();
        let agg = Aggregator::new(Vec::new(), rx, SyncMode::Barrier, Duration::from_secs(5));
        let started = Instant::now();
        let round = agg.collect_round();
        assert!(round.complete);
        assert!(round.is_empty());
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
