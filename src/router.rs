//! Distribution of decoded frames into per-sensor ring buffers
//!
//! For each frame in a round, every paired sensor of the frame's family gets
//! the rows of its channel range, pushed into the matching ring with the
//! frame's logical start sample. A descriptor whose range does not fit the
//! frame is a recoverable mismatch: logged, skipped, and the rest of the
//! round continues.

use crate::aggregate::Round;
use crate::buffer::SampleChunk;
use crate::error::Error;
use crate::protocol::DataFrame;
use crate::sensors::SensorRegistry;

/// Outcome counters for one routing pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RouteStats {
    /// Ring pushes performed
    pub sensors_updated: usize,
    /// Sensors skipped because their range fell outside the frame
    pub mismatches: usize,
    /// Pushes that arrived with a non-contiguous start sample
    pub discontinuities: usize,
}

impl RouteStats {
    fn absorb(&mut self, other: RouteStats) {
        self.sensors_updated += other.sensors_updated;
        self.mismatches += other.mismatches;
        self.discontinuities += other.discontinuities;
    }
}

/// Route every frame of a round into the registry
pub fn route_round(round: &Round, registry: &mut SensorRegistry) -> RouteStats {
    let mut stats = RouteStats::default();
    for frame in &round.frames {
        stats.absorb(route_frame(frame, registry));
    }
    stats
}

/// Route one frame into all matching sensors
pub fn route_frame(frame: &DataFrame, registry: &mut SensorRegistry) -> RouteStats {
    let mut stats = RouteStats::default();
    let kind = frame.kind();
    let signal = kind.signal();

    for entry in registry.entries_mut() {
        if entry.descriptor.family() != kind.family() {
            continue;
        }
        let range = entry.descriptor.range(signal);
        if range.is_empty() {
            continue;
        }

        let Some(span) = frame.row_span(range.start, range.end) else {
            log::warn!(
                "{}",
                Error::RoutingMismatch {
                    sensor: entry.descriptor.index,
                    lo: range.start,
                    hi: range.end,
                    rows: frame.channels(),
                }
            );
            stats.mismatches += 1;
            continue;
        };

        let chunk = SampleChunk {
            start_sample: frame.start_sample(),
            channels: range.len(),
            samples: frame.samples(),
            values: span.to_vec(),
        };
        if let Some(gap) = entry.ring_mut(signal).push(chunk) {
            log::warn!(
                "sensor {} {signal} stream: {}",
                entry.descriptor.index,
                Error::Discontinuity {
                    expected: gap.expected,
                    actual: gap.actual,
                }
            );
            stats.discontinuities += 1;
        }
        stats.sensors_updated += 1;
    }
    stats
}
