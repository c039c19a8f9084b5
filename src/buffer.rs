//! Fixed-capacity ring of routed sample chunks
//!
//! One ring per sensor per signal kind. Holds the last `capacity` chunks and
//! the logical start sample of each, so consumers can both replay recent
//! history in order and spot gaps left by dropped device packets.

/// One routed slice of a stream frame: the rows belonging to a single sensor
#[derive(Debug, Clone, PartialEq)]
pub struct SampleChunk {
    /// Logical index of the first sample in this chunk
    pub start_sample: u64,
    /// Channel rows in this chunk
    pub channels: usize,
    /// Samples per channel
    pub samples: usize,
    /// Flat channel-major values, `channels * samples` long
    pub values: Vec<f32>,
}

impl SampleChunk {
    /// All samples of one channel row
    pub fn row(&self, channel: usize) -> &[f32] {
        &self.values[channel * self.samples..(channel + 1) * self.samples]
    }

    /// Logical index one past this chunk's last sample
    pub fn end_sample(&self) -> u64 {
        self.start_sample + self.samples as u64
    }
}

/// A break in the logical sample sequence between consecutive pushes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discontinuity {
    /// Start sample the previous chunk predicted
    pub expected: u64,
    /// Start sample actually pushed
    pub actual: u64,
}

/// Circular store of the last `capacity` chunks with O(1) push
///
/// Never grows and never blocks: once full, each push overwrites exactly the
/// oldest retained chunk. Written only by the data router; read through
/// [`iter_ordered`](SampleRing::iter_ordered) / [`latest`](SampleRing::latest).
#[derive(Debug)]
pub struct SampleRing {
    slots: Vec<Option<SampleChunk>>,
    /// Next write position
    idx: usize,
    /// Filled slot count, saturates at capacity
    len: usize,
    /// Start sample the next push should carry, per the previous chunk
    expected_next: Option<u64>,
    /// Discontinuities observed since allocation
    gaps: u64,
}

impl SampleRing {
    /// Create a ring holding the last `capacity` chunks; `capacity` must be
    /// nonzero
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be nonzero");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            idx: 0,
            len: 0,
            expected_next: None,
            gaps: 0,
        }
    }

    /// Append a chunk, overwriting the oldest once full - O(1)
    ///
    /// Returns the discontinuity if the chunk's start sample does not follow
    /// the previous chunk exactly; the chunk is stored either way.
    pub fn push(&mut self, chunk: SampleChunk) -> Option<Discontinuity> {
        let gap = match self.expected_next {
            Some(expected) if chunk.start_sample != expected => {
                self.gaps += 1;
                Some(Discontinuity {
                    expected,
                    actual: chunk.start_sample,
                })
            }
            _ => None,
        };
        self.expected_next = Some(chunk.end_sample());

        self.slots[self.idx] = Some(chunk);
        self.idx = (self.idx + 1) % self.slots.len();
        self.len = (self.len + 1).min(self.slots.len());
        gap
    }

    /// Buffered chunks from oldest to newest
    ///
    /// Non-destructive and restartable; the rotation by the write cursor makes
    /// the view start at the oldest retained chunk.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &SampleChunk> {
        let capacity = self.slots.len();
        let start = if self.len < capacity { 0 } else { self.idx };
        (0..self.len).filter_map(move |k| self.slots[(start + k) % capacity].as_ref())
    }

    /// Most recently written chunk - O(1)
    pub fn latest(&self) -> Option<&SampleChunk> {
        if self.len == 0 {
            return None;
        }
        let capacity = self.slots.len();
        self.slots[(self.idx + capacity - 1) % capacity].as_ref()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Discontinuities observed since allocation
    pub fn discontinuities(&self) -> u64 {
        self.gaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(start: u64, samples: usize) -> SampleChunk {
        SampleChunk {
            start_sample: start,
            channels: 1,
            samples,
            values: vec![start as f32; samples],
        }
    }

    fn starts(ring: &SampleRing) -> Vec<u64> {
        ring.iter_ordered().map(|c| c.start_sample).collect()
    }

    #[test]
    fn test_ordered_read_before_wrap() {
        let mut ring = SampleRing::new(4);
        assert!(ring.is_empty());
        ring.push(chunk(0, 10));
        ring.push(chunk(10, 10));
        assert_eq!(starts(&ring), vec![0, 10]);
        assert_eq!(ring.latest().unwrap().start_sample, 10);
    }

    #[test]
    fn test_overwrite_keeps_last_capacity_chunks() {
        // capacity 3, four pushes of 10 samples: oldest chunk evicted
        let mut ring = SampleRing::new(3);
        for start in [0, 10, 20, 30] {
            assert!(ring.push(chunk(start, 10)).is_none());
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(starts(&ring), vec![10, 20, 30]);
        assert_eq!(ring.latest().unwrap().start_sample, 30);
    }

    #[test]
    fn test_long_overwrite_stays_circular() {
        let mut ring = SampleRing::new(3);
        for i in 0..10u64 {
            ring.push(chunk(i * 5, 5));
        }
        assert_eq!(starts(&ring), vec![35, 40, 45]);
        assert_eq!(ring.discontinuities(), 0);
    }

    #[test]
    fn test_gap_flagged_without_data_loss() {
        // step should be 10; third push jumps to 25
        let mut ring = SampleRing::new(8);
        assert!(ring.push(chunk(0, 10)).is_none());
        assert!(ring.push(chunk(10, 10)).is_none());
        let gap = ring.push(chunk(25, 10)).unwrap();
        assert_eq!(gap, Discontinuity { expected: 20, actual: 25 });

        // the out-of-sequence chunk is still buffered
        assert_eq!(starts(&ring), vec![0, 10, 25]);
        assert_eq!(ring.discontinuities(), 1);

        // sequence resumes from the new position
        assert!(ring.push(chunk(35, 10)).is_none());
    }

    #[test]
    fn test_ordered_view_is_restartable() {
        let mut ring = SampleRing::new(2);
        ring.push(chunk(0, 4));
        ring.push(chunk(4, 4));
        let first: Vec<u64> = ring.iter_ordered().map(|c| c.start_sample).collect();
        let second: Vec<u64> = ring.iter_ordered().map(|c| c.start_sample).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_chunk_row_access() {
        let c = SampleChunk {
            start_sample: 0,
            channels: 2,
            samples: 3,
            values: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        };
        assert_eq!(c.row(0), &[1.0, 2.0, 3.0]);
        assert_eq!(c.row(1), &[4.0, 5.0, 6.0]);
        assert_eq!(c.end_sample(), 3);
    }
}
