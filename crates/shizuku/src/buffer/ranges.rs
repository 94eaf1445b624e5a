use std::{ops::Range, time::Duration};

/// A `[start, end)` interval of buffered media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferedRange {
    pub start: Duration,
    pub end: Duration,
}

impl BufferedRange {
    pub fn new(start: Duration, end: Duration) -> Self {
        Self { start, end }
    }

    /// Whether the playback position `time` lies in this range. A position
    /// sitting exactly on the end still counts, as playback surfaces report it.
    pub fn contains(&self, time: Duration) -> bool {
        self.start <= time && time <= self.end
    }
}

impl From<Range<Duration>> for BufferedRange {
    fn from(range: Range<Duration>) -> Self {
        Self::new(range.start, range.end)
    }
}

/// Ordered, non-overlapping set of buffered ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeRanges {
    ranges: Vec<BufferedRange>,
}

impl TimeRanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ranges(&self) -> &[BufferedRange] {
        &self.ranges
    }

    pub fn to_vec(&self) -> Vec<BufferedRange> {
        self.ranges.clone()
    }

    /// Add a range, merging it with every range it touches.
    pub fn add(&mut self, range: impl Into<BufferedRange>) {
        let mut range = range.into();
        if range.start >= range.end {
            return;
        }

        let mut merged = Vec::with_capacity(self.ranges.len() + 1);
        for existing in self.ranges.drain(..) {
            if existing.end < range.start || existing.start > range.end {
                merged.push(existing);
            } else {
                range.start = range.start.min(existing.start);
                range.end = range.end.max(existing.end);
            }
        }
        merged.push(range);
        merged.sort_by_key(|r| r.start);
        self.ranges = merged;
    }

    /// Cut a range out, splitting ranges that straddle it.
    pub fn remove(&mut self, range: Range<Duration>) {
        if range.start >= range.end {
            return;
        }

        let mut kept = Vec::with_capacity(self.ranges.len() + 1);
        for existing in self.ranges.drain(..) {
            if existing.end <= range.start || existing.start >= range.end {
                kept.push(existing);
                continue;
            }
            if existing.start < range.start {
                kept.push(BufferedRange::new(existing.start, range.start));
            }
            if existing.end > range.end {
                kept.push(BufferedRange::new(range.end, existing.end));
            }
        }
        self.ranges = kept;
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// End of the range containing `time`.
    pub fn end_from(&self, time: Duration) -> Option<Duration> {
        buffered_end_from(&self.ranges, time)
    }
}

/// End of the first range of `ranges` containing `time`.
pub fn buffered_end_from(ranges: &[BufferedRange], time: Duration) -> Option<Duration> {
    ranges
        .iter()
        .find(|range| range.contains(time))
        .map(|range| range.end)
}
