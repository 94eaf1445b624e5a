use std::time::Duration;

use crate::{buffer::BufferedRange, manifest::TimestampIndex};

/// Where the video track should continue and whether it has to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookAhead {
    /// Segment position the next fetch starts at.
    pub target: usize,
    /// Whether the buffer falls short of the look-ahead window.
    pub needed: bool,
    /// Whether `time` lies inside a buffered range.
    pub buffered: bool,
}

/// Decide whether more video must be fetched for playback position `time`.
///
/// When `time` is inside a buffered range, the last segment starting before
/// the range end is the most recent fully buffered one. No fetch is needed
/// while the range reaches `window` past `time` or the end of the track;
/// otherwise a continuation check (`next`) resumes right after that segment.
///
/// Outside every range a continuation check resolves the segment holding
/// `time` and always needs a fetch. A non-continuation check outside every
/// range starts from the first segment.
pub fn evaluate(
    time: Duration,
    next: bool,
    buffered: &[BufferedRange],
    index: &TimestampIndex,
    window: Duration,
) -> LookAhead {
    let found = buffered.iter().find(|range| range.contains(time));

    let Some(range) = found else {
        let target = if next { index.position_at(time) } else { 0 };
        return LookAhead {
            target,
            needed: true,
            buffered: false,
        };
    };

    let saved = index.position_at(range.end);
    let needed = range.end < time.saturating_add(window) && range.end < index.duration();
    LookAhead {
        target: if next { saved + 1 } else { saved },
        needed,
        buffered: true,
    }
}
