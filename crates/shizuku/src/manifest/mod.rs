mod http;
mod raw;

pub use http::{HttpManifestProvider, DEFAULT_MANIFEST_PATH};
pub(crate) use raw::RawManifest;

use std::{future::Future, ops::Range, time::Duration};

use reqwest::Url;

use crate::{util::range::ByteRange, ShizukuError, ShizukuResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        if mime_type.starts_with("video") {
            Some(Self::Video)
        } else if mime_type.starts_with("audio") {
            Some(Self::Audio)
        } else {
            None
        }
    }
}

/// One segment position: where it starts on the timeline and which bytes of
/// the representation hold it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampEntry {
    pub timecode: Duration,
    /// First byte of the segment.
    pub start: u64,
    /// Last byte of the segment, inclusive.
    pub end: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimestampIndex {
    entries: Vec<TimestampEntry>,
    duration: Duration,
}

impl TimestampIndex {
    pub fn new(entries: Vec<TimestampEntry>, duration: Duration) -> ShizukuResult<Self> {
        if entries.is_empty() {
            return Err(ShizukuError::InvalidManifest(
                "timestamp index has no entries".to_string(),
            ));
        }
        for (index, pair) in entries.windows(2).enumerate() {
            if pair[1].timecode < pair[0].timecode {
                return Err(ShizukuError::InvalidManifest(format!(
                    "timecode of entry {} goes backwards",
                    index + 1
                )));
            }
        }
        if let Some(entry) = entries.iter().find(|entry| entry.start > entry.end) {
            return Err(ShizukuError::InvalidManifest(format!(
                "invalid byte range {}-{}",
                entry.start, entry.end
            )));
        }

        Ok(Self { entries, duration })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TimestampEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[TimestampEntry] {
        &self.entries
    }

    /// Total duration of the track.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Segment to continue from for a position on the timeline: the entry
    /// before the first one whose timecode is at or after `time`, or the last
    /// entry when every timecode is before `time`.
    ///
    /// Stepping back from the first entry stays on it rather than wrapping
    /// around to the last entry.
    pub fn position_at(&self, time: Duration) -> usize {
        match self.entries.iter().position(|entry| entry.timecode >= time) {
            Some(0) => 0,
            Some(index) => index - 1,
            None => self.entries.len().saturating_sub(1),
        }
    }

    /// Nominal playback duration of the segment at `index`.
    pub fn segment_duration(&self, index: usize) -> Duration {
        let span = self.segment_span(index);
        span.end.saturating_sub(span.start)
    }

    pub fn segment_span(&self, index: usize) -> Range<Duration> {
        let Some(entry) = self.entries.get(index) else {
            return self.duration..self.duration;
        };
        let end = match self.entries.get(index + 1) {
            Some(next) => next.timecode,
            None => self.duration.max(entry.timecode),
        };
        entry.timecode..end
    }

    /// Bytes to request for the segment at `index`. The first segment starts
    /// at the beginning of the representation so the container header comes
    /// along with it.
    pub fn segment_range(&self, index: usize) -> Option<ByteRange> {
        let entry = self.entries.get(index)?;
        let start = if index == 0 { 0 } else { entry.start };
        Some(ByteRange::inclusive(start, entry.end))
    }
}

/// One quality tier of a track.
#[derive(Debug, Clone, PartialEq)]
pub struct Representation {
    pub url: Url,
    pub timestamps: TimestampIndex,
}

impl Representation {
    /// Human readable tier name, taken from the file name of the
    /// representation: `.../720p_video.webm` is labelled `720p`.
    pub fn label(&self) -> String {
        self.url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|name| name.split('_').next())
            .filter(|label| !label.is_empty())
            .unwrap_or("unknown")
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackDescriptor {
    pub kind: TrackKind,
    pub mime_type: String,
    pub codecs: String,
    /// Ordered by ascending quality.
    pub representations: Vec<Representation>,
}

impl TrackDescriptor {
    pub fn content_type(&self) -> String {
        format!(r#"{}; codecs="{}""#, self.mime_type, self.codecs)
    }

    pub fn max_quality(&self) -> usize {
        self.representations.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub video: TrackDescriptor,
    pub audio: TrackDescriptor,
}

impl Manifest {
    pub fn track(&self, kind: TrackKind) -> &TrackDescriptor {
        match kind {
            TrackKind::Video => &self.video,
            TrackKind::Audio => &self.audio,
        }
    }

    /// Parse a JSON manifest, resolving representation paths against `base_url`.
    pub fn from_json(data: &[u8], base_url: &Url) -> ShizukuResult<Self> {
        let raw: RawManifest = serde_json::from_slice(data)?;
        raw.into_manifest(base_url)
    }
}

/// Source of the per-track descriptions of a media item.
pub trait ManifestProvider: Send + Sync + 'static {
    fn manifest(&self, media_id: &str) -> impl Future<Output = ShizukuResult<Manifest>> + Send;
}
