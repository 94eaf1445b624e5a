pub mod file;
pub mod memory;

mod channel;
mod ranges;

pub(crate) use channel::{BufferChannel, DrainState};
pub use ranges::{buffered_end_from, BufferedRange, TimeRanges};

use std::{future::Future, ops::Range, sync::Arc, time::Duration};

use bytes::Bytes;

use crate::{ShizukuResult, TrackKind};

/// Bytes handed to a media buffer, tagged with the timeline span of the
/// segment they belong to when that is known.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaChunk {
    pub data: Bytes,
    pub span: Option<Range<Duration>>,
}

/// Playback buffer of one track, fed one chunk at a time.
pub trait MediaBuffer: Send + Sync + 'static {
    /// Append a chunk. The returned future resolves once the buffer has
    /// finished processing it; no other append may start before that.
    fn append(&self, chunk: MediaChunk) -> impl Future<Output = ShizukuResult<()>> + Send;

    /// Cancel the current append or removal immediately.
    fn abort(&self);

    /// Clear a time range of buffered media.
    fn remove(&self, range: Range<Duration>) -> impl Future<Output = ShizukuResult<()>> + Send;

    /// Currently buffered time ranges, ordered and not overlapping.
    fn buffered(&self) -> Vec<BufferedRange>;
}

/// Creates the per-track media buffers once it is ready to accept them.
pub trait MediaSink: Send + Sync + 'static {
    type Buffer: MediaBuffer;

    /// Resolves once buffers may be created.
    fn ready(&self) -> impl Future<Output = ()> + Send;

    fn add_buffer(&self, kind: TrackKind, content_type: &str) -> ShizukuResult<Self::Buffer>;
}

impl<B> MediaBuffer for Arc<B>
where
    B: MediaBuffer,
{
    fn append(&self, chunk: MediaChunk) -> impl Future<Output = ShizukuResult<()>> + Send {
        self.as_ref().append(chunk)
    }

    fn abort(&self) {
        self.as_ref().abort()
    }

    fn remove(&self, range: Range<Duration>) -> impl Future<Output = ShizukuResult<()>> + Send {
        self.as_ref().remove(range)
    }

    fn buffered(&self) -> Vec<BufferedRange> {
        self.as_ref().buffered()
    }
}

impl<S> MediaSink for Arc<S>
where
    S: MediaSink,
{
    type Buffer = S::Buffer;

    fn ready(&self) -> impl Future<Output = ()> + Send {
        self.as_ref().ready()
    }

    fn add_buffer(&self, kind: TrackKind, content_type: &str) -> ShizukuResult<Self::Buffer> {
        self.as_ref().add_buffer(kind, content_type)
    }
}
