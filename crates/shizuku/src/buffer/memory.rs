use std::{
    collections::HashMap,
    ops::Range,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use bytes::Bytes;
use tokio::sync::watch;

use super::{BufferedRange, MediaBuffer, MediaChunk, MediaSink, TimeRanges};
use crate::{ShizukuError, ShizukuResult, TrackKind};

/// Sink keeping every appended chunk in memory.
pub struct MemorySink {
    ready: watch::Sender<bool>,
    buffers: Mutex<HashMap<TrackKind, (String, Arc<MemoryBuffer>)>>,
    append_delay: Option<Duration>,
}

impl MemorySink {
    /// A sink that is ready right away.
    pub fn new() -> Self {
        let sink = Self::pending();
        sink.open();
        sink
    }

    /// A sink that becomes ready once [`MemorySink::open`] is called.
    pub fn pending() -> Self {
        Self {
            ready: watch::Sender::new(false),
            buffers: Mutex::new(HashMap::new()),
            append_delay: None,
        }
    }

    /// Delay every append of the buffers created from now on.
    pub fn with_append_delay(mut self, delay: Duration) -> Self {
        self.append_delay = Some(delay);
        self
    }

    pub fn open(&self) {
        self.ready.send_replace(true);
    }

    pub fn buffer(&self, kind: TrackKind) -> Option<Arc<MemoryBuffer>> {
        lock(&self.buffers).get(&kind).map(|(_, buffer)| buffer.clone())
    }

    pub fn content_type(&self, kind: TrackKind) -> Option<String> {
        lock(&self.buffers)
            .get(&kind)
            .map(|(content_type, _)| content_type.clone())
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaSink for MemorySink {
    type Buffer = Arc<MemoryBuffer>;

    fn ready(&self) -> impl std::future::Future<Output = ()> + Send {
        let mut ready = self.ready.subscribe();
        async move {
            let _ = ready.wait_for(|ready| *ready).await;
        }
    }

    fn add_buffer(&self, kind: TrackKind, content_type: &str) -> ShizukuResult<Self::Buffer> {
        let mut buffer = MemoryBuffer::new(kind);
        buffer.append_delay = self.append_delay;
        let buffer = Arc::new(buffer);
        lock(&self.buffers).insert(kind, (content_type.to_string(), buffer.clone()));
        Ok(buffer)
    }
}

#[derive(Default)]
struct MemoryBufferState {
    chunks: Vec<Bytes>,
    ranges: TimeRanges,
    aborts: usize,
    removals: Vec<Range<Duration>>,
    fail_appends: bool,
}

/// In-memory media buffer. Buffered ranges follow the spans of the appended
/// chunks, or whatever was last set with [`MemoryBuffer::set_buffered`].
pub struct MemoryBuffer {
    kind: TrackKind,
    state: Mutex<MemoryBufferState>,
    append_delay: Option<Duration>,
}

impl MemoryBuffer {
    pub fn new(kind: TrackKind) -> Self {
        Self {
            kind,
            state: Mutex::new(MemoryBufferState::default()),
            append_delay: None,
        }
    }

    pub fn with_append_delay(mut self, delay: Duration) -> Self {
        self.append_delay = Some(delay);
        self
    }

    pub fn chunks(&self) -> Vec<Bytes> {
        lock(&self.state).chunks.clone()
    }

    /// Every appended byte, in append order.
    pub fn data(&self) -> Vec<u8> {
        lock(&self.state).chunks.concat()
    }

    pub fn aborts(&self) -> usize {
        lock(&self.state).aborts
    }

    pub fn removals(&self) -> Vec<Range<Duration>> {
        lock(&self.state).removals.clone()
    }

    pub fn set_buffered(&self, ranges: Vec<BufferedRange>) {
        let mut state = lock(&self.state);
        state.ranges.clear();
        for range in ranges {
            state.ranges.add(range);
        }
    }

    /// Make every following append fail, as a buffer fed malformed data would.
    pub fn fail_appends(&self, fail: bool) {
        lock(&self.state).fail_appends = fail;
    }
}

impl MediaBuffer for MemoryBuffer {
    async fn append(&self, chunk: MediaChunk) -> ShizukuResult<()> {
        if let Some(delay) = self.append_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.state);
        if state.fail_appends {
            return Err(ShizukuError::AppendError(
                self.kind,
                "buffer rejected the chunk".to_string(),
            ));
        }
        state.chunks.push(chunk.data);
        if let Some(span) = chunk.span {
            state.ranges.add(span);
        }
        Ok(())
    }

    fn abort(&self) {
        lock(&self.state).aborts += 1;
    }

    async fn remove(&self, range: Range<Duration>) -> ShizukuResult<()> {
        let mut state = lock(&self.state);
        state.ranges.remove(range.clone());
        state.removals.push(range);
        Ok(())
    }

    fn buffered(&self) -> Vec<BufferedRange> {
        lock(&self.state).ranges.to_vec()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
