use std::{ops::Range, sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::{sync::mpsc, task::JoinHandle};

use super::{BufferedRange, MediaBuffer, MediaChunk};
use crate::{player::event::Event, queue::SegmentQueue, ShizukuError, ShizukuResult, TrackKind};

/// Outcome of an append completion handed back to the channel.
#[derive(Debug)]
pub(crate) enum DrainState {
    /// The completion belongs to work dropped by a reinitialize.
    Stale,
    /// Another chunk is being appended.
    Draining,
    /// The queue is empty and nothing is being appended.
    Idle,
    /// The buffer refused the chunk.
    Failed(ShizukuError),
}

/// Serializes the chunks of one track into its media buffer.
///
/// At most one append is in flight. Its completion comes back to the
/// coordinator as [`Event::Appended`] tagged with the channel epoch, and
/// [`BufferChannel::on_appended`] then starts the next one. Reinitializing
/// bumps the epoch so completions of dropped work are recognised as stale.
pub(crate) struct BufferChannel<B: MediaBuffer> {
    kind: TrackKind,
    buffer: Arc<B>,
    queue: SegmentQueue,
    epoch: u64,
    in_flight: Option<JoinHandle<()>>,
    span: Option<Range<Duration>>,
    reset_when_drained: bool,
    failed: bool,
    events: mpsc::UnboundedSender<Event>,
}

impl<B: MediaBuffer> BufferChannel<B> {
    pub(crate) fn new(kind: TrackKind, buffer: B, events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            kind,
            buffer: Arc::new(buffer),
            queue: SegmentQueue::new(),
            epoch: 0,
            in_flight: None,
            span: None,
            reset_when_drained: false,
            failed: false,
            events,
        }
    }

    pub(crate) fn queue(&self) -> &SegmentQueue {
        &self.queue
    }

    /// Timeline span of the segment currently being fed.
    pub(crate) fn begin_segment(&mut self, span: Option<Range<Duration>>) {
        self.span = span;
        self.reset_when_drained = false;
    }

    /// Bytes of the current segment already received: appended or still queued.
    pub(crate) fn resume_offset(&self) -> u64 {
        self.queue.bytes_written() + self.queue.pending_bytes()
    }

    pub(crate) fn is_idle(&self) -> bool {
        !self.queue.is_piping()
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.failed
    }

    pub(crate) fn push(&mut self, data: Bytes) {
        if self.failed {
            return;
        }
        self.queue.push(data);
        if !self.queue.is_piping() {
            self.drain_one();
        }
    }

    /// The fetch of the current segment completed. The byte counter is reset
    /// once everything received has reached the buffer.
    pub(crate) fn finish_segment(&mut self) {
        if self.queue.is_empty() && !self.queue.is_piping() {
            self.queue.reset_byte_counter();
        } else {
            self.reset_when_drained = true;
        }
    }

    pub(crate) fn on_appended(
        &mut self,
        epoch: u64,
        len: usize,
        result: ShizukuResult<()>,
    ) -> DrainState {
        if epoch != self.epoch {
            return DrainState::Stale;
        }
        self.in_flight = None;

        if let Err(e) = result {
            self.failed = true;
            self.queue.reinitialize();
            return DrainState::Failed(e);
        }

        self.queue.record_appended(len);
        if self.drain_one() {
            return DrainState::Draining;
        }

        self.queue.set_piping(false);
        if self.reset_when_drained {
            self.queue.reset_byte_counter();
            self.reset_when_drained = false;
        }
        DrainState::Idle
    }

    /// Abort the in-flight append and wait until it has settled.
    pub(crate) async fn abort(&mut self) {
        let in_flight = self.in_flight.take();
        if let Some(handle) = &in_flight {
            handle.abort();
        }
        self.buffer.abort();
        if let Some(handle) = in_flight {
            // cancelled appends resolve with a JoinError, nothing to report
            let _ = handle.await;
        }
    }

    /// Drop everything queued and forget the current segment.
    pub(crate) fn reinitialize(&mut self) {
        self.queue.reinitialize();
        self.epoch += 1;
        self.span = None;
        self.reset_when_drained = false;
    }

    /// Bring a failed channel back into service.
    pub(crate) fn recover(&mut self) {
        self.reinitialize();
        self.failed = false;
    }

    pub(crate) async fn remove(&self, range: Range<Duration>) -> ShizukuResult<()> {
        self.buffer.remove(range).await
    }

    pub(crate) fn buffered(&self) -> Vec<BufferedRange> {
        self.buffer.buffered()
    }

    /// Start appending the oldest queued chunk. Returns `false` when the
    /// queue was empty.
    fn drain_one(&mut self) -> bool {
        self.queue.set_piping(true);
        let Some(data) = self.queue.pop_first() else {
            return false;
        };

        let len = data.len();
        let chunk = MediaChunk {
            data,
            span: self.span.clone(),
        };
        let buffer = self.buffer.clone();
        let events = self.events.clone();
        let track = self.kind;
        let epoch = self.epoch;
        self.in_flight = Some(tokio::spawn(async move {
            let result = buffer.append(chunk).await;
            let _ = events.send(Event::Appended {
                track,
                epoch,
                len,
                result,
            });
        }));
        true
    }
}

impl<B: MediaBuffer> Drop for BufferChannel<B> {
    fn drop(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}
