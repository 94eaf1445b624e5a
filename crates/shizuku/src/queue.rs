use std::collections::VecDeque;

use bytes::Bytes;

/// Chunks of one track waiting to be appended to its media buffer.
///
/// `piping` is set while chunks are drained one at a time into the buffer and
/// only cleared when a drain attempt finds the queue empty. `bytes_written`
/// counts the bytes of the current segment that already reached the buffer.
#[derive(Debug, Default)]
pub struct SegmentQueue {
    chunks: VecDeque<Bytes>,
    piping: bool,
    bytes_written: u64,
}

impl SegmentQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: Bytes) {
        self.chunks.push_back(chunk);
    }

    pub fn pop_first(&mut self) -> Option<Bytes> {
        self.chunks.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_piping(&self) -> bool {
        self.piping
    }

    pub fn set_piping(&mut self, piping: bool) {
        self.piping = piping;
    }

    /// Drop every pending chunk and forget all progress of the current segment.
    pub fn reinitialize(&mut self) {
        self.chunks.clear();
        self.piping = false;
        self.bytes_written = 0;
    }

    pub fn reset_byte_counter(&mut self) {
        self.bytes_written = 0;
    }

    pub fn record_appended(&mut self, len: usize) {
        self.bytes_written += len as u64;
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Bytes received but not yet appended.
    pub fn pending_bytes(&self) -> u64 {
        self.chunks.iter().map(|chunk| chunk.len() as u64).sum()
    }
}
