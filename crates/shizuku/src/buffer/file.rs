use std::{
    collections::HashMap,
    ops::Range,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use tokio::{fs::File, io::AsyncWriteExt};

use super::{BufferedRange, MediaBuffer, MediaChunk, MediaSink, TimeRanges};
use crate::{ShizukuError, ShizukuResult, TrackKind};

/// Sink dumping every track into `<output_dir>/<track>.<ext>`.
pub struct FileSink {
    output_dir: PathBuf,
    buffers: Mutex<HashMap<TrackKind, Arc<FileBuffer>>>,
}

impl FileSink {
    pub fn new<P>(output_dir: P) -> ShizukuResult<Self>
    where
        P: Into<PathBuf>,
    {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;

        Ok(Self {
            output_dir,
            buffers: Mutex::new(HashMap::new()),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn buffer(&self, kind: TrackKind) -> Option<Arc<FileBuffer>> {
        lock(&self.buffers).get(&kind).cloned()
    }
}

impl MediaSink for FileSink {
    type Buffer = Arc<FileBuffer>;

    async fn ready(&self) {}

    fn add_buffer(&self, kind: TrackKind, content_type: &str) -> ShizukuResult<Self::Buffer> {
        let path = self.output_dir.join(file_name(kind, content_type));
        let file = std::fs::File::create(&path)
            .map_err(|e| ShizukuError::BufferCreateError(kind, e.to_string()))?;
        tracing::info!("Writing {kind:?} track to {}", path.display());

        let buffer = Arc::new(FileBuffer {
            path,
            file: tokio::sync::Mutex::new(File::from_std(file)),
            ranges: Mutex::new(TimeRanges::new()),
            written: AtomicU64::new(0),
        });
        lock(&self.buffers).insert(kind, buffer.clone());
        Ok(buffer)
    }
}

/// File-backed media buffer. Bytes are only ever appended to the file;
/// removals drop the buffered bookkeeping.
pub struct FileBuffer {
    path: PathBuf,
    file: tokio::sync::Mutex<File>,
    ranges: Mutex<TimeRanges>,
    written: AtomicU64,
}

impl FileBuffer {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

impl MediaBuffer for FileBuffer {
    async fn append(&self, chunk: MediaChunk) -> ShizukuResult<()> {
        let mut file = self.file.lock().await;
        file.write_all(&chunk.data).await?;
        file.flush().await?;
        drop(file);

        self.written
            .fetch_add(chunk.data.len() as u64, Ordering::Relaxed);
        if let Some(span) = chunk.span {
            lock(&self.ranges).add(span);
        }
        Ok(())
    }

    fn abort(&self) {
        tracing::debug!("Append to {} aborted", self.path.display());
    }

    async fn remove(&self, range: Range<Duration>) -> ShizukuResult<()> {
        lock(&self.ranges).remove(range);
        Ok(())
    }

    fn buffered(&self) -> Vec<BufferedRange> {
        lock(&self.ranges).to_vec()
    }
}

/// `video/webm; codecs="vp9"` becomes `video.webm`.
fn file_name(kind: TrackKind, content_type: &str) -> String {
    let name = match kind {
        TrackKind::Video => "video",
        TrackKind::Audio => "audio",
    };
    let ext = content_type
        .split(';')
        .next()
        .and_then(|mime| mime.split_once('/'))
        .map(|(_, subtype)| subtype.trim())
        .filter(|ext| !ext.is_empty())
        .unwrap_or("bin");
    format!("{name}.{ext}")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
