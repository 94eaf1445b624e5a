use bytes::Bytes;

use crate::{Manifest, QualitySelection, ShizukuError, ShizukuResult, SurfaceEvent, TrackKind};

pub(crate) type FetchId = u64;

/// Requests from the [`Player`](super::Player) handle.
#[derive(Debug)]
pub(crate) enum Command {
    Initialize,
    SetPlaying(bool),
    ChangeQuality(QualitySelection),
    Surface(SurfaceEvent),
    Shutdown,
}

/// Completions of work the coordinator spawned.
#[derive(Debug)]
pub(crate) enum Event {
    SinkReady,
    ManifestLoaded(ShizukuResult<Manifest>),
    /// Response headers of a fetch arrived.
    Responded { track: TrackKind, fetch: FetchId },
    Chunk {
        track: TrackKind,
        fetch: FetchId,
        data: Bytes,
    },
    /// The body of a fetch ended, or broke off while streaming.
    Finished {
        track: TrackKind,
        fetch: FetchId,
        result: ShizukuResult<()>,
    },
    /// The request of a fetch failed before any body arrived.
    Rejected {
        track: TrackKind,
        fetch: FetchId,
        error: ShizukuError,
    },
    RetryDue { track: TrackKind, fetch: FetchId },
    Appended {
        track: TrackKind,
        epoch: u64,
        len: usize,
        result: ShizukuResult<()>,
    },
}
