use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, watch},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use super::{
    event::{Command, Event, FetchId},
    PlayerState, PlayerStatus,
};
use crate::{
    buffer::{buffered_end_from, BufferChannel, DrainState},
    config::PlayerConfig,
    fetch::{self, FetchRequest},
    manifest::{Manifest, ManifestProvider},
    monitor,
    quality::{QualityChange, QualitySelector},
    retry::RetryTimer,
    surface::{scale_by_rate, ReadyState},
    util::range::ByteRange,
    HttpClient, MediaBuffer, MediaSink, PlaybackSurface, QualitySelection, QualityTier,
    ShizukuError, ShizukuResult, SurfaceEvent, TrackKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchPhase {
    Requesting,
    Streaming,
    /// Failed, waiting for the retry timer.
    RetryPending,
}

/// What a finished video fetch reports back to the quality selector.
#[derive(Debug, Clone, Copy)]
struct ThroughputProbe {
    started_at: Instant,
    nominal: Duration,
}

struct ActiveFetch {
    id: FetchId,
    token: CancellationToken,
    phase: FetchPhase,
    segment: usize,
    quality: usize,
    probe: Option<ThroughputProbe>,
}

impl ActiveFetch {
    fn cancel(self) {
        self.token.cancel();
    }
}

/// State that only exists once the manifest is loaded.
struct Session<B: MediaBuffer> {
    manifest: Manifest,
    quality: QualitySelector,
    video: BufferChannel<B>,
    audio: BufferChannel<B>,
    video_fetch: Option<ActiveFetch>,
    audio_fetch: Option<ActiveFetch>,
    video_segment: usize,
    /// A continuation check deferred while the video track was busy.
    pending_check: Option<bool>,
}

impl<B: MediaBuffer> Session<B> {
    fn channel(&self, track: TrackKind) -> &BufferChannel<B> {
        match track {
            TrackKind::Video => &self.video,
            TrackKind::Audio => &self.audio,
        }
    }

    fn channel_mut(&mut self, track: TrackKind) -> &mut BufferChannel<B> {
        match track {
            TrackKind::Video => &mut self.video,
            TrackKind::Audio => &mut self.audio,
        }
    }

    fn fetch_mut(&mut self, track: TrackKind) -> &mut Option<ActiveFetch> {
        match track {
            TrackKind::Video => &mut self.video_fetch,
            TrackKind::Audio => &mut self.audio_fetch,
        }
    }

    /// The active fetch of `track` if it is the one with `id`.
    fn current(&mut self, track: TrackKind, id: FetchId) -> Option<&mut ActiveFetch> {
        self.fetch_mut(track).as_mut().filter(|fetch| fetch.id == id)
    }

    fn video_busy(&self) -> bool {
        self.video_fetch.is_some() || !self.video.is_idle()
    }

    /// Longest duration among the video representations.
    fn track_end(&self) -> Duration {
        self.manifest
            .video
            .representations
            .iter()
            .map(|representation| representation.timestamps.duration())
            .max()
            .unwrap_or_default()
    }

    /// Cancel the video fetch and drop whatever it still had queued.
    async fn cancel_video(&mut self) {
        if let Some(fetch) = self.video_fetch.take() {
            fetch.cancel();
        }
        self.video.abort().await;
        self.video.reinitialize();
    }

    async fn cancel_audio(&mut self) {
        if let Some(fetch) = self.audio_fetch.take() {
            fetch.cancel();
        }
        self.audio.abort().await;
        self.audio.reinitialize();
    }
}

pub(crate) struct Coordinator<M, S: MediaSink, P> {
    media_id: String,
    paused: bool,
    manifests: Arc<M>,
    sink: Arc<S>,
    surface: P,
    client: HttpClient,
    config: PlayerConfig,

    events: mpsc::UnboundedSender<Event>,
    status: watch::Sender<PlayerStatus>,
    shutdown: CancellationToken,

    state: PlayerState,
    sink_ready: bool,
    init_requested: bool,
    retry: RetryTimer,
    next_fetch: FetchId,
    session: Option<Session<S::Buffer>>,
}

impl<M, S, P> Coordinator<M, S, P>
where
    M: ManifestProvider,
    S: MediaSink,
    P: PlaybackSurface,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        media_id: String,
        paused: bool,
        manifests: M,
        sink: Arc<S>,
        surface: P,
        client: HttpClient,
        config: PlayerConfig,
        status: watch::Sender<PlayerStatus>,
    ) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let retry = RetryTimer::new(&config.retry);
        let coordinator = Self {
            media_id,
            paused,
            manifests: Arc::new(manifests),
            sink,
            surface,
            client,
            config,
            events,
            status,
            shutdown: CancellationToken::new(),
            state: PlayerState::Uninitialized,
            sink_ready: false,
            init_requested: false,
            retry,
            next_fetch: 0,
            session: None,
        };
        (coordinator, events_rx)
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        self.watch_sink();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(event) = events.recv() => self.handle_event(event).await,
            }
            self.publish();
        }

        self.teardown().await;
    }

    fn watch_sink(&self) {
        let sink = self.sink.clone();
        let events = self.events.clone();
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = sink.ready() => {
                    let _ = events.send(Event::SinkReady);
                }
            }
        });
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Initialize => {
                self.init_requested = true;
                self.maybe_initialize();
                self.recover_failed_tracks().await;
            }
            Command::SetPlaying(true) => {
                self.paused = false;
                self.surface.play();
                self.maybe_initialize();
            }
            Command::SetPlaying(false) => {
                self.paused = true;
                self.surface.pause();
            }
            Command::ChangeQuality(selection) => self.change_quality(selection).await,
            Command::Surface(event) => self.on_surface_event(event).await,
            Command::Shutdown => {}
        }
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::SinkReady => {
                tracing::debug!("Media sink is ready");
                self.sink_ready = true;
                self.maybe_initialize();
            }
            Event::ManifestLoaded(result) => self.on_manifest_loaded(result).await,
            Event::Responded { track, fetch } => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                if let Some(active) = session.current(track, fetch) {
                    active.phase = FetchPhase::Streaming;
                    self.retry.reset();
                }
            }
            Event::Chunk { track, fetch, data } => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                if session.current(track, fetch).is_some() {
                    session.channel_mut(track).push(data);
                }
            }
            Event::Finished {
                track: TrackKind::Video,
                fetch,
                result,
            } => self.on_video_finished(fetch, result).await,
            Event::Finished {
                track: TrackKind::Audio,
                fetch,
                result,
            } => self.on_audio_finished(fetch, result),
            Event::Rejected {
                track,
                fetch,
                error,
            } => {
                let current = self
                    .session
                    .as_mut()
                    .is_some_and(|session| session.current(track, fetch).is_some());
                if current {
                    tracing::warn!(?track, fetch, "Request failed: {error}");
                    self.schedule_retry(track, fetch);
                }
            }
            Event::RetryDue { track, fetch } => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                let due = session
                    .current(track, fetch)
                    .is_some_and(|active| active.phase == FetchPhase::RetryPending);
                if due {
                    match track {
                        TrackKind::Video => self.start_video_fetch(),
                        TrackKind::Audio => self.start_audio_fetch(),
                    }
                }
            }
            Event::Appended {
                track,
                epoch,
                len,
                result,
            } => self.on_appended(track, epoch, len, result).await,
        }
    }

    fn maybe_initialize(&mut self) {
        if self.state != PlayerState::Uninitialized || !self.sink_ready {
            return;
        }
        if self.paused && !self.init_requested {
            return;
        }
        self.initialize();
    }

    /// Load the manifest in the background, the result comes back as
    /// [`Event::ManifestLoaded`].
    fn initialize(&mut self) {
        self.state = PlayerState::Initializing;
        tracing::info!("Loading manifest of {}", self.media_id);

        let manifests = self.manifests.clone();
        let media_id = self.media_id.clone();
        let events = self.events.clone();
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = manifests.manifest(&media_id) => {
                    let _ = events.send(Event::ManifestLoaded(result));
                }
            }
        });
    }

    async fn on_manifest_loaded(&mut self, result: ShizukuResult<Manifest>) {
        if self.state != PlayerState::Initializing {
            return;
        }

        let session = match result.and_then(|manifest| self.open_session(manifest)) {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Failed to initialize {}: {e}", self.media_id);
                self.state = PlayerState::Unavailable(e.to_string());
                return;
            }
        };

        tracing::info!(
            qualities = session.manifest.video.representations.len(),
            segments = session.manifest.video.representations[session.quality.index()]
                .timestamps
                .len(),
            "Player initialized"
        );
        self.session = Some(session);
        self.state = PlayerState::Steady;

        self.start_audio_fetch();
        let time = self.surface.current_time();
        self.look_ahead(time, false, false).await;
    }

    fn open_session(&self, manifest: Manifest) -> ShizukuResult<Session<S::Buffer>> {
        if manifest.video.representations.is_empty() {
            return Err(ShizukuError::InvalidManifest(
                "video track has no representations".to_string(),
            ));
        }

        let video = self
            .sink
            .add_buffer(TrackKind::Video, &manifest.video.content_type())?;
        let audio = self
            .sink
            .add_buffer(TrackKind::Audio, &manifest.audio.content_type())?;

        Ok(Session {
            quality: QualitySelector::new(
                manifest.video.representations.len(),
                &self.config.quality,
            ),
            video: BufferChannel::new(TrackKind::Video, video, self.events.clone()),
            audio: BufferChannel::new(TrackKind::Audio, audio, self.events.clone()),
            manifest,
            video_fetch: None,
            audio_fetch: None,
            video_segment: 0,
            pending_check: None,
        })
    }

    async fn on_surface_event(&mut self, event: SurfaceEvent) {
        self.guard_completion().await;

        let time = self.surface.current_time();
        match event {
            SurfaceEvent::TimeUpdate => self.look_ahead(time, true, false).await,
            SurfaceEvent::Seeking => self.look_ahead(time, true, true).await,
            SurfaceEvent::Play => {}
        }
    }

    /// Pause once the playback position has reached the end of the media.
    async fn guard_completion(&mut self) {
        let Some(duration) = self.surface.duration() else {
            return;
        };
        if self.surface.ready_state() < ReadyState::HaveMetadata {
            return;
        }
        if self.surface.current_time().as_secs() < duration.as_secs() {
            return;
        }

        if !self.surface.is_paused() {
            tracing::info!("Reached the end of {}", self.media_id);
            self.surface.pause();
        }
        if let Some(session) = self.session.as_mut() {
            session.cancel_video().await;
        }
    }

    /// Check whether the video buffer covers the look-ahead window from
    /// `time` and start a fetch if it does not. Checks arriving while video
    /// is busy are deferred until it settles, seeks never are.
    async fn look_ahead(&mut self, time: Duration, next: bool, seeking: bool) {
        let window = scale_by_rate(self.config.fetch_time(), self.surface.playback_rate());
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.video.is_failed() {
            return;
        }
        if !seeking && session.video_busy() {
            session.pending_check = Some(next);
            return;
        }
        session.pending_check = None;

        let quality = session.quality.index();
        let decision = monitor::evaluate(
            time,
            next,
            &session.video.buffered(),
            &session.manifest.video.representations[quality].timestamps,
            window,
        );
        if !decision.needed {
            return;
        }
        if let Some(active) = &session.video_fetch {
            if active.segment == decision.target && active.quality == quality {
                return;
            }
        }

        tracing::debug!(
            time = ?time,
            target = decision.target,
            seeking,
            "Buffer ahead is short"
        );
        self.restart_video(decision.target).await;
    }

    async fn run_pending_check(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.video_busy() {
            return;
        }
        if let Some(next) = session.pending_check.take() {
            let time = self.surface.current_time();
            self.look_ahead(time, next, false).await;
        }
    }

    async fn restart_video(&mut self, segment: usize) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.cancel_video().await;
        session.video_segment = segment;
        self.start_video_fetch();
    }

    /// Fetch the current video segment, continuing after the bytes already
    /// received for it.
    fn start_video_fetch(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Some(previous) = session.video_fetch.take() {
            previous.cancel();
        }
        if session.video.is_failed() {
            return;
        }

        let quality = session.quality.index();
        let segment = session.video_segment;
        let representation = &session.manifest.video.representations[quality];
        let url = representation.url.clone();
        let timestamps = &representation.timestamps;
        let Some(range) = timestamps.segment_range(segment) else {
            tracing::debug!("No video segment after {}", segment.saturating_sub(1));
            return;
        };
        let span = timestamps.segment_span(segment);
        let nominal = timestamps.segment_duration(segment);

        let Some(range) = range.resume(session.video.resume_offset()) else {
            // the broken off fetch had already delivered every byte
            session.video.finish_segment();
            return;
        };
        session.video.begin_segment(Some(span));

        self.next_fetch += 1;
        let id = self.next_fetch;
        let token = self.shutdown.child_token();
        tracing::debug!(
            segment,
            quality,
            fetch = id,
            range = %range.to_http_range(),
            "Fetching video segment"
        );
        session.video_fetch = Some(ActiveFetch {
            id,
            token: token.clone(),
            phase: FetchPhase::Requesting,
            segment,
            quality,
            probe: Some(ThroughputProbe {
                started_at: Instant::now(),
                nominal,
            }),
        });

        let request = FetchRequest {
            track: TrackKind::Video,
            fetch: id,
            url,
            range,
        };
        tokio::spawn(fetch::stream_segment(
            self.client.clone(),
            request,
            token,
            self.events.clone(),
        ));
    }

    /// Fetch the rest of the audio track in one open-ended request.
    fn start_audio_fetch(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Some(previous) = session.audio_fetch.take() {
            previous.cancel();
        }
        if session.audio.is_failed() {
            return;
        }
        let Some(representation) = session.manifest.audio.representations.first() else {
            return;
        };

        let range = ByteRange::from_offset(session.audio.resume_offset());
        self.next_fetch += 1;
        let id = self.next_fetch;
        let token = self.shutdown.child_token();
        tracing::debug!(fetch = id, range = %range.to_http_range(), "Fetching audio");
        session.audio_fetch = Some(ActiveFetch {
            id,
            token: token.clone(),
            phase: FetchPhase::Requesting,
            segment: 0,
            quality: 0,
            probe: None,
        });

        let request = FetchRequest {
            track: TrackKind::Audio,
            fetch: id,
            url: representation.url.clone(),
            range,
        };
        tokio::spawn(fetch::stream_segment(
            self.client.clone(),
            request,
            token,
            self.events.clone(),
        ));
    }

    async fn on_video_finished(&mut self, fetch: FetchId, result: ShizukuResult<()>) {
        let rate = self.surface.playback_rate();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.current(TrackKind::Video, fetch).is_none() {
            return;
        }

        if let Err(e) = result {
            tracing::warn!(fetch, "Video segment {} broke off: {e}", session.video_segment);
            self.schedule_retry(TrackKind::Video, fetch);
            return;
        }

        let Some(active) = session.video_fetch.take() else {
            return;
        };
        session.video.finish_segment();
        tracing::debug!(segment = active.segment, "Video segment fetched");

        if let Some(probe) = active.probe {
            if active.quality == session.quality.index() {
                let elapsed = scale_by_rate(probe.started_at.elapsed(), rate);
                match session.quality.feedback(elapsed, probe.nominal) {
                    QualityChange::Hold => {}
                    change => tracing::info!(
                        elapsed = ?elapsed,
                        nominal = ?probe.nominal,
                        "Video quality {change:?} to {}",
                        session.quality.index()
                    ),
                }
            }
        }

        self.run_pending_check().await;
    }

    fn on_audio_finished(&mut self, fetch: FetchId, result: ShizukuResult<()>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.current(TrackKind::Audio, fetch).is_none() {
            return;
        }

        match result {
            Ok(()) => {
                session.audio_fetch = None;
                session.audio.finish_segment();
                tracing::info!("Audio track fully fetched");
            }
            Err(e) => {
                tracing::warn!(
                    fetch,
                    offset = session.audio.resume_offset(),
                    "Audio stream broke off, resuming: {e}"
                );
                self.start_audio_fetch();
            }
        }
    }

    /// Restart the fetch once the retry timer expires. The delay grows with
    /// every failure until a request gets a response again.
    fn schedule_retry(&mut self, track: TrackKind, fetch: FetchId) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(active) = session.current(track, fetch) else {
            return;
        };
        active.phase = FetchPhase::RetryPending;
        let token = active.token.clone();

        let delay = self.retry.time();
        self.retry.increase();
        tracing::info!(?track, fetch, "Retrying in {delay:?}");

        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = events.send(Event::RetryDue { track, fetch });
                }
            }
        });
    }

    async fn on_appended(
        &mut self,
        track: TrackKind,
        epoch: u64,
        len: usize,
        result: ShizukuResult<()>,
    ) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.channel_mut(track).on_appended(epoch, len, result) {
            DrainState::Stale | DrainState::Draining => {}
            DrainState::Idle => {
                if track == TrackKind::Video {
                    self.run_pending_check().await;
                }
            }
            DrainState::Failed(e) => {
                tracing::error!(?track, "Media buffer failed: {e}");
                if let Some(fetch) = session.fetch_mut(track).take() {
                    fetch.cancel();
                }
            }
        }
    }

    async fn change_quality(&mut self, selection: QualitySelection) {
        let time = self.surface.current_time();
        let Some(session) = self.session.as_mut() else {
            tracing::warn!("Quality change to {selection} before initialization");
            return;
        };
        match session.quality.select(selection) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                tracing::warn!("{e}");
                return;
            }
        }

        let quality = session.quality.index();
        tracing::info!(quality, "Video quality set to {selection}");

        session.cancel_video().await;
        let end = session.track_end();
        if let Err(e) = session.video.remove(Duration::ZERO..end).await {
            tracing::warn!("Failed to clear video buffer: {e}");
        }
        session.video_segment = session.manifest.video.representations[quality]
            .timestamps
            .position_at(time);
        self.start_video_fetch();
    }

    /// Give tracks whose buffer failed a fresh start at the playback position.
    async fn recover_failed_tracks(&mut self) {
        let time = self.surface.current_time();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let end = session.track_end();

        let video = session.video.is_failed();
        if video {
            tracing::info!("Recovering video track");
            session.cancel_video().await;
            session.video.recover();
            if let Err(e) = session.video.remove(Duration::ZERO..end).await {
                tracing::warn!("Failed to clear video buffer: {e}");
            }
            session.video_segment = session.manifest.video.representations
                [session.quality.index()]
            .timestamps
            .position_at(time);
        }

        let audio = session.audio.is_failed();
        if audio {
            tracing::info!("Recovering audio track");
            session.cancel_audio().await;
            session.audio.recover();
            if let Err(e) = session.audio.remove(Duration::ZERO..end).await {
                tracing::warn!("Failed to clear audio buffer: {e}");
            }
        }

        if video {
            self.start_video_fetch();
        }
        if audio {
            self.start_audio_fetch();
        }
    }

    fn snapshot(&self) -> PlayerStatus {
        let mut status = PlayerStatus {
            state: self.state.clone(),
            ..Default::default()
        };
        let Some(session) = &self.session else {
            return status;
        };

        let quality = session.quality.index();
        status.qualities = session
            .manifest
            .video
            .representations
            .iter()
            .enumerate()
            .map(|(index, representation)| QualityTier {
                label: representation.label(),
                index,
            })
            .collect();
        status.quality = session.quality.selection();
        status.video_quality = quality;
        status.video_segment = session.video_segment;
        status.video_fetching = session.video_fetch.is_some();
        status.duration = Some(
            session.manifest.video.representations[quality]
                .timestamps
                .duration(),
        );
        status.buffered_to =
            buffered_end_from(&session.video.buffered(), self.surface.current_time());
        status.failed_tracks = [TrackKind::Video, TrackKind::Audio]
            .into_iter()
            .filter(|track| session.channel(*track).is_failed())
            .collect();
        status
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.status.send_if_modified(|status| {
            if *status == snapshot {
                return false;
            }
            *status = snapshot;
            true
        });
    }

    async fn teardown(&mut self) {
        tracing::debug!("Stopping player of {}", self.media_id);
        self.shutdown.cancel();
        if let Some(session) = self.session.as_mut() {
            session.cancel_video().await;
            session.cancel_audio().await;
        }
    }
}
