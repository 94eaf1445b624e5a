mod coordinator;
pub(crate) mod event;

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    config::PlayerConfig, manifest::ManifestProvider, HttpClient, MediaSink, PlaybackSurface,
    QualitySelection, QualityTier, ShizukuError, ShizukuResult, SurfaceEvent, TrackKind,
};
use coordinator::Coordinator;
use event::Command;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum PlayerState {
    #[default]
    Uninitialized,
    Initializing,
    Steady,
    /// Playback cannot start, with the reason.
    Unavailable(String),
}

/// Snapshot of the player, published after every state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStatus {
    pub state: PlayerState,
    pub qualities: Vec<QualityTier>,
    pub quality: QualitySelection,
    /// Index of the video representation in use, also in automatic mode.
    pub video_quality: usize,
    pub video_segment: usize,
    pub video_fetching: bool,
    pub duration: Option<Duration>,
    /// End of the buffered video range around the playback position.
    pub buffered_to: Option<Duration>,
    pub failed_tracks: Vec<TrackKind>,
}

impl Default for PlayerStatus {
    fn default() -> Self {
        Self {
            state: PlayerState::Uninitialized,
            qualities: Vec::new(),
            quality: QualitySelection::Automatic,
            video_quality: 0,
            video_segment: 0,
            video_fetching: false,
            duration: None,
            buffered_to: None,
            failed_tracks: Vec::new(),
        }
    }
}

/// Handle to a running player.
///
/// ┌────────────┐  manifest   ┌─────────────┐   ranged fetch   ┌──────────┐
/// │  Manifest  ├────────────►│             ├─────────────────►│  HTTP    │
/// │  Provider  │             │             │◄─────────────────┤  server  │
/// └────────────┘             │ Coordinator │   byte chunks    └──────────┘
///                            │             │
/// ┌────────────┐ time/seek   │   [MPSC]    │  SegmentQueue    ┌──────────┐
/// │  Playback  ├────────────►│             ├─────────────────►│  Media   │
/// │  Surface   │◄────────────┤             │◄─────────────────┤  Buffer  │
/// └────────────┘ play/pause  └─────────────┘  append done     └──────────┘
///
/// Dropping the handle stops the player.
pub struct Player {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<PlayerStatus>,
    task: Option<JoinHandle<()>>,
}

impl Player {
    pub fn builder() -> PlayerBuilder {
        PlayerBuilder::new()
    }

    /// Resume or pause the playback surface.
    pub fn set_playing_state(&self, play: bool) -> ShizukuResult<()> {
        self.send(Command::SetPlaying(play))
    }

    /// Initialize once the sink is ready, even when constructed paused. Also
    /// re-initializes tracks whose buffer failed.
    pub fn initialize_if_needed(&self) -> ShizukuResult<()> {
        self.send(Command::Initialize)
    }

    pub fn change_quality(&self, selection: QualitySelection) -> ShizukuResult<()> {
        let available = self.status.borrow().qualities.len();
        if available == 0 {
            return Err(ShizukuError::NotReady);
        }
        if let QualitySelection::Manual(index) = selection {
            if index >= available {
                return Err(ShizukuError::InvalidQuality { index, available });
            }
        }
        self.send(Command::ChangeQuality(selection))
    }

    /// Forward a time-update, seek or play notification of the surface.
    pub fn surface_event(&self, event: SurfaceEvent) -> ShizukuResult<()> {
        self.send(Command::Surface(event))
    }

    pub fn qualities(&self) -> Vec<QualityTier> {
        self.status.borrow().qualities.clone()
    }

    /// `Automatic` while the player adapts quality on its own.
    pub fn quality(&self) -> QualitySelection {
        self.status.borrow().quality
    }

    pub fn status(&self) -> PlayerStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerStatus> {
        self.status.clone()
    }

    /// Stop the player and wait for it to release every resource.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn send(&self, command: Command) -> ShizukuResult<()> {
        self.commands
            .send(command)
            .map_err(|_| ShizukuError::PlayerClosed)
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

pub struct PlayerBuilder {
    paused: bool,
    client: Option<HttpClient>,
    config: PlayerConfig,
}

impl PlayerBuilder {
    pub fn new() -> Self {
        Self {
            paused: true,
            client: None,
            config: PlayerConfig::default(),
        }
    }

    /// Whether playback starts paused. An unpaused player initializes as
    /// soon as the sink is ready. Defaults to `true`.
    pub fn paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }

    pub fn client(mut self, client: HttpClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the player task for `media_id`. Must be called within a tokio runtime.
    pub fn spawn<M, S, P>(
        self,
        media_id: impl Into<String>,
        manifests: M,
        sink: S,
        surface: P,
    ) -> Player
    where
        M: ManifestProvider,
        S: MediaSink,
        P: PlaybackSurface,
    {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(PlayerStatus::default());

        let (coordinator, events_rx) = Coordinator::new(
            media_id.into(),
            self.paused,
            manifests,
            Arc::new(sink),
            surface,
            self.client.unwrap_or_default(),
            self.config,
            status_tx,
        );
        let task = tokio::spawn(coordinator.run(commands_rx, events_rx));

        Player {
            commands: commands_tx,
            status: status_rx,
            task: Some(task),
        }
    }
}

impl Default for PlayerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
