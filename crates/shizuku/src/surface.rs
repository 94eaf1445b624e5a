use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::buffer::{buffered_end_from, BufferedRange};

/// How much media the surface can render at its current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing,
    /// Duration and dimensions are known.
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// Notifications a playback surface forwards to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    TimeUpdate,
    Seeking,
    Play,
}

/// The element rendering playback. The player only reads its clock and
/// toggles play/pause.
pub trait PlaybackSurface: Send + Sync + 'static {
    fn current_time(&self) -> Duration;

    fn duration(&self) -> Option<Duration>;

    fn playback_rate(&self) -> f64;

    fn ready_state(&self) -> ReadyState;

    fn is_paused(&self) -> bool;

    fn play(&self);

    fn pause(&self);
}

impl<P> PlaybackSurface for Arc<P>
where
    P: PlaybackSurface,
{
    fn current_time(&self) -> Duration {
        self.as_ref().current_time()
    }

    fn duration(&self) -> Option<Duration> {
        self.as_ref().duration()
    }

    fn playback_rate(&self) -> f64 {
        self.as_ref().playback_rate()
    }

    fn ready_state(&self) -> ReadyState {
        self.as_ref().ready_state()
    }

    fn is_paused(&self) -> bool {
        self.as_ref().is_paused()
    }

    fn play(&self) {
        self.as_ref().play()
    }

    fn pause(&self) {
        self.as_ref().pause()
    }
}

/// Scale `duration` by a playback rate. A NaN rate counts as normal speed,
/// negative rates as stopped.
pub fn scale_by_rate(duration: Duration, rate: f64) -> Duration {
    let rate = if rate.is_nan() { 1. } else { rate.max(0.) };
    Duration::try_from_secs_f64(duration.as_secs_f64() * rate).unwrap_or(Duration::MAX)
}

#[derive(Debug)]
struct SimulatedState {
    position: Duration,
    duration: Option<Duration>,
    rate: f64,
    paused: bool,
    ready_state: ReadyState,
}

/// A clock-only playback surface. Time moves forward only across buffered
/// media, so it stalls like a real player when the buffer runs dry.
#[derive(Debug)]
pub struct SimulatedSurface {
    state: Mutex<SimulatedState>,
}

impl SimulatedSurface {
    pub fn new(paused: bool) -> Self {
        Self {
            state: Mutex::new(SimulatedState {
                position: Duration::ZERO,
                duration: None,
                rate: 1.,
                paused,
                ready_state: ReadyState::HaveNothing,
            }),
        }
    }

    pub fn set_duration(&self, duration: Duration) {
        let mut state = self.state();
        state.duration = Some(duration);
        if state.ready_state < ReadyState::HaveMetadata {
            state.ready_state = ReadyState::HaveMetadata;
        }
    }

    pub fn set_playback_rate(&self, rate: f64) {
        self.state().rate = rate.max(0.);
    }

    pub fn set_ready_state(&self, ready_state: ReadyState) {
        self.state().ready_state = ready_state;
    }

    /// Jump to `position`. The caller reports the seek to the player.
    pub fn seek(&self, position: Duration) {
        let mut state = self.state();
        state.position = match state.duration {
            Some(duration) => position.min(duration),
            None => position,
        };
    }

    /// Let `elapsed` wall time pass while `buffered` is what the video
    /// buffer holds. Returns the new position.
    pub fn advance(&self, elapsed: Duration, buffered: &[BufferedRange]) -> Duration {
        let mut state = self.state();
        let Some(duration) = state.duration else {
            return state.position;
        };

        match buffered_end_from(buffered, state.position) {
            Some(end) => {
                if !state.paused {
                    let target = state.position.saturating_add(scale_by_rate(elapsed, state.rate));
                    state.position = target.min(end).min(duration);
                }
                state.ready_state = if state.position < end {
                    ReadyState::HaveFutureData
                } else {
                    ReadyState::HaveCurrentData
                };
            }
            None => state.ready_state = ReadyState::HaveMetadata,
        }
        state.position
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PlaybackSurface for SimulatedSurface {
    fn current_time(&self) -> Duration {
        self.state().position
    }

    fn duration(&self) -> Option<Duration> {
        self.state().duration
    }

    fn playback_rate(&self) -> f64 {
        self.state().rate
    }

    fn ready_state(&self) -> ReadyState {
        self.state().ready_state
    }

    fn is_paused(&self) -> bool {
        self.state().paused
    }

    fn play(&self) {
        self.state().paused = false;
    }

    fn pause(&self) {
        self.state().paused = true;
    }
}
