pub mod buffer;
pub mod config;
pub mod error;
mod fetch;
pub mod manifest;
pub mod monitor;
pub mod player;
pub mod quality;
pub mod queue;
pub mod retry;
pub mod surface;
pub mod util;

pub use buffer::{MediaBuffer, MediaChunk, MediaSink};
pub use config::PlayerConfig;
pub use error::{ShizukuError, ShizukuResult};
pub use manifest::{HttpManifestProvider, Manifest, ManifestProvider, TrackKind};
pub use player::{Player, PlayerBuilder, PlayerState, PlayerStatus};
pub use quality::{QualitySelection, QualityTier};
pub use surface::{PlaybackSurface, ReadyState, SimulatedSurface, SurfaceEvent};
pub use util::http::HttpClient;
