use thiserror::Error;

use crate::TrackKind;

#[derive(Error, Debug)]
pub enum ShizukuError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error("Manifest fetch error: {0}")]
    ManifestFetchError(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid quality index {index}, {available} tier(s) available")]
    InvalidQuality { index: usize, available: usize },

    #[error("Player is not initialized yet")]
    NotReady,

    #[error("Player task has stopped")]
    PlayerClosed,

    #[error("Failed to create {0:?} media buffer: {1}")]
    BufferCreateError(TrackKind, String),

    #[error("Failed to append to {0:?} media buffer: {1}")]
    AppendError(TrackKind, String),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
}

pub type ShizukuResult<T> = Result<T, ShizukuError>;
