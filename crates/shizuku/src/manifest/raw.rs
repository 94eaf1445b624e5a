use std::{collections::HashMap, time::Duration};

use reqwest::Url;
use serde::Deserialize;

use super::{Manifest, Representation, TimestampEntry, TimestampIndex, TrackDescriptor, TrackKind};
use crate::{ShizukuError, ShizukuResult};

/// Manifest as served, keyed by container mime type:
///
/// ```json
/// {
///   "video/webm": {
///     "codecs": "vp9",
///     "representations": [{
///       "url": "/media/abc/720p_video.webm",
///       "timestamp_info": {
///         "duration": 12000.0,
///         "media": [{ "timecode": 0.0, "range": "0-4095" }]
///       }
///     }]
///   },
///   "audio/webm": { ... }
/// }
/// ```
///
/// `duration` is in milliseconds, `timecode` in seconds.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub(crate) struct RawManifest(HashMap<String, RawTrack>);

#[derive(Debug, Deserialize)]
struct RawTrack {
    codecs: String,
    representations: Vec<RawRepresentation>,
}

#[derive(Debug, Deserialize)]
struct RawRepresentation {
    url: String,
    timestamp_info: RawTimestampInfo,
}

#[derive(Debug, Deserialize)]
struct RawTimestampInfo {
    duration: f64,
    media: Vec<RawMedia>,
}

#[derive(Debug, Deserialize)]
struct RawMedia {
    timecode: f64,
    range: String,
}

impl RawManifest {
    pub(crate) fn into_manifest(self, base_url: &Url) -> ShizukuResult<Manifest> {
        let mut video = None;
        let mut audio = None;

        for (mime_type, track) in self.0 {
            match TrackKind::from_mime_type(&mime_type) {
                Some(TrackKind::Video) if video.is_none() => {
                    video = Some(track.into_descriptor(TrackKind::Video, mime_type, base_url)?)
                }
                Some(TrackKind::Audio) if audio.is_none() => {
                    audio = Some(track.into_descriptor(TrackKind::Audio, mime_type, base_url)?)
                }
                _ => tracing::debug!("Ignoring track {mime_type} in manifest"),
            }
        }

        match (video, audio) {
            (Some(video), Some(audio)) => Ok(Manifest { video, audio }),
            (None, _) => Err(ShizukuError::InvalidManifest(
                "no video track".to_string(),
            )),
            (_, None) => Err(ShizukuError::InvalidManifest(
                "no audio track".to_string(),
            )),
        }
    }
}

impl RawTrack {
    fn into_descriptor(
        self,
        kind: TrackKind,
        mime_type: String,
        base_url: &Url,
    ) -> ShizukuResult<TrackDescriptor> {
        if self.representations.is_empty() {
            return Err(ShizukuError::InvalidManifest(format!(
                "track {mime_type} has no representations"
            )));
        }

        let representations = self
            .representations
            .into_iter()
            .map(|representation| representation.into_representation(base_url))
            .collect::<ShizukuResult<Vec<_>>>()?;

        Ok(TrackDescriptor {
            kind,
            mime_type,
            codecs: self.codecs,
            representations,
        })
    }
}

impl RawRepresentation {
    fn into_representation(self, base_url: &Url) -> ShizukuResult<Representation> {
        let url = resolve_url(base_url, &self.url)?;
        let info = self.timestamp_info;

        let duration = seconds(info.duration / 1000.)?;
        let entries = info
            .media
            .into_iter()
            .map(|media| {
                let (start, end) = parse_range(&media.range)?;
                Ok(TimestampEntry {
                    timecode: seconds(media.timecode)?,
                    start,
                    end,
                })
            })
            .collect::<ShizukuResult<Vec<_>>>()?;

        Ok(Representation {
            url,
            timestamps: TimestampIndex::new(entries, duration)?,
        })
    }
}

/// Representation paths are appended to the base URL, absolute URLs are kept.
pub(crate) fn resolve_url(base_url: &Url, path: &str) -> ShizukuResult<Url> {
    if path.starts_with("http://") || path.starts_with("https://") {
        return Ok(Url::parse(path)?);
    }

    let base = base_url.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Ok(Url::parse(&format!("{base}/{path}"))?)
}

fn seconds(value: f64) -> ShizukuResult<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| ShizukuError::InvalidManifest(format!("invalid time value {value}")))
}

fn parse_range(range: &str) -> ShizukuResult<(u64, u64)> {
    let invalid = || ShizukuError::InvalidManifest(format!("invalid byte range {range:?}"));

    let (start, end) = range.trim().split_once('-').ok_or_else(invalid)?;
    let start = start.trim().parse().map_err(|_| invalid())?;
    let end = end.trim().parse().map_err(|_| invalid())?;
    Ok((start, end))
}
