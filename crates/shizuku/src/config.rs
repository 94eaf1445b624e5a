use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Seconds of video to keep buffered ahead of the playback position,
    /// scaled by the playback rate.
    pub fetch_time_secs: f64,
    pub retry: RetryConfig,
    pub quality: QualityConfig,
}

impl PlayerConfig {
    pub fn fetch_time(&self) -> Duration {
        Duration::from_secs_f64(self.fetch_time_secs.max(0.))
    }

    pub fn with_fetch_time(mut self, secs: f64) -> Self {
        self.fetch_time_secs = secs;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_quality(mut self, quality: QualityConfig) -> Self {
        self.quality = quality;
        self
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            fetch_time_secs: 5.,
            retry: RetryConfig::default(),
            quality: QualityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 250,
            multiplier: 2.,
            max_delay_ms: 16_000,
        }
    }
}

/// Thresholds of the automatic quality heuristic, as fractions of the
/// nominal duration of the fetched segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub upgrade_ratio: f64,
    pub downgrade_ratio: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            upgrade_ratio: 0.5,
            downgrade_ratio: 0.75,
        }
    }
}
