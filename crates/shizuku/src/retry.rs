use std::time::Duration;

use crate::config::RetryConfig;

/// Escalating delay shared by every retried network operation.
///
/// The delay only grows between two calls to [`RetryTimer::reset`].
#[derive(Debug, Clone)]
pub struct RetryTimer {
    floor: Duration,
    max: Duration,
    multiplier: f64,
    current: Duration,
}

impl RetryTimer {
    pub fn new(config: &RetryConfig) -> Self {
        let floor = Duration::from_millis(config.initial_delay_ms);
        Self {
            floor,
            max: Duration::from_millis(config.max_delay_ms).max(floor),
            multiplier: config.multiplier.max(1.0),
            current: floor,
        }
    }

    pub fn time(&self) -> Duration {
        self.current
    }

    pub fn floor(&self) -> Duration {
        self.floor
    }

    pub fn increase(&mut self) {
        let next = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max);
        // a zero floor would never escalate multiplicatively
        let next = if next == self.current {
            self.current + Duration::from_millis(1)
        } else {
            next
        };
        self.current = next.min(self.max).max(self.current);
    }

    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}

impl Default for RetryTimer {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}
