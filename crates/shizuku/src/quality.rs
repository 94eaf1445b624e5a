use std::{fmt, num::ParseIntError, str::FromStr, time::Duration};

use crate::{config::QualityConfig, ShizukuError, ShizukuResult};

/// What the user asked for: let the player adapt, or pin a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualitySelection {
    Automatic,
    Manual(usize),
}

impl FromStr for QualitySelection {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "auto" | "automatic" | "-1" => Ok(Self::Automatic),
            index => Ok(Self::Manual(index.parse()?)),
        }
    }
}

impl fmt::Display for QualitySelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Automatic => write!(f, "auto"),
            Self::Manual(index) => write!(f, "{index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityTier {
    pub label: String,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityChange {
    Up,
    Down,
    Hold,
}

/// Video quality state and the throughput heuristic driving it.
#[derive(Debug, Clone)]
pub struct QualitySelector {
    index: usize,
    max: usize,
    automatic: bool,
    /// Index held when automatic mode was left, restored when it is re-entered.
    remembered: usize,
    upgrade_ratio: f64,
    downgrade_ratio: f64,
}

impl QualitySelector {
    /// Start in automatic mode on the highest of `tiers` tiers.
    pub fn new(tiers: usize, config: &QualityConfig) -> Self {
        let max = tiers.saturating_sub(1);
        Self {
            index: max,
            max,
            automatic: true,
            remembered: max,
            upgrade_ratio: config.upgrade_ratio,
            downgrade_ratio: config.downgrade_ratio,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn is_automatic(&self) -> bool {
        self.automatic
    }

    pub fn selection(&self) -> QualitySelection {
        if self.automatic {
            QualitySelection::Automatic
        } else {
            QualitySelection::Manual(self.index)
        }
    }

    /// Apply a user choice. Returns whether the active tier or mode changed.
    pub fn select(&mut self, selection: QualitySelection) -> ShizukuResult<bool> {
        match selection {
            QualitySelection::Automatic => {
                if self.automatic {
                    return Ok(false);
                }
                self.automatic = true;
                self.index = self.remembered;
            }
            QualitySelection::Manual(index) => {
                if index > self.max {
                    return Err(ShizukuError::InvalidQuality {
                        index,
                        available: self.max + 1,
                    });
                }
                if !self.automatic && index == self.index {
                    return Ok(false);
                }
                if self.automatic {
                    self.remembered = self.index;
                    self.automatic = false;
                }
                self.index = index;
            }
        }
        Ok(true)
    }

    /// Adjust the tier after a fetch that took `fetch_duration` (already
    /// scaled by the playback rate) for a segment playing `segment_duration`.
    /// Moves at most one tier and only in automatic mode.
    pub fn feedback(&mut self, fetch_duration: Duration, segment_duration: Duration) -> QualityChange {
        if !self.automatic {
            return QualityChange::Hold;
        }

        let fetch = fetch_duration.as_secs_f64();
        let segment = segment_duration.as_secs_f64();
        if fetch < self.upgrade_ratio * segment && self.index < self.max {
            self.index += 1;
            QualityChange::Up
        } else if fetch > self.downgrade_ratio * segment && self.index > 0 {
            self.index -= 1;
            QualityChange::Down
        } else {
            QualityChange::Hold
        }
    }
}
