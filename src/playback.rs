//! History playback: which observation of each sector drives the plane.

use serde::Serialize;

use crate::model::{Observation, Sector};
use crate::regime::RsConvention;
use crate::state::Config;

/// Maps canonical (rs, rm) onto plane coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneMapping {
    pub reference: f64,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl PlaneMapping {
    pub fn from_config(config: &Config) -> Self {
        Self {
            reference: RsConvention::Ratio.reference(),
            scale_x: config.scale_x,
            scale_y: config.scale_y,
        }
    }

    /// Screen y grows downward, so rising momentum maps to negative y.
    pub fn target(&self, obs: Observation) -> (f64, f64) {
        (
            (obs.rs - self.reference) * self.scale_x,
            -(obs.rm * self.scale_y),
        )
    }
}

/// Up to `len` observations strictly before `index`, oldest first.
pub fn trail(sector: &Sector, index: usize, len: usize, mapping: &PlaneMapping) -> Vec<(f64, f64)> {
    let n = sector.history.len();
    if n == 0 {
        return Vec::new();
    }
    let end = index.min(n - 1);
    let start = end.saturating_sub(len);
    sector.history[start..end]
        .iter()
        .map(|p| mapping.target(p.observation()))
        .collect()
}

/// Playback cursor. `None` follows the latest observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Playback {
    index: Option<usize>,
}

impl Playback {
    pub fn latest() -> Self {
        Self { index: None }
    }

    pub fn at(index: usize) -> Self {
        Self { index: Some(index) }
    }

    pub fn is_latest(&self) -> bool {
        self.index.is_none()
    }

    pub fn requested(&self) -> Option<usize> {
        self.index
    }

    /// Index into a history of `len` points, clamped to `[0, len - 1]`.
    pub fn resolve(&self, len: usize) -> usize {
        let last = len.saturating_sub(1);
        self.index.map_or(last, |i| i.min(last))
    }

    pub fn observation(&self, sector: &Sector) -> Observation {
        sector.observation_at(self.resolve(sector.history.len()))
    }

    pub fn date<'a>(&self, sector: &'a Sector) -> Option<&'a str> {
        sector.date_at(self.resolve(sector.history.len()))
    }
}
