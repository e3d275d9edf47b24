//! Trend Tracker
//!
//! Compares each signal's confidence score against the score it had in the
//! previous snapshot. The cache is replaced wholesale from the outgoing
//! signal set before a new snapshot is installed, so a symbol that skips a
//! cycle starts over as STABLE.

use serde::Serialize;
use std::collections::HashMap;

use crate::logging::log_trend_cache;
use crate::regime::QuadrantState;

/// Minimum score change that counts as a move
pub const TREND_THRESHOLD: i16 = 5;

/// Trend verdict versus the previous cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "UP",
            Trend::Down => "DOWN",
            Trend::Stable => "STABLE",
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            Trend::Up => "↑",
            Trend::Down => "↓",
            Trend::Stable => "→",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrendTracker {
    previous: HashMap<String, u8>,
}

impl TrendTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cache with the scores of the outgoing signal set.
    pub fn rotate<'a, I>(&mut self, outgoing: I)
    where
        I: IntoIterator<Item = (&'a str, u8)>,
    {
        self.previous = outgoing
            .into_iter()
            .map(|(symbol, score)| (symbol.to_string(), score))
            .collect();
        log_trend_cache(self.previous.len());
    }

    pub fn previous(&self, symbol: &str) -> Option<u8> {
        self.previous.get(symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.previous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.previous.is_empty()
    }

    pub fn trend(&self, symbol: &str, score: u8, sector_state: QuadrantState) -> Trend {
        // A deteriorating sector overrides any score improvement
        if sector_state.is_deteriorating() {
            return Trend::Down;
        }
        let Some(prev) = self.previous(symbol) else {
            return Trend::Stable;
        };
        let delta = score as i16 - prev as i16;
        if delta >= TREND_THRESHOLD {
            Trend::Up
        } else if delta <= -TREND_THRESHOLD {
            Trend::Down
        } else {
            Trend::Stable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with(symbol: &str, score: u8) -> TrendTracker {
        let mut t = TrendTracker::new();
        t.rotate([(symbol, score)]);
        t
    }

    #[test]
    fn test_first_evaluation_is_stable() {
        let t = TrendTracker::new();
        assert_eq!(t.trend("X", 90, QuadrantState::Leading), Trend::Stable);
    }

    #[test]
    fn test_rise_of_six_is_up() {
        let t = tracker_with("X", 50);
        assert_eq!(t.trend("X", 56, QuadrantState::Neutral), Trend::Up);
    }

    #[test]
    fn test_small_moves_are_stable() {
        let t = tracker_with("X", 50);
        assert_eq!(t.trend("X", 52, QuadrantState::Neutral), Trend::Stable);
        assert_eq!(t.trend("X", 46, QuadrantState::Neutral), Trend::Stable);
    }

    #[test]
    fn test_drop_is_down() {
        let t = tracker_with("X", 50);
        assert_eq!(t.trend("X", 45, QuadrantState::Leading), Trend::Down);
    }

    #[test]
    fn test_deteriorating_sector_forces_down() {
        let t = tracker_with("X", 10);
        assert_eq!(t.trend("X", 60, QuadrantState::Weakening), Trend::Down);
        assert_eq!(t.trend("X", 60, QuadrantState::Lagging), Trend::Down);
        // Even without history
        assert_eq!(t.trend("Y", 60, QuadrantState::Lagging), Trend::Down);
    }

    #[test]
    fn test_rotate_replaces_wholesale() {
        let mut t = tracker_with("X", 50);
        t.rotate([("Y", 70)]);
        assert_eq!(t.previous("X"), None);
        assert_eq!(t.previous("Y"), Some(70));
        assert_eq!(t.len(), 1);
        assert_eq!(t.trend("X", 90, QuadrantState::Leading), Trend::Stable);
    }
}
