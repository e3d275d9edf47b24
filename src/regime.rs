//! Quadrant classification on the RS/RM plane.
//!
//! A sector is placed in one of four quadrants by comparing relative
//! strength against the benchmark reference and relative momentum
//! against zero. `Neutral` is reserved for inputs that cannot be
//! classified (missing or non-finite metrics).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::IngestError;
use crate::logging::log_anomaly;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuadrantState {
    Leading,
    Weakening,
    Lagging,
    Improving,
    Neutral,
}

impl QuadrantState {
    /// Parse an upstream label. Unknown labels yield `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "LEADING" => Some(QuadrantState::Leading),
            "WEAKENING" => Some(QuadrantState::Weakening),
            "LAGGING" => Some(QuadrantState::Lagging),
            "IMPROVING" => Some(QuadrantState::Improving),
            "NEUTRAL" => Some(QuadrantState::Neutral),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuadrantState::Leading => "LEADING",
            QuadrantState::Weakening => "WEAKENING",
            QuadrantState::Lagging => "LAGGING",
            QuadrantState::Improving => "IMPROVING",
            QuadrantState::Neutral => "NEUTRAL",
        }
    }

    /// Title-case name used in notices.
    pub fn display_name(&self) -> &'static str {
        match self {
            QuadrantState::Leading => "Leading",
            QuadrantState::Weakening => "Weakening",
            QuadrantState::Lagging => "Lagging",
            QuadrantState::Improving => "Improving",
            QuadrantState::Neutral => "Neutral",
        }
    }

    /// Ranking priority for sector boards (higher sorts first).
    pub fn sort_priority(&self) -> u8 {
        match self {
            QuadrantState::Leading => 5,
            QuadrantState::Improving => 4,
            QuadrantState::Weakening => 3,
            QuadrantState::Neutral => 2,
            QuadrantState::Lagging => 1,
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            QuadrantState::Leading => "#00C853",
            QuadrantState::Weakening => "#FFD600",
            QuadrantState::Lagging => "#D50000",
            QuadrantState::Improving => "#2979FF",
            QuadrantState::Neutral => "#757575",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            QuadrantState::Leading => "Leading / Accelerating",
            QuadrantState::Weakening => "Weakening / Distributing",
            QuadrantState::Lagging => "Lagging / Selling Off",
            QuadrantState::Improving => "Improving / Rebounding",
            QuadrantState::Neutral => "Neutral / No Edge",
        }
    }

    /// Deteriorating sectors force a DOWN trend on their stocks.
    pub fn is_deteriorating(&self) -> bool {
        matches!(self, QuadrantState::Weakening | QuadrantState::Lagging)
    }

    /// Leading and improving sectors are the ones worth watching.
    pub fn is_actionable(&self) -> bool {
        matches!(self, QuadrantState::Leading | QuadrantState::Improving)
    }

    // (rs at/above reference, rm non-negative)
    fn sides(&self) -> Option<(bool, bool)> {
        match self {
            QuadrantState::Leading => Some((true, true)),
            QuadrantState::Weakening => Some((true, false)),
            QuadrantState::Lagging => Some((false, false)),
            QuadrantState::Improving => Some((false, true)),
            QuadrantState::Neutral => None,
        }
    }

    fn from_sides(strong: bool, rising: bool) -> Self {
        match (strong, rising) {
            (true, true) => QuadrantState::Leading,
            (true, false) => QuadrantState::Weakening,
            (false, false) => QuadrantState::Lagging,
            (false, true) => QuadrantState::Improving,
        }
    }
}

impl fmt::Display for QuadrantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a feed expresses relative strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsConvention {
    /// RS as a ratio to the benchmark; neutral at 1.0
    Ratio,
    /// RS as benchmark-relative percentage; neutral at 0.0
    Percent,
}

impl RsConvention {
    pub fn reference(&self) -> f64 {
        match self {
            RsConvention::Ratio => 1.0,
            RsConvention::Percent => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RsConvention::Ratio => "ratio",
            RsConvention::Percent => "percent",
        }
    }

    /// Convert an (rs, rm) pair into the canonical ratio form.
    pub fn to_ratio(&self, rs: f64, rm: f64) -> (f64, f64) {
        match self {
            RsConvention::Ratio => (rs, rm),
            RsConvention::Percent => (1.0 + rs / 100.0, rm / 100.0),
        }
    }
}

impl FromStr for RsConvention {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ratio" => Ok(RsConvention::Ratio),
            "percent" | "pct" => Ok(RsConvention::Percent),
            other => Err(IngestError::UnknownConvention(other.to_string())),
        }
    }
}

/// Direction of a sector's RS/RM change between the last two observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Shift {
    Gaining,
    Losing,
    Neutral,
}

impl Shift {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "GAINING" => Some(Shift::Gaining),
            "LOSING" => Some(Shift::Losing),
            "NEUTRAL" => Some(Shift::Neutral),
            _ => None,
        }
    }

    /// Both RS and RM must move together to count as a shift.
    pub fn between(prev: (f64, f64), curr: (f64, f64)) -> Self {
        if curr.0 > prev.0 && curr.1 > prev.1 {
            Shift::Gaining
        } else if curr.0 < prev.0 && curr.1 < prev.1 {
            Shift::Losing
        } else {
            Shift::Neutral
        }
    }
}

/// Composite momentum score used when a feed does not supply one.
/// Expects ratio-convention inputs.
pub fn momentum_score(rs: f64, rm: f64) -> f64 {
    rs * 100.0 + rm * 5000.0
}

/// Quadrant classifier bound to one RS convention.
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    convention: RsConvention,
    rs_band: f64,
    rm_band: f64,
}

impl Classifier {
    pub fn new(convention: RsConvention) -> Self {
        Self { convention, rs_band: 0.0, rm_band: 0.0 }
    }

    /// Classifier for validated snapshot data, which is always in ratio form.
    pub fn canonical() -> Self {
        Self::new(RsConvention::Ratio)
    }

    /// Dead bands around each boundary inside which a previous state is kept.
    pub fn with_hysteresis(mut self, rs_band: f64, rm_band: f64) -> Self {
        self.rs_band = rs_band.max(0.0);
        self.rm_band = rm_band.max(0.0);
        self
    }

    pub fn convention(&self) -> RsConvention {
        self.convention
    }

    pub fn reference(&self) -> f64 {
        self.convention.reference()
    }

    /// Strict decision table.
    pub fn classify(&self, rs: f64, rm: f64) -> QuadrantState {
        if !rs.is_finite() || !rm.is_finite() {
            return QuadrantState::Neutral;
        }
        QuadrantState::from_sides(rs >= self.reference(), rm >= 0.0)
    }

    /// Classify with hysteresis against a previously assigned state.
    ///
    /// Each axis is held independently: a boundary crossing only counts
    /// once the point is farther than the band from that boundary.
    pub fn classify_with(&self, rs: f64, rm: f64, previous: Option<QuadrantState>) -> QuadrantState {
        let raw = self.classify(rs, rm);
        let (Some((prev_strong, prev_rising)), Some((strong, rising))) =
            (previous.and_then(|p| p.sides()), raw.sides())
        else {
            return raw;
        };

        let strong = if strong != prev_strong && (rs - self.reference()).abs() < self.rs_band {
            prev_strong
        } else {
            strong
        };
        let rising = if rising != prev_rising && rm.abs() < self.rm_band {
            prev_rising
        } else {
            rising
        };
        QuadrantState::from_sides(strong, rising)
    }

    /// Directional strength to use when the feed does not carry one.
    pub fn implied_strength(&self, rs: f64) -> f64 {
        rs - self.reference()
    }
}

/// True when a reported state contradicts the sign of directional strength.
pub fn is_anomalous(state: QuadrantState, directional_strength: f64) -> bool {
    match state {
        QuadrantState::Leading => directional_strength < 0.0,
        QuadrantState::Improving => directional_strength > 0.0,
        _ => false,
    }
}

/// Log (never correct) a state/strength contradiction. Returns whether one was found.
pub fn audit_state(sector: &str, state: QuadrantState, directional_strength: f64) -> bool {
    let anomalous = is_anomalous(state, directional_strength);
    if anomalous {
        log_anomaly(sector, state.as_str(), directional_strength);
    }
    anomalous
}

/// Board ordering: state priority descending, then momentum score descending.
pub fn board_order(a: (QuadrantState, f64), b: (QuadrantState, f64)) -> Ordering {
    b.0.sort_priority()
        .cmp(&a.0.sort_priority())
        .then_with(|| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_table_ratio() {
        let c = Classifier::new(RsConvention::Ratio);
        assert_eq!(c.classify(1.05, 0.002), QuadrantState::Leading);
        assert_eq!(c.classify(0.95, 0.002), QuadrantState::Improving);
        assert_eq!(c.classify(0.95, -0.002), QuadrantState::Lagging);
        assert_eq!(c.classify(1.05, -0.002), QuadrantState::Weakening);
    }

    #[test]
    fn test_boundaries_are_inclusive_on_upper_side() {
        let c = Classifier::new(RsConvention::Ratio);
        assert_eq!(c.classify(1.0, 0.0), QuadrantState::Leading);
        assert_eq!(c.classify(0.999_999, 0.0), QuadrantState::Improving);
        assert_eq!(c.classify(1.0, -1e-9), QuadrantState::Weakening);
    }

    #[test]
    fn test_percent_convention_uses_zero_reference() {
        let c = Classifier::new(RsConvention::Percent);
        assert_eq!(c.classify(0.5, 0.1), QuadrantState::Leading);
        assert_eq!(c.classify(-0.5, 0.1), QuadrantState::Improving);
        // A ratio-looking value is strong under the percent convention
        assert_eq!(c.classify(0.95, -0.1), QuadrantState::Weakening);
    }

    #[test]
    fn test_classifier_is_pure() {
        let c = Classifier::new(RsConvention::Ratio);
        for _ in 0..10 {
            assert_eq!(c.classify(1.01, -0.003), QuadrantState::Weakening);
        }
    }

    #[test]
    fn test_non_finite_is_neutral() {
        let c = Classifier::new(RsConvention::Ratio);
        assert_eq!(c.classify(f64::NAN, 0.1), QuadrantState::Neutral);
        assert_eq!(c.classify(1.0, f64::INFINITY), QuadrantState::Neutral);
    }

    #[test]
    fn test_zero_band_matches_strict_table() {
        let c = Classifier::new(RsConvention::Ratio);
        assert_eq!(
            c.classify_with(0.999, 0.001, Some(QuadrantState::Leading)),
            QuadrantState::Improving
        );
    }

    #[test]
    fn test_hysteresis_holds_previous_state_inside_band() {
        let c = Classifier::new(RsConvention::Ratio).with_hysteresis(0.01, 0.0005);
        // Barely below reference: still LEADING
        assert_eq!(
            c.classify_with(0.995, 0.002, Some(QuadrantState::Leading)),
            QuadrantState::Leading
        );
        // Clearly below reference: flips
        assert_eq!(
            c.classify_with(0.98, 0.002, Some(QuadrantState::Leading)),
            QuadrantState::Improving
        );
        // RM barely negative holds the rising side
        assert_eq!(
            c.classify_with(1.05, -0.0001, Some(QuadrantState::Leading)),
            QuadrantState::Leading
        );
    }

    #[test]
    fn test_hysteresis_holds_each_axis_independently() {
        let c = Classifier::new(RsConvention::Ratio).with_hysteresis(0.01, 0.0005);
        // RS crossing within band is held, RM crossing far outside band is not
        assert_eq!(
            c.classify_with(0.995, -0.01, Some(QuadrantState::Leading)),
            QuadrantState::Weakening
        );
    }

    #[test]
    fn test_hysteresis_ignores_neutral_previous() {
        let c = Classifier::new(RsConvention::Ratio).with_hysteresis(0.05, 0.05);
        assert_eq!(
            c.classify_with(0.99, -0.001, Some(QuadrantState::Neutral)),
            QuadrantState::Lagging
        );
    }

    #[test]
    fn test_sort_priority_total_order() {
        let mut states = vec![
            QuadrantState::Lagging,
            QuadrantState::Neutral,
            QuadrantState::Leading,
            QuadrantState::Weakening,
            QuadrantState::Improving,
        ];
        states.sort_by(|a, b| board_order((*a, 0.0), (*b, 0.0)));
        assert_eq!(
            states,
            vec![
                QuadrantState::Leading,
                QuadrantState::Improving,
                QuadrantState::Weakening,
                QuadrantState::Neutral,
                QuadrantState::Lagging,
            ]
        );
    }

    #[test]
    fn test_board_order_breaks_ties_by_momentum() {
        let a = (QuadrantState::Leading, 110.0);
        let b = (QuadrantState::Leading, 140.0);
        assert_eq!(board_order(a, b), Ordering::Greater);
        assert_eq!(board_order(b, a), Ordering::Less);
    }

    #[test]
    fn test_anomaly_detection() {
        assert!(is_anomalous(QuadrantState::Leading, -0.4));
        assert!(is_anomalous(QuadrantState::Improving, 0.4));
        assert!(!is_anomalous(QuadrantState::Leading, 0.4));
        assert!(!is_anomalous(QuadrantState::Lagging, 0.4));
        assert!(!is_anomalous(QuadrantState::Improving, -0.4));
    }

    #[test]
    fn test_percent_to_ratio_conversion() {
        let (rs, rm) = RsConvention::Percent.to_ratio(5.0, 0.2);
        assert!((rs - 1.05).abs() < 1e-12);
        assert!((rm - 0.002).abs() < 1e-12);
        assert_eq!(RsConvention::Ratio.to_ratio(1.05, 0.002), (1.05, 0.002));
    }

    #[test]
    fn test_convention_parse() {
        assert_eq!("ratio".parse::<RsConvention>().unwrap(), RsConvention::Ratio);
        assert_eq!("Percent".parse::<RsConvention>().unwrap(), RsConvention::Percent);
        assert!("basis".parse::<RsConvention>().is_err());
    }

    #[test]
    fn test_shift_requires_both_axes() {
        assert_eq!(Shift::between((1.0, 0.001), (1.01, 0.002)), Shift::Gaining);
        assert_eq!(Shift::between((1.0, 0.001), (0.99, 0.0)), Shift::Losing);
        assert_eq!(Shift::between((1.0, 0.001), (1.01, 0.0)), Shift::Neutral);
    }

    #[test]
    fn test_momentum_score_formula() {
        assert!((momentum_score(1.08, 0.003) - 123.0).abs() < 1e-9);
    }

    #[test]
    fn test_label_round_trip() {
        for s in [
            QuadrantState::Leading,
            QuadrantState::Weakening,
            QuadrantState::Lagging,
            QuadrantState::Improving,
            QuadrantState::Neutral,
        ] {
            assert_eq!(QuadrantState::from_label(s.as_str()), Some(s));
        }
        assert_eq!(QuadrantState::from_label("SHINING"), None);
    }
}
