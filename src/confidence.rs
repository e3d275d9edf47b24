//! Confidence scoring for stock signals.
//!
//! Seven independent checks each contribute either nothing or a fixed
//! weight. Two safety caps are applied after the sum; they only ever
//! lower the score and each one that bites records how much it removed.

use serde::Serialize;

use crate::model::{RiskLevel, SessionQuality, Signal};
use crate::regime::QuadrantState;

pub const LAGGING_CAP: u32 = 30;
pub const AVOID_CAP: u32 = 40;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Factor {
    pub label: String,
    /// Signed percentage, e.g. "+30%" or "-40%"
    pub value: String,
    pub positive: bool,
}

impl Factor {
    fn gain(label: impl Into<String>, points: u32) -> Self {
        Self { label: label.into(), value: format!("+{}%", points), positive: true }
    }

    fn cap(label: impl Into<String>, removed: u32) -> Self {
        Self { label: label.into(), value: format!("-{}%", removed), positive: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confidence {
    pub score: u8,
    pub factors: Vec<Factor>,
}

impl Confidence {
    pub fn label(&self) -> &'static str {
        confidence_label(self.score)
    }

    pub fn was_capped(&self) -> bool {
        self.factors.iter().any(|f| !f.positive)
    }
}

pub fn confidence_label(score: u8) -> &'static str {
    match score {
        0..=29 => "Weak",
        30..=59 => "Moderate",
        60..=79 => "Strong",
        _ => "Very Strong",
    }
}

fn sector_points(state: QuadrantState) -> u32 {
    match state {
        QuadrantState::Leading => 30,
        QuadrantState::Improving => 20,
        QuadrantState::Weakening => 10,
        QuadrantState::Lagging | QuadrantState::Neutral => 0,
    }
}

fn volume_points(ratio: Option<f64>) -> u32 {
    match ratio {
        Some(r) if r >= 2.0 => 15,
        Some(r) if r >= 1.5 => 10,
        _ => 0,
    }
}

fn session_points(quality: SessionQuality) -> u32 {
    match quality {
        SessionQuality::Best => 10,
        SessionQuality::Caution => 5,
        SessionQuality::Avoid | SessionQuality::Unknown => 0,
    }
}

fn risk_points(risk: RiskLevel) -> u32 {
    match risk {
        RiskLevel::Low => 10,
        RiskLevel::Medium => 5,
        RiskLevel::High | RiskLevel::Unknown => 0,
    }
}

/// Score a signal. Pure: the same signal always yields the same result.
pub fn score(signal: &Signal) -> Confidence {
    let mut total: u32 = 0;
    let mut factors = Vec::new();
    let mut add = |label: String, points: u32, factors: &mut Vec<Factor>| {
        if points > 0 {
            total += points;
            factors.push(Factor::gain(label, points));
        }
    };

    add(
        format!("Sector {}", signal.sector_state.as_str()),
        sector_points(signal.sector_state),
        &mut factors,
    );
    add(
        "Stock active vs sector".to_string(),
        if signal.stock_active { 20 } else { 0 },
        &mut factors,
    );
    let vol = volume_points(signal.vol_ratio);
    add(
        format!("Volume {:.1}x", signal.vol_ratio.unwrap_or(0.0)),
        vol,
        &mut factors,
    );
    add(
        "Price above VWAP".to_string(),
        if signal.above_vwap { 10 } else { 0 },
        &mut factors,
    );
    add(
        "Breakout confirmed".to_string(),
        if signal.is_breakout { 5 } else { 0 },
        &mut factors,
    );
    add(
        format!("SESSION {}", signal.session_quality.as_str()),
        session_points(signal.session_quality),
        &mut factors,
    );
    add(
        format!("RISK {}", signal.risk_level.as_str()),
        risk_points(signal.risk_level),
        &mut factors,
    );

    if signal.sector_state == QuadrantState::Lagging && total > LAGGING_CAP {
        factors.push(Factor::cap("SAFETY CAP: sector LAGGING", total - LAGGING_CAP));
        total = LAGGING_CAP;
    }
    if signal.session_quality == SessionQuality::Avoid && total > AVOID_CAP {
        factors.push(Factor::cap("SAFETY CAP: session AVOID", total - AVOID_CAP));
        total = AVOID_CAP;
    }

    Confidence { score: total.min(100) as u8, factors }
}
