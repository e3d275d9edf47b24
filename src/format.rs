//! Display formatting for optional numeric fields.
//!
//! Anything missing or non-finite renders as the placeholder instead of
//! `NaN` or an empty cell.

pub const PLACEHOLDER: &str = "—";

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

/// Fixed decimals: `fixed(Some(1.23456), 2) == "1.23"`.
pub fn fixed(v: Option<f64>, decimals: usize) -> String {
    match finite(v) {
        Some(x) => format!("{:.*}", decimals, x),
        None => PLACEHOLDER.to_string(),
    }
}

/// Signed percent: `+1.25%` / `-0.40%`.
pub fn signed_pct(v: Option<f64>) -> String {
    match finite(v) {
        Some(x) if x >= 0.0 => format!("+{:.2}%", x),
        Some(x) => format!("{:.2}%", x),
        None => PLACEHOLDER.to_string(),
    }
}

/// Volume-style ratio: `2.5x`.
pub fn ratio(v: Option<f64>) -> String {
    match finite(v) {
        Some(x) => format!("{:.1}x", x),
        None => PLACEHOLDER.to_string(),
    }
}

/// Price with two decimals, placeholder when missing.
pub fn price(v: Option<f64>) -> String {
    fixed(v, 2)
}
