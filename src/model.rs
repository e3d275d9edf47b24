//! Snapshot schema and the validating ingestion boundary.
//!
//! Upstream producers send loosely shaped JSON. Everything is parsed into
//! explicit structs here, once; downstream components only ever see
//! validated `Sector`, `Signal` and `Alert` values with RS in ratio form.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::logging::log_rejected;
use crate::regime::{momentum_score, QuadrantState, RsConvention, Shift};

pub const DEFAULT_WEIGHT: f64 = 0.05;

// =============================================================================
// Lenient field decoding
// =============================================================================

/// Numbers or numeric strings; anything else (or non-finite) becomes `None`.
fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<f64>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
    .filter(|x| x.is_finite()))
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().map(|x| x != 0.0).unwrap_or(false),
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

// =============================================================================
// Raw wire shapes
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    #[serde(default, alias = "data")]
    sectors: BTreeMap<String, Value>,
    #[serde(default, alias = "hits")]
    signals: Vec<Value>,
    #[serde(default)]
    alerts: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawPoint {
    #[serde(default, deserialize_with = "lenient_f64")]
    rs: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    rm: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawHistoryPoint {
    #[serde(default, deserialize_with = "lenient_string")]
    date: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    rs: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    rm: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetrics {
    #[serde(default, deserialize_with = "lenient_string")]
    state: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    momentum_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    breadth: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    rel_volume: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    shift: Option<String>,
    #[serde(default, alias = "sr", deserialize_with = "lenient_f64")]
    directional_strength: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawSector {
    current: Option<RawPoint>,
    #[serde(default)]
    history: Vec<RawHistoryPoint>,
    metrics: Option<RawMetrics>,
    #[serde(default, deserialize_with = "lenient_f64")]
    weight: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    rank: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    commentary: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTechnical {
    #[serde(default, rename = "aboveVWAP", alias = "aboveVwap", deserialize_with = "lenient_bool")]
    above_vwap: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    is_breakout: bool,
}

#[derive(Debug, Default, Deserialize)]
struct RawSession {
    #[serde(default, deserialize_with = "lenient_string")]
    phase: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    quality: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSignal {
    #[serde(default, deserialize_with = "lenient_string")]
    symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    sector_key: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    sector: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    change: Option<f64>,
    #[serde(default)]
    technical: Option<RawTechnical>,
    #[serde(default)]
    session: Option<RawSession>,
    #[serde(default, deserialize_with = "lenient_string")]
    sector_state: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    stock_active: bool,
    #[serde(default, deserialize_with = "lenient_f64")]
    vol_ratio: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    volume_shocker: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    risk_level: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    risk_units: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    entry_tag: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    exit_tag: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    trade_ready: bool,
    #[serde(default, deserialize_with = "lenient_f64")]
    rs_sector: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawAlert {
    #[serde(default, deserialize_with = "lenient_string")]
    symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    timestamp: Option<f64>,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    priority: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    rs: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    rm: Option<f64>,
}

// =============================================================================
// Validated types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Observation {
    pub rs: f64,
    pub rm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub date: String,
    pub rs: f64,
    pub rm: f64,
}

impl HistoryPoint {
    pub fn observation(&self) -> Observation {
        Observation { rs: self.rs, rm: self.rm }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorMetrics {
    /// State reported by the feed; `None` when absent or unrecognised
    pub reported_state: Option<QuadrantState>,
    pub momentum_score: f64,
    pub breadth: Option<f64>,
    pub rel_volume: Option<f64>,
    pub shift: Shift,
    pub directional_strength: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sector {
    pub key: String,
    pub current: Observation,
    pub history: Vec<HistoryPoint>,
    pub metrics: SectorMetrics,
    pub rank: u32,
    pub commentary: Option<String>,
    pub weight: f64,
}

impl Sector {
    /// Observation at `index`, clamped to the history; `current` when history is empty.
    pub fn observation_at(&self, index: usize) -> Observation {
        match self.history.len() {
            0 => self.current,
            n => self.history[index.min(n - 1)].observation(),
        }
    }

    pub fn date_at(&self, index: usize) -> Option<&str> {
        match self.history.len() {
            0 => None,
            n => Some(self.history[index.min(n - 1)].date.as_str()),
        }
    }

    /// Short display name ("NIFTY_PSU_BANK" -> "PSU_BANK").
    pub fn short_name(&self) -> &str {
        short_name(&self.key)
    }
}

pub fn short_name(key: &str) -> &str {
    key.strip_prefix("NIFTY_").unwrap_or(key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionQuality {
    Best,
    Caution,
    Avoid,
    Unknown,
}

impl SessionQuality {
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(|l| l.trim().to_ascii_uppercase()).as_deref() {
            Some("BEST") => SessionQuality::Best,
            Some("CAUTION") => SessionQuality::Caution,
            Some("AVOID") => SessionQuality::Avoid,
            _ => SessionQuality::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionQuality::Best => "BEST",
            SessionQuality::Caution => "CAUTION",
            SessionQuality::Avoid => "AVOID",
            SessionQuality::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Unknown,
}

impl RiskLevel {
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(|l| l.trim().to_ascii_uppercase()).as_deref() {
            Some("LOW") => RiskLevel::Low,
            Some("MEDIUM") => RiskLevel::Medium,
            Some("HIGH") => RiskLevel::High,
            _ => RiskLevel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub symbol: String,
    pub sector_key: String,
    pub sector: String,
    pub price: Option<f64>,
    pub change: Option<f64>,
    pub above_vwap: bool,
    pub is_breakout: bool,
    pub session_phase: Option<String>,
    pub session_quality: SessionQuality,
    pub sector_state: QuadrantState,
    pub stock_active: bool,
    /// Volume expansion ratio (`volumeShocker` preferred over `volRatio`)
    pub vol_ratio: Option<f64>,
    pub risk_level: RiskLevel,
    pub risk_units: Option<f64>,
    pub entry_tag: Option<String>,
    pub exit_tag: Option<String>,
    pub trade_ready: bool,
    pub rs_sector: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Priority {
    High,
    Normal,
}

impl Priority {
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(|l| l.trim().to_ascii_uppercase()).as_deref() {
            Some("HIGH") => Priority::High,
            _ => Priority::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub symbol: String,
    /// Epoch seconds; `None` when the feed sent something unparsable
    pub timestamp: Option<f64>,
    pub kind: String,
    pub priority: Priority,
    pub rs: Option<f64>,
    pub rm: Option<f64>,
}

impl Alert {
    pub fn key(&self) -> Option<String> {
        self.timestamp.map(|ts| format!("{}-{}", self.symbol, ts))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub key: String,
    pub reason: String,
}

/// One validated refresh cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub sectors: BTreeMap<String, Sector>,
    pub signals: Vec<Signal>,
    pub alerts: Vec<Alert>,
    pub rejected: Vec<Rejection>,
}

impl Snapshot {
    pub fn from_json(text: &str, convention: RsConvention) -> Result<Self> {
        let raw: RawSnapshot = serde_json::from_str(text)?;
        Ok(Self::from_raw(raw, convention))
    }

    pub fn load(path: &Path, convention: RsConvention) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text, convention)
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    fn from_raw(raw: RawSnapshot, convention: RsConvention) -> Self {
        let mut snapshot = Snapshot::default();

        for (key, value) in raw.sectors {
            match serde_json::from_value::<RawSector>(value) {
                Ok(rs) => match validate_sector(&key, rs, convention) {
                    Ok(sector) => {
                        snapshot.sectors.insert(key, sector);
                    }
                    Err(reason) => snapshot.reject(key, reason),
                },
                Err(err) => snapshot.reject(key, format!("malformed sector: {}", err)),
            }
        }
        assign_missing_ranks(&mut snapshot.sectors);

        for (i, value) in raw.signals.into_iter().enumerate() {
            match serde_json::from_value::<RawSignal>(value) {
                Ok(raw) => match validate_signal(raw) {
                    Some(signal) => snapshot.signals.push(signal),
                    None => snapshot.reject(format!("signal[{}]", i), "missing symbol".to_string()),
                },
                Err(err) => snapshot.reject(format!("signal[{}]", i), format!("malformed signal: {}", err)),
            }
        }

        for (i, value) in raw.alerts.into_iter().enumerate() {
            match serde_json::from_value::<RawAlert>(value) {
                Ok(raw) => {
                    let (rs, rm) = match (raw.rs, raw.rm) {
                        (Some(rs), Some(rm)) => {
                            let (rs, rm) = convention.to_ratio(rs, rm);
                            (Some(rs), Some(rm))
                        }
                        _ => (None, None),
                    };
                    snapshot.alerts.push(Alert {
                        symbol: raw.symbol.unwrap_or_default(),
                        timestamp: raw.timestamp,
                        kind: raw.kind.unwrap_or_else(|| "TRANSITION".to_string()),
                        priority: Priority::from_label(raw.priority.as_deref()),
                        rs,
                        rm,
                    })
                }
                Err(err) => snapshot.reject(format!("alert[{}]", i), format!("malformed alert: {}", err)),
            }
        }

        snapshot
    }

    fn reject(&mut self, key: String, reason: String) {
        log_rejected(&key, &reason);
        self.rejected.push(Rejection { key, reason });
    }
}

/// SHA-256 of the raw snapshot text, hex encoded.
pub fn digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn validate_sector(key: &str, raw: RawSector, convention: RsConvention) -> std::result::Result<Sector, String> {
    let metrics = raw.metrics.ok_or_else(|| "missing metrics".to_string())?;
    let current = raw.current.ok_or_else(|| "missing current".to_string())?;
    let (rs, rm) = match (current.rs, current.rm) {
        (Some(rs), Some(rm)) => convention.to_ratio(rs, rm),
        _ => return Err("current rs/rm not numeric".to_string()),
    };
    let current = Observation { rs, rm };

    // Unparsable points carry the previous observation forward so indices stay stable.
    let mut history = Vec::with_capacity(raw.history.len());
    let mut last = None;
    for point in raw.history {
        let obs = match (point.rs, point.rm) {
            (Some(rs), Some(rm)) => {
                let (rs, rm) = convention.to_ratio(rs, rm);
                Observation { rs, rm }
            }
            _ => last.unwrap_or(current),
        };
        last = Some(obs);
        history.push(HistoryPoint {
            date: point.date.unwrap_or_default(),
            rs: obs.rs,
            rm: obs.rm,
        });
    }

    let prev = match history.len() {
        0 | 1 => current,
        n => history[n - 2].observation(),
    };
    let shift = metrics
        .shift
        .as_deref()
        .and_then(Shift::from_label)
        .unwrap_or_else(|| Shift::between((prev.rs, prev.rm), (current.rs, current.rm)));

    let weight = raw.weight.filter(|w| *w >= 0.0).unwrap_or(DEFAULT_WEIGHT);

    Ok(Sector {
        key: key.to_string(),
        current,
        history,
        metrics: SectorMetrics {
            reported_state: metrics.state.as_deref().and_then(QuadrantState::from_label),
            momentum_score: metrics.momentum_score.unwrap_or_else(|| momentum_score(rs, rm)),
            breadth: metrics.breadth,
            rel_volume: metrics.rel_volume.filter(|v| *v >= 0.0),
            shift,
            directional_strength: metrics.directional_strength,
        },
        rank: raw.rank.filter(|r| *r >= 1.0).map(|r| r as u32).unwrap_or(0),
        commentary: raw.commentary.filter(|c| !c.trim().is_empty()),
        weight,
    })
}

/// Sectors without a rank are ranked by descending current RS.
fn assign_missing_ranks(sectors: &mut BTreeMap<String, Sector>) {
    if sectors.values().all(|s| s.rank > 0) {
        return;
    }
    let mut by_rs: Vec<(String, f64)> = sectors.iter().map(|(k, s)| (k.clone(), s.current.rs)).collect();
    by_rs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    for (i, (key, _)) in by_rs.into_iter().enumerate() {
        if let Some(sector) = sectors.get_mut(&key) {
            if sector.rank == 0 {
                sector.rank = i as u32 + 1;
            }
        }
    }
}

fn validate_signal(raw: RawSignal) -> Option<Signal> {
    let symbol = raw.symbol.filter(|s| !s.trim().is_empty())?;
    let technical = raw.technical.unwrap_or_default();
    let session = raw.session.unwrap_or_default();
    let sector_key = raw.sector_key.unwrap_or_default();
    Some(Signal {
        symbol,
        sector: raw.sector.unwrap_or_else(|| short_name(&sector_key).to_string()),
        sector_key,
        price: raw.price,
        change: raw.change,
        above_vwap: technical.above_vwap,
        is_breakout: technical.is_breakout,
        session_phase: session.phase,
        session_quality: SessionQuality::from_label(session.quality.as_deref()),
        sector_state: raw
            .sector_state
            .as_deref()
            .and_then(QuadrantState::from_label)
            .unwrap_or(QuadrantState::Neutral),
        stock_active: raw.stock_active,
        vol_ratio: raw.volume_shocker.or(raw.vol_ratio),
        risk_level: RiskLevel::from_label(raw.risk_level.as_deref()),
        risk_units: raw.risk_units,
        entry_tag: raw.entry_tag,
        exit_tag: raw.exit_tag,
        trade_ready: raw.trade_ready,
        rs_sector: raw.rs_sector,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "sectors": {
            "NIFTY_BANK": {
                "current": {"rs": 1.08, "rm": 0.003},
                "history": [
                    {"date": "2026-10-14", "rs": 1.05, "rm": 0.001},
                    {"date": "2026-10-15", "rs": 1.08, "rm": 0.003}
                ],
                "metrics": {"state": "LEADING", "momentumScore": 150, "breadth": 72, "relVolume": 1.4, "shift": "GAINING"},
                "weight": 0.3,
                "rank": 1,
                "commentary": "Banks lead."
            },
            "NIFTY_IT": {
                "current": {"rs": "0.93", "rm": -0.002},
                "metrics": {"momentumScore": "n/a"}
            },
            "NIFTY_MEDIA": {
                "current": {"rs": 0.9, "rm": 0.001}
            }
        },
        "signals": [
            {"symbol": "HDFCBANK", "sectorKey": "NIFTY_BANK", "technical": {"aboveVWAP": true, "isBreakout": false},
             "session": {"phase": "OPEN", "quality": "BEST"}, "sectorState": "LEADING", "stockActive": true,
             "volRatio": 1.2, "volumeShocker": 2.1, "riskLevel": "LOW"},
            {"sectorKey": "NIFTY_IT"}
        ],
        "alerts": [
            {"symbol": "NIFTY_BANK", "timestamp": 1760000000, "type": "ENTER_LEADING", "priority": "HIGH", "rs": 1.08, "rm": 0.003},
            {"symbol": "NIFTY_IT", "timestamp": "garbage", "type": "ENTER_LAGGING", "priority": "MEDIUM"}
        ]
    }"#;

    #[test]
    fn test_session_and_risk_labels() {
        for q in [SessionQuality::Best, SessionQuality::Caution, SessionQuality::Avoid] {
            assert_eq!(SessionQuality::from_label(Some(q.as_str())), q);
        }
        for r in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
            assert_eq!(RiskLevel::from_label(Some(r.as_str())), r);
        }
        assert_eq!(SessionQuality::from_label(Some("later")).as_str(), "UNKNOWN");
    }

    #[test]
    fn test_sectors_without_metrics_are_filtered() {
        let snap = Snapshot::from_json(SAMPLE, RsConvention::Ratio).unwrap();
        assert!(snap.sectors.contains_key("NIFTY_BANK"));
        assert!(snap.sectors.contains_key("NIFTY_IT"));
        assert!(!snap.sectors.contains_key("NIFTY_MEDIA"));
        assert!(snap.rejected.iter().any(|r| r.key == "NIFTY_MEDIA" && r.reason.contains("metrics")));
    }

    #[test]
    fn test_numeric_strings_parse_and_garbage_degrades() {
        let snap = Snapshot::from_json(SAMPLE, RsConvention::Ratio).unwrap();
        let it = &snap.sectors["NIFTY_IT"];
        assert!((it.current.rs - 0.93).abs() < 1e-12);
        // "n/a" momentum falls back to the derived score
        assert!((it.metrics.momentum_score - momentum_score(0.93, -0.002)).abs() < 1e-9);
        assert_eq!(it.metrics.reported_state, None);
        assert_eq!(it.weight, DEFAULT_WEIGHT);
    }

    #[test]
    fn test_missing_rank_assigned_by_rs() {
        let snap = Snapshot::from_json(SAMPLE, RsConvention::Ratio).unwrap();
        assert_eq!(snap.sectors["NIFTY_BANK"].rank, 1);
        assert_eq!(snap.sectors["NIFTY_IT"].rank, 2);
    }

    #[test]
    fn test_signal_fields() {
        let snap = Snapshot::from_json(SAMPLE, RsConvention::Ratio).unwrap();
        assert_eq!(snap.signals.len(), 1);
        let s = &snap.signals[0];
        assert_eq!(s.symbol, "HDFCBANK");
        assert_eq!(s.sector, "BANK");
        assert!(s.above_vwap);
        assert_eq!(s.vol_ratio, Some(2.1));
        assert_eq!(s.session_quality, SessionQuality::Best);
        assert_eq!(s.risk_level, RiskLevel::Low);
        assert_eq!(s.sector_state, QuadrantState::Leading);
        assert!(snap.rejected.iter().any(|r| r.key == "signal[1]"));
    }

    #[test]
    fn test_alerts_keep_unparsable_timestamp_as_none() {
        let snap = Snapshot::from_json(SAMPLE, RsConvention::Ratio).unwrap();
        assert_eq!(snap.alerts.len(), 2);
        assert_eq!(snap.alerts[0].priority, Priority::High);
        assert_eq!(snap.alerts[0].key().as_deref(), Some("NIFTY_BANK-1760000000"));
        assert_eq!(snap.alerts[1].priority, Priority::Normal);
        assert_eq!(snap.alerts[1].timestamp, None);
        assert_eq!(snap.alerts[1].key(), None);
    }

    #[test]
    fn test_percent_feed_converted_at_boundary() {
        let text = r#"{"sectors": {"NIFTY_AUTO": {"current": {"rs": 5.0, "rm": 0.2}, "metrics": {},
            "history": [{"date": "d1", "rs": -2.0, "rm": -0.1}]}}}"#;
        let snap = Snapshot::from_json(text, RsConvention::Percent).unwrap();
        let auto = &snap.sectors["NIFTY_AUTO"];
        assert!((auto.current.rs - 1.05).abs() < 1e-12);
        assert!((auto.current.rm - 0.002).abs() < 1e-12);
        assert!((auto.history[0].rs - 0.98).abs() < 1e-12);
    }

    #[test]
    fn test_unparsable_history_point_carries_forward() {
        let text = r#"{"sectors": {"S": {"current": {"rs": 1.0, "rm": 0.0}, "metrics": {},
            "history": [{"date": "a", "rs": 1.1, "rm": 0.01}, {"date": "b", "rs": "x", "rm": null}]}}}"#;
        let snap = Snapshot::from_json(text, RsConvention::Ratio).unwrap();
        let s = &snap.sectors["S"];
        assert_eq!(s.history.len(), 2);
        assert_eq!(s.history[1].rs, 1.1);
        assert_eq!(s.history[1].date, "b");
    }

    #[test]
    fn test_observation_at_clamps() {
        let snap = Snapshot::from_json(SAMPLE, RsConvention::Ratio).unwrap();
        let bank = &snap.sectors["NIFTY_BANK"];
        assert_eq!(bank.observation_at(99).rs, 1.08);
        assert_eq!(bank.observation_at(0).rs, 1.05);
        let it = &snap.sectors["NIFTY_IT"];
        assert_eq!(it.observation_at(3), it.current);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(Snapshot::from_json("{not json", RsConvention::Ratio).is_err());
    }

    #[test]
    fn test_empty_object_is_empty_snapshot() {
        let snap = Snapshot::from_json("{}", RsConvention::Ratio).unwrap();
        assert!(snap.is_empty());
    }

    #[test]
    fn test_digest_is_stable_hex() {
        let a = digest("abc");
        assert_eq!(a, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
        assert_ne!(a, digest("abd"));
    }
}
