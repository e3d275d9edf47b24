//! Runtime configuration, read once from the environment.

use crate::error::Result;
use crate::regime::RsConvention;

#[derive(Debug, Clone)]
pub struct Config {
    /// Declared RS convention of the upstream feed
    pub rs_convention: RsConvention,
    /// Hysteresis dead band around the RS reference (0 disables)
    pub rs_band: f64,
    /// Hysteresis dead band around RM = 0 (0 disables)
    pub rm_band: f64,
    /// Synthesize transition alerts from sector histories
    pub derive_alerts: bool,
    pub alert_recent_secs: f64,
    pub alert_retention_secs: f64,
    pub alert_log_cap: usize,
    pub seen_compact_at: usize,
    pub seen_keep: usize,
    pub trail_len: usize,
    pub scale_x: f64,
    pub scale_y: f64,
    pub friction: f64,
    pub attraction: f64,
    pub rotation: f64,
    pub repulsion: f64,
    pub repulsion_dist: f64,
    pub kick_force: f64,
    pub tick_hz: f64,
    pub max_steps_per_tick: u32,
    pub rng_seed: Option<u64>,
    pub snapshot_path: String,
    pub poll_secs: u64,
    /// Emit a frame every N host ticks
    pub frame_every: u64,
    pub view_width: f64,
    pub view_height: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rs_convention: RsConvention::Ratio,
            rs_band: 0.0,
            rm_band: 0.0,
            derive_alerts: false,
            alert_recent_secs: 60.0,
            alert_retention_secs: 7.0 * 24.0 * 60.0 * 60.0,
            alert_log_cap: 20,
            seen_compact_at: 100,
            seen_keep: 50,
            trail_len: 5,
            scale_x: 2500.0,
            scale_y: 10_000.0,
            friction: 0.98,
            attraction: 0.08,
            rotation: 0.0005,
            repulsion: 0.8,
            repulsion_dist: 60.0,
            kick_force: 15.0,
            tick_hz: 60.0,
            max_steps_per_tick: 8,
            rng_seed: None,
            snapshot_path: "./snapshot.json".to_string(),
            poll_secs: 30,
            frame_every: 6,
            view_width: 1200.0,
            view_height: 800.0,
        }
    }
}

impl Config {
    /// Read every setting from the environment. Unset or unparsable
    /// numeric keys fall back to defaults; an unrecognised `RS_CONVENTION`
    /// is an error.
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            rs_convention: convention_from(std::env::var("RS_CONVENTION").ok().as_deref(), d.rs_convention)?,
            rs_band: std::env::var("RS_BAND").ok().and_then(|v| v.parse().ok()).unwrap_or(d.rs_band),
            rm_band: std::env::var("RM_BAND").ok().and_then(|v| v.parse().ok()).unwrap_or(d.rm_band),
            derive_alerts: std::env::var("DERIVE_ALERTS").map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes")).unwrap_or(d.derive_alerts),
            alert_recent_secs: std::env::var("ALERT_RECENT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.alert_recent_secs),
            alert_retention_secs: std::env::var("ALERT_RETENTION_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.alert_retention_secs),
            alert_log_cap: std::env::var("ALERT_LOG_CAP").ok().and_then(|v| v.parse().ok()).unwrap_or(d.alert_log_cap),
            seen_compact_at: std::env::var("SEEN_COMPACT_AT").ok().and_then(|v| v.parse().ok()).unwrap_or(d.seen_compact_at),
            seen_keep: std::env::var("SEEN_KEEP").ok().and_then(|v| v.parse().ok()).unwrap_or(d.seen_keep),
            trail_len: std::env::var("TRAIL_LEN").ok().and_then(|v| v.parse().ok()).unwrap_or(d.trail_len),
            scale_x: std::env::var("SCALE_X").ok().and_then(|v| v.parse().ok()).unwrap_or(d.scale_x),
            scale_y: std::env::var("SCALE_Y").ok().and_then(|v| v.parse().ok()).unwrap_or(d.scale_y),
            friction: std::env::var("FRICTION").ok().and_then(|v| v.parse().ok()).unwrap_or(d.friction),
            attraction: std::env::var("ATTRACTION").ok().and_then(|v| v.parse().ok()).unwrap_or(d.attraction),
            rotation: std::env::var("ROTATION").ok().and_then(|v| v.parse().ok()).unwrap_or(d.rotation),
            repulsion: std::env::var("REPULSION").ok().and_then(|v| v.parse().ok()).unwrap_or(d.repulsion),
            repulsion_dist: std::env::var("REPULSION_DIST").ok().and_then(|v| v.parse().ok()).unwrap_or(d.repulsion_dist),
            kick_force: std::env::var("KICK_FORCE").ok().and_then(|v| v.parse().ok()).unwrap_or(d.kick_force),
            tick_hz: std::env::var("TICK_HZ").ok().and_then(|v| v.parse().ok()).unwrap_or(d.tick_hz),
            max_steps_per_tick: std::env::var("MAX_STEPS_PER_TICK").ok().and_then(|v| v.parse().ok()).unwrap_or(d.max_steps_per_tick),
            rng_seed: std::env::var("RNG_SEED").ok().and_then(|v| v.parse().ok()),
            snapshot_path: std::env::var("SNAPSHOT_PATH").unwrap_or(d.snapshot_path),
            poll_secs: std::env::var("POLL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.poll_secs),
            frame_every: std::env::var("FRAME_EVERY").ok().and_then(|v| v.parse().ok()).unwrap_or(d.frame_every),
            view_width: std::env::var("VIEW_WIDTH").ok().and_then(|v| v.parse().ok()).unwrap_or(d.view_width),
            view_height: std::env::var("VIEW_HEIGHT").ok().and_then(|v| v.parse().ok()).unwrap_or(d.view_height),
        })
    }
}

/// Unset keeps `default`; anything else must name a known convention.
fn convention_from(value: Option<&str>, default: RsConvention) -> Result<RsConvention> {
    match value {
        None => Ok(default),
        Some(v) => v.parse(),
    }
}

pub fn now_ts() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
