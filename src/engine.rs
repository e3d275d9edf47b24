//! Rotation engine: the single owner of all mutable state.
//!
//! ```text
//! ┌────────────┐ apply_snapshot ┌──────────────┐   impulses   ┌──────────────┐
//! │  Snapshot  │───────────────►│ classify /   │─────────────►│ ParticleSim  │
//! │ (validated)│                │ score / dedup│   retarget   │ (fixed step) │
//! └────────────┘                └──────────────┘─────────────►└──────────────┘
//!                                       ▲                            ▲
//!                      set_playback_index                         tick(dt)
//! ```
//!
//! `apply_snapshot` and `tick` both take `&mut self`, so a snapshot is
//! always installed whole between two physics steps.

use serde::Serialize;
use serde_json::json;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::alerts::{detect_transitions, AlertDeduplicator, AlertOutcome, LogEntry};
use crate::confidence::{score, Confidence};
use crate::logging::{log_playback, log_score, log_snapshot_applied, ProfileScope};
use crate::model::{Sector, Signal, Snapshot};
use crate::physics::{HoverChange, ParticleSim, Retarget, Scheduler};
use crate::playback::{trail, PlaneMapping, Playback};
use crate::regime::{audit_state, board_order, Classifier, QuadrantState, Shift};
use crate::render::{DrawAdapter, Frame, ParticleView};
use crate::state::Config;
use crate::trend::{Trend, TrendTracker};

pub const AWAITING_DATA: &str = "Awaiting sector rotation data...";
pub const ACTIONABLE_LIMIT: usize = 4;
/// Pending notices kept between renders; oldest are dropped first.
pub const NOTICE_CAP: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSignal {
    pub signal: Signal,
    pub confidence: Confidence,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardRow {
    pub key: String,
    pub name: String,
    pub state: QuadrantState,
    /// What the feed claimed, if anything
    pub reported_state: Option<QuadrantState>,
    pub rank: u32,
    pub momentum_score: f64,
    pub shift: Shift,
    pub rs: f64,
    pub rm: f64,
    pub breadth: Option<f64>,
    pub rel_volume: Option<f64>,
    pub color: &'static str,
    pub description: &'static str,
    pub commentary: Option<String>,
    pub anomalous: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "rows", rename_all = "snake_case")]
pub enum SectorBoard {
    AwaitingData,
    Ready(Vec<BoardRow>),
}

impl SectorBoard {
    pub fn rows(&self) -> &[BoardRow] {
        match self {
            SectorBoard::AwaitingData => &[],
            SectorBoard::Ready(rows) => rows,
        }
    }

    pub fn message(&self) -> Option<&'static str> {
        match self {
            SectorBoard::AwaitingData => Some(AWAITING_DATA),
            SectorBoard::Ready(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyReport {
    pub sectors: usize,
    pub rejected: usize,
    pub signals: usize,
    pub alerts: AlertOutcome,
    pub quadrant_changes: usize,
}

pub struct RotationEngine {
    config: Config,
    classifier: Classifier,
    mapping: PlaneMapping,
    snapshot: Snapshot,
    states: HashMap<String, QuadrantState>,
    anomalies: HashMap<String, bool>,
    scored: Vec<ScoredSignal>,
    trend: TrendTracker,
    alerts: AlertDeduplicator,
    sim: ParticleSim,
    scheduler: Scheduler,
    playback: Playback,
    notices: Vec<String>,
}

impl RotationEngine {
    pub fn new(config: Config) -> Self {
        let classifier = Classifier::canonical().with_hysteresis(config.rs_band, config.rm_band);
        Self {
            classifier,
            mapping: PlaneMapping::from_config(&config),
            snapshot: Snapshot::default(),
            states: HashMap::new(),
            anomalies: HashMap::new(),
            scored: Vec::new(),
            trend: TrendTracker::new(),
            alerts: AlertDeduplicator::new(&config),
            sim: ParticleSim::new(&config),
            scheduler: Scheduler::from_config(&config),
            playback: Playback::latest(),
            notices: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn sim(&self) -> &ParticleSim {
        &self.sim
    }

    pub fn state_of(&self, key: &str) -> Option<QuadrantState> {
        self.states.get(key).copied()
    }

    /// Install a new snapshot. Trend cache rotation happens first, from the
    /// outgoing signal set, so new scores compare against the last cycle.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot, now: f64) -> ApplyReport {
        let _scope = ProfileScope::with_context(
            "apply_snapshot",
            &[
                ("sectors", json!(snapshot.sectors.len())),
                ("signals", json!(snapshot.signals.len())),
            ],
        );

        self.trend.rotate(
            self.scored
                .iter()
                .map(|s| (s.signal.symbol.as_str(), s.confidence.score)),
        );

        let mut states = HashMap::with_capacity(snapshot.sectors.len());
        let mut anomalies = HashMap::with_capacity(snapshot.sectors.len());
        for (key, sector) in &snapshot.sectors {
            let previous = self.states.get(key).copied();
            let state = self.classifier.classify_with(sector.current.rs, sector.current.rm, previous);
            let strength = sector
                .metrics
                .directional_strength
                .unwrap_or_else(|| self.classifier.implied_strength(sector.current.rs));
            let reported = sector
                .metrics
                .reported_state
                .map_or(false, |claimed| audit_state(key, claimed, strength));
            let assigned = audit_state(key, state, strength);
            anomalies.insert(key.clone(), reported || assigned);
            states.insert(key.clone(), state);
        }

        let scored: Vec<ScoredSignal> = snapshot
            .signals
            .iter()
            .map(|signal| {
                let confidence = score(signal);
                let trend = self.trend.trend(&signal.symbol, confidence.score, signal.sector_state);
                log_score(&signal.symbol, confidence.score, confidence.was_capped(), trend.as_str());
                ScoredSignal { signal: signal.clone(), confidence, trend }
            })
            .collect();

        let mut batch = snapshot.alerts.clone();
        if self.config.derive_alerts {
            for (key, sector) in &snapshot.sectors {
                batch.extend(detect_transitions(key, &sector.history, &self.classifier));
            }
        }
        let outcome = self.alerts.process(&batch, now);

        log_snapshot_applied(
            snapshot.sectors.len(),
            snapshot.rejected.len(),
            snapshot.signals.len(),
            batch.len(),
        );

        self.snapshot = snapshot;
        self.states = states;
        self.anomalies = anomalies;
        self.scored = scored;

        self.sim
            .sync(self.snapshot.sectors.values().map(|s| (s.key.as_str(), s.weight)));
        let quadrant_notices = self.retarget_all();
        for impulse in &outcome.impulses {
            self.sim.impulse(&impulse.symbol, impulse.kick);
        }

        let report = ApplyReport {
            sectors: self.snapshot.sectors.len(),
            rejected: self.snapshot.rejected.len(),
            signals: self.scored.len(),
            quadrant_changes: quadrant_notices.len(),
            alerts: outcome.clone(),
        };
        self.push_notices(quadrant_notices);
        self.push_notices(outcome.notices);
        report
    }

    fn push_notices(&mut self, notices: Vec<String>) {
        self.notices.extend(notices);
        if self.notices.len() > NOTICE_CAP {
            let excess = self.notices.len() - NOTICE_CAP;
            self.notices.drain(..excess);
        }
    }

    fn retarget_all(&mut self) -> Vec<String> {
        let targets: Vec<Retarget> = self
            .snapshot
            .sectors
            .values()
            .map(|sector| self.retarget_for(sector))
            .collect();
        self.sim.retarget(&targets)
    }

    fn retarget_for(&self, sector: &Sector) -> Retarget {
        let index = self.playback.resolve(sector.history.len());
        let observation = sector.observation_at(index);
        let previous = self.sim.particle(&sector.key).and_then(|p| p.quadrant);
        Retarget {
            key: sector.key.clone(),
            observation,
            target: self.mapping.target(observation),
            state: self.classifier.classify_with(observation.rs, observation.rm, previous),
            trail: trail(sector, index, self.config.trail_len, &self.mapping),
        }
    }

    /// Scrub history. `None` returns to the latest observation.
    pub fn set_playback_index(&mut self, index: Option<usize>) {
        self.playback = match index {
            Some(i) => Playback::at(i),
            None => Playback::latest(),
        };
        let first = self.snapshot.sectors.values().next();
        let resolved = first.map(|s| self.playback.resolve(s.history.len())).unwrap_or(0);
        log_playback(resolved, first.and_then(|s| self.playback.date(s)));

        let notices = self.retarget_all();
        self.push_notices(notices);
    }

    pub fn playback(&self) -> Playback {
        self.playback
    }

    /// Longest history across sectors; bounds the playback slider.
    pub fn history_len(&self) -> usize {
        self.snapshot.sectors.values().map(|s| s.history.len()).max().unwrap_or(0)
    }

    /// Advance physics by `dt` seconds of wall time. Returns steps run.
    pub fn tick(&mut self, dt: f64) -> u32 {
        let steps = self.scheduler.advance(dt);
        for _ in 0..steps {
            self.sim.step();
        }
        steps
    }

    pub fn sector_board(&self) -> SectorBoard {
        if self.snapshot.is_empty() {
            return SectorBoard::AwaitingData;
        }
        let mut rows: Vec<BoardRow> = self
            .snapshot
            .sectors
            .values()
            .map(|s| self.board_row(s))
            .collect();
        rows.sort_by(|a, b| board_order((a.state, a.momentum_score), (b.state, b.momentum_score)));
        SectorBoard::Ready(rows)
    }

    fn board_row(&self, sector: &Sector) -> BoardRow {
        let state = self.states.get(&sector.key).copied().unwrap_or(QuadrantState::Neutral);
        BoardRow {
            key: sector.key.clone(),
            name: sector.short_name().to_string(),
            state,
            reported_state: sector.metrics.reported_state,
            rank: sector.rank,
            momentum_score: sector.metrics.momentum_score,
            shift: sector.metrics.shift,
            rs: sector.current.rs,
            rm: sector.current.rm,
            breadth: sector.metrics.breadth,
            rel_volume: sector.metrics.rel_volume,
            color: state.color(),
            description: state.description(),
            commentary: sector.commentary.clone(),
            anomalous: self.anomalies.get(&sector.key).copied().unwrap_or(false),
        }
    }

    pub fn row(&self, key: &str) -> Option<BoardRow> {
        self.snapshot.sectors.get(key).map(|s| self.board_row(s))
    }

    /// LEADING or IMPROVING sectors, strongest momentum first.
    pub fn actionable_sectors(&self) -> Vec<BoardRow> {
        let mut rows: Vec<BoardRow> = self
            .sector_board()
            .rows()
            .iter()
            .filter(|r| r.state.is_actionable())
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.momentum_score.partial_cmp(&a.momentum_score).unwrap_or(Ordering::Equal));
        rows.truncate(ACTIONABLE_LIMIT);
        rows
    }

    pub fn scored_signals(&self) -> &[ScoredSignal] {
        &self.scored
    }

    /// Signals ordered by volume expansion, then sector RS, then price
    /// change, all descending. `sector` filters by sector key.
    pub fn ranked_signals(&self, sector: Option<&str>) -> Vec<&ScoredSignal> {
        let mut out: Vec<&ScoredSignal> = self
            .scored
            .iter()
            .filter(|s| sector.map_or(true, |k| s.signal.sector_key == k))
            .collect();
        out.sort_by(|a, b| {
            desc(a.signal.vol_ratio, b.signal.vol_ratio)
                .then_with(|| desc(a.signal.rs_sector, b.signal.rs_sector))
                .then_with(|| desc(a.signal.change, b.signal.change))
        });
        out
    }

    pub fn alert_log(&self) -> Vec<LogEntry> {
        self.alerts.log().cloned().collect()
    }

    pub fn drain_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    pub fn pending_notices(&self) -> &[String] {
        &self.notices
    }

    /// Current frame. Pending notices are included but not consumed.
    pub fn frame(&self) -> Frame {
        let highlighted = self.sim.highlighted();
        let hovered = self.sim.hovered();
        let particles = self
            .sim
            .particles()
            .iter()
            .map(|p| {
                ParticleView::from_particle(
                    p,
                    hovered == Some(p.key.as_str()),
                    highlighted.contains(&p.key.as_str()),
                )
            })
            .collect();
        let date = self
            .snapshot
            .sectors
            .values()
            .next()
            .and_then(|s| self.playback.date(s))
            .map(str::to_string);
        let view = &self.sim.viewport;
        Frame {
            step: self.sim.steps(),
            zoom: view.zoom,
            pan: (view.pan_x, view.pan_y),
            date,
            particles,
            notices: self.notices.clone(),
            log: self.alert_log(),
        }
    }

    /// Draw the current frame and consume pending notices.
    pub fn render<A: DrawAdapter>(&mut self, adapter: &mut A) -> std::io::Result<()> {
        let frame = self.frame();
        adapter.draw(&frame)?;
        self.notices.clear();
        Ok(())
    }

    pub fn pointer_move(&mut self, sx: f64, sy: f64) -> Option<HoverChange> {
        self.sim.pointer_move(sx, sy)
    }

    pub fn pointer_down(&mut self, sx: f64, sy: f64) {
        self.sim.viewport.begin_drag(sx, sy);
    }

    pub fn pointer_up(&mut self) {
        self.sim.viewport.end_drag();
    }

    pub fn wheel(&mut self, delta_y: f64) {
        self.sim.viewport.wheel(delta_y);
    }

    pub fn reset_view(&mut self) {
        self.sim.viewport.reset();
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.sim.viewport.resize(width, height);
    }
}

fn desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    let a = a.filter(|v| v.is_finite()).unwrap_or(f64::NEG_INFINITY);
    let b = b.filter(|v| v.is_finite()).unwrap_or(f64::NEG_INFINITY);
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::RsConvention;

    const NOW: f64 = 1_704_500_000.0;

    fn engine() -> RotationEngine {
        RotationEngine::new(Config { rng_seed: Some(11), ..Config::default() })
    }

    fn snapshot(json: &str) -> Snapshot {
        Snapshot::from_json(json, RsConvention::Ratio).unwrap()
    }

    const BASIC: &str = r#"{
        "sectors": {
            "NIFTY_IT":   {"current": {"rs": 1.05, "rm": 0.002},  "metrics": {"momentumScore": 115}},
            "NIFTY_BANK": {"current": {"rs": 0.95, "rm": 0.002},  "metrics": {"momentumScore": 105}},
            "NIFTY_AUTO": {"current": {"rs": 0.95, "rm": -0.002}, "metrics": {"momentumScore": 85}},
            "NIFTY_FMCG": {"current": {"rs": 1.05, "rm": -0.002}, "metrics": {"momentumScore": 95}}
        },
        "signals": [
            {"symbol": "TCS", "sectorKey": "NIFTY_IT", "sectorState": "LEADING", "stockActive": true,
             "volRatio": 2.5, "technical": {"aboveVWAP": true, "isBreakout": true},
             "session": {"quality": "BEST"}, "riskLevel": "LOW"},
            {"symbol": "SBIN", "sectorKey": "NIFTY_BANK", "sectorState": "LAGGING", "stockActive": true,
             "volRatio": 1.6, "technical": {"aboveVWAP": true, "isBreakout": true},
             "session": {"quality": "BEST"}, "riskLevel": "LOW"}
        ],
        "alerts": []
    }"#;

    #[test]
    fn test_empty_engine_awaits_data() {
        let e = engine();
        assert_eq!(e.sector_board(), SectorBoard::AwaitingData);
        assert_eq!(e.sector_board().message(), Some(AWAITING_DATA));
    }

    #[test]
    fn test_board_classified_and_sorted() {
        let mut e = engine();
        e.apply_snapshot(snapshot(BASIC), NOW);
        let board = e.sector_board();
        let states: Vec<_> = board.rows().iter().map(|r| (r.name.as_str(), r.state)).collect();
        assert_eq!(
            states,
            vec![
                ("IT", QuadrantState::Leading),
                ("BANK", QuadrantState::Improving),
                ("FMCG", QuadrantState::Weakening),
                ("AUTO", QuadrantState::Lagging),
            ]
        );
    }

    #[test]
    fn test_signals_scored_with_trend() {
        let mut e = engine();
        e.apply_snapshot(snapshot(BASIC), NOW);
        let tcs = &e.scored_signals()[0];
        assert_eq!(tcs.confidence.score, 100);
        assert_eq!(tcs.trend, Trend::Stable);
        let sbin = &e.scored_signals()[1];
        assert_eq!(sbin.confidence.score, 30);
        assert_eq!(sbin.trend, Trend::Down);
    }

    #[test]
    fn test_trend_compares_with_previous_snapshot() {
        let mut e = engine();
        e.apply_snapshot(snapshot(BASIC), NOW);
        let weaker = BASIC.replace("\"volRatio\": 2.5", "\"volRatio\": 1.0");
        e.apply_snapshot(snapshot(&weaker), NOW + 30.0);
        let tcs = &e.scored_signals()[0];
        assert_eq!(tcs.confidence.score, 85);
        assert_eq!(tcs.trend, Trend::Down);

        e.apply_snapshot(snapshot(BASIC), NOW + 60.0);
        assert_eq!(e.scored_signals()[0].trend, Trend::Up);
    }

    #[test]
    fn test_actionable_sectors() {
        let mut e = engine();
        e.apply_snapshot(snapshot(BASIC), NOW);
        let names: Vec<_> = e.actionable_sectors().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["IT", "BANK"]);
    }

    #[test]
    fn test_ranked_signals_by_volume() {
        let mut e = engine();
        e.apply_snapshot(snapshot(BASIC), NOW);
        let order: Vec<_> = e.ranked_signals(None).iter().map(|s| s.signal.symbol.as_str()).collect();
        assert_eq!(order, vec!["TCS", "SBIN"]);
        assert_eq!(e.ranked_signals(Some("NIFTY_BANK")).len(), 1);
    }

    #[test]
    fn test_alert_impulse_applied_once() {
        let mut e = engine();
        let with_alert = BASIC.replace(
            "\"alerts\": []",
            &format!(
                "\"alerts\": [{{\"symbol\": \"NIFTY_IT\", \"timestamp\": {}, \"type\": \"ENTER_LEADING\", \"priority\": \"HIGH\", \"rs\": 1.05, \"rm\": 0.002}}]",
                NOW - 5.0
            ),
        );
        let report = e.apply_snapshot(snapshot(&with_alert), NOW);
        assert_eq!(report.alerts.impulses.len(), 1);
        assert_eq!(e.sim().particle("NIFTY_IT").map(|p| p.pulse), Some(1.0));
        assert!(e.drain_notices().contains(&"IT: ENTER LEADING".to_string()));

        let again = e.apply_snapshot(snapshot(&with_alert), NOW + 1.0);
        assert!(again.alerts.impulses.is_empty());
        assert_eq!(e.alert_log().len(), 1);
    }

    #[test]
    fn test_tick_runs_fixed_steps() {
        let mut e = engine();
        e.apply_snapshot(snapshot(BASIC), NOW);
        assert_eq!(e.tick(1.0 / 30.0 + 1e-9), 2);
        assert_eq!(e.sim().steps(), 2);
        assert_eq!(e.tick(5.0), 8);
    }

    #[test]
    fn test_particles_survive_missing_sector_and_empty_snapshot() {
        let mut e = engine();
        e.apply_snapshot(snapshot(BASIC), NOW);
        for _ in 0..100 {
            e.tick(0.1);
        }
        let it = |e: &RotationEngine| {
            let p = e.sim().particle("NIFTY_IT").unwrap();
            (p.x, p.y, p.vx, p.vy, p.present)
        };
        let settled = it(&e);

        let without_it = BASIC.replace(
            r#""NIFTY_IT":   {"current": {"rs": 1.05, "rm": 0.002},  "metrics": {"momentumScore": 115}},"#,
            "",
        );
        e.apply_snapshot(snapshot(&without_it), NOW + 30.0);
        assert_eq!(e.sim().particles().len(), 4);
        let (x, y, vx, vy, present) = it(&e);
        assert_eq!((x, y, vx, vy), (settled.0, settled.1, settled.2, settled.3));
        assert!(!present);
        assert!(e.frame().particles.iter().any(|v| v.key == "NIFTY_IT" && v.stale));

        e.apply_snapshot(snapshot("{}"), NOW + 60.0);
        assert_eq!(e.sector_board(), SectorBoard::AwaitingData);
        let frame = e.frame();
        assert_eq!(frame.particles.len(), 4);
        assert!(frame.particles.iter().all(|v| v.stale));

        e.apply_snapshot(snapshot(BASIC), NOW + 90.0);
        let (x, y, vx, vy, present) = it(&e);
        assert_eq!((x, y, vx, vy), (settled.0, settled.1, settled.2, settled.3));
        assert!(present);
        assert!(e.frame().particles.iter().all(|v| !v.stale));
    }

    #[test]
    fn test_reported_state_contradiction_flagged() {
        let mut e = engine();
        let json = r#"{"sectors": {
            "NIFTY_IT":    {"current": {"rs": 0.97, "rm": 0.002}, "metrics": {"state": "LEADING", "sr": -0.012}},
            "NIFTY_BANK":  {"current": {"rs": 1.02, "rm": 0.002}, "metrics": {"state": "IMPROVING"}},
            "NIFTY_PHARMA":{"current": {"rs": 1.02, "rm": 0.002}, "metrics": {"state": "LEADING"}}
        }}"#;
        e.apply_snapshot(snapshot(json), NOW);

        let it = e.row("NIFTY_IT").unwrap();
        assert_eq!(it.reported_state, Some(QuadrantState::Leading));
        assert_eq!(it.state, QuadrantState::Improving);
        assert!(it.anomalous);

        let bank = e.row("NIFTY_BANK").unwrap();
        assert_eq!(bank.state, QuadrantState::Leading);
        assert!(bank.anomalous);

        assert!(!e.row("NIFTY_PHARMA").unwrap().anomalous);
    }

    #[test]
    fn test_pending_notices_capped() {
        let mut e = engine();
        e.push_notices((0..NOTICE_CAP + 10).map(|i| format!("n{}", i)).collect());
        assert_eq!(e.pending_notices().len(), NOTICE_CAP);
        assert_eq!(e.pending_notices()[0], "n10");
        assert_eq!(e.pending_notices().last().unwrap(), &format!("n{}", NOTICE_CAP + 9));
    }

    #[test]
    fn test_render_consumes_notices() {
        let mut e = engine();
        e.apply_snapshot(snapshot(BASIC), NOW);
        e.notices.push("X".to_string());
        let mut rec = crate::render::RecordingAdapter::default();
        e.render(&mut rec).unwrap();
        assert_eq!(rec.frames[0].notices, vec!["X".to_string()]);
        assert_eq!(rec.frames[0].particles.len(), 4);
        assert!(e.pending_notices().is_empty());
    }
}
