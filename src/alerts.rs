//! Alert deduplication, impulse requests and the bounded retention log.
//!
//! Every alert is identified by `symbol-timestamp`. An identity is only
//! ever acted on once: the first sighting may produce a visual impulse
//! (when recent) and a log entry (when within retention); later sightings
//! are ignored. The seen-set is compacted after each batch so it stays
//! bounded over a long session.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

use crate::format::PLACEHOLDER;
use crate::logging::{log_alert, log_alert_rejected, log_seen_compacted};
use crate::model::{short_name, Alert, HistoryPoint, Priority};
use crate::regime::{Classifier, QuadrantState};
use crate::state::Config;

pub const ENTER_LEADING: &str = "ENTER_LEADING";
pub const EXIT_LEADING: &str = "EXIT_LEADING";
pub const ENTER_LAGGING: &str = "ENTER_LAGGING";
pub const EXIT_LAGGING: &str = "EXIT_LAGGING";

/// Request for the particle simulation to pulse (and maybe kick) a sector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpulseRequest {
    pub symbol: String,
    /// HIGH priority alerts also get a random velocity kick
    pub kick: bool,
}

/// Entry in the retention log shown beside the plane.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub symbol: String,
    pub kind: String,
    pub priority: Priority,
    pub timestamp: f64,
    /// Quadrant at alert time, from the alert's own rs/rm
    pub state: QuadrantState,
}

impl LogEntry {
    pub fn title(&self) -> &str {
        short_name(&self.symbol)
    }

    pub fn kind_label(&self) -> String {
        self.kind.replacen('_', " ", 1)
    }

    pub fn color(&self) -> &'static str {
        self.state.color()
    }
}

/// Result of processing one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertOutcome {
    pub impulses: Vec<ImpulseRequest>,
    /// Transient HUD notices, e.g. "BANK: ENTER LEADING"
    pub notices: Vec<String>,
    pub logged: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone)]
pub struct AlertDeduplicator {
    seen: HashSet<String>,
    /// Insertion order of `seen`, oldest first
    order: VecDeque<String>,
    log: VecDeque<LogEntry>,
    classifier: Classifier,
    recent_secs: f64,
    retention_secs: f64,
    log_cap: usize,
    compact_at: usize,
    keep: usize,
}

impl AlertDeduplicator {
    pub fn new(config: &Config) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            log: VecDeque::with_capacity(config.alert_log_cap),
            classifier: Classifier::canonical(),
            recent_secs: config.alert_recent_secs,
            retention_secs: config.alert_retention_secs,
            log_cap: config.alert_log_cap,
            compact_at: config.seen_compact_at,
            keep: config.seen_keep.min(config.seen_compact_at),
        }
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    pub fn has_seen(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    /// Retention log, newest first.
    pub fn log(&self) -> impl Iterator<Item = &LogEntry> {
        self.log.iter()
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    pub fn process(&mut self, alerts: &[Alert], now: f64) -> AlertOutcome {
        let mut outcome = AlertOutcome::default();

        for alert in alerts {
            let (key, ts) = match (alert.key(), alert.timestamp) {
                (Some(key), Some(ts)) if !alert.symbol.is_empty() && ts.is_finite() => (key, ts),
                _ => {
                    let reason = if alert.symbol.is_empty() {
                        "missing symbol"
                    } else {
                        "unparsable timestamp"
                    };
                    log_alert_rejected(&alert.symbol, reason);
                    outcome.rejected += 1;
                    continue;
                }
            };

            if self.seen.contains(&key) {
                outcome.duplicates += 1;
                continue;
            }
            self.seen.insert(key.clone());
            self.order.push_back(key);

            let age = now - ts;
            if age < self.recent_secs {
                outcome.impulses.push(ImpulseRequest {
                    symbol: alert.symbol.clone(),
                    kick: alert.priority == Priority::High,
                });
                outcome.notices.push(format!(
                    "{}: {}",
                    short_name(&alert.symbol),
                    alert.kind.replacen('_', " ", 1)
                ));
            }

            if age <= self.retention_secs {
                self.push_log(alert, ts);
                outcome.logged += 1;
                log_alert(&alert.symbol, &alert.kind, ts, "logged");
            } else {
                log_alert(&alert.symbol, &alert.kind, ts, "expired");
            }
        }

        self.compact();
        outcome
    }

    fn push_log(&mut self, alert: &Alert, ts: f64) {
        let state = match (alert.rs, alert.rm) {
            (Some(rs), Some(rm)) => self.classifier.classify(rs, rm),
            _ => QuadrantState::Neutral,
        };
        self.log.push_front(LogEntry {
            symbol: alert.symbol.clone(),
            kind: alert.kind.clone(),
            priority: alert.priority,
            timestamp: ts,
            state,
        });
        self.log.truncate(self.log_cap);
    }

    fn compact(&mut self) {
        if self.seen.len() <= self.compact_at {
            return;
        }
        let before = self.seen.len();
        while self.order.len() > self.keep {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
        log_seen_compacted(before, self.seen.len());
    }
}

/// Derive transition alerts from a sector's history.
///
/// Only entries into and exits from LEADING and LAGGING are reported.
/// Points whose date cannot be parsed still advance the previous state
/// but emit nothing.
pub fn detect_transitions(key: &str, history: &[HistoryPoint], classifier: &Classifier) -> Vec<Alert> {
    let mut alerts = Vec::new();
    let mut prev: Option<QuadrantState> = None;

    for point in history {
        let curr = classifier.classify(point.rs, point.rm);
        if let Some(prev_state) = prev {
            if let Some((kind, priority)) = transition_kind(prev_state, curr) {
                if let Some(timestamp) = date_to_epoch(&point.date) {
                    alerts.push(Alert {
                        symbol: key.to_string(),
                        timestamp: Some(timestamp),
                        kind: kind.to_string(),
                        priority,
                        rs: Some(point.rs),
                        rm: Some(point.rm),
                    });
                }
            }
        }
        prev = Some(curr);
    }
    alerts
}

fn transition_kind(prev: QuadrantState, curr: QuadrantState) -> Option<(&'static str, Priority)> {
    if prev == curr {
        return None;
    }
    match (prev, curr) {
        (_, QuadrantState::Leading) => Some((ENTER_LEADING, Priority::High)),
        (QuadrantState::Leading, _) => Some((EXIT_LEADING, Priority::Normal)),
        (_, QuadrantState::Lagging) => Some((ENTER_LAGGING, Priority::High)),
        (QuadrantState::Lagging, _) => Some((EXIT_LAGGING, Priority::Normal)),
        _ => None,
    }
}

fn date_to_epoch(date: &str) -> Option<f64> {
    let day = NaiveDate::parse_from_str(date.get(..10).unwrap_or(date), "%Y-%m-%d").ok()?;
    Some(day.and_hms_opt(0, 0, 0)?.and_utc().timestamp() as f64)
}

/// Log display time: `HH:MM` for alerts on the same UTC day as `now`,
/// `Mon D` otherwise.
pub fn display_time(timestamp: f64, now: f64) -> String {
    let (Some(at), Some(today)) = (to_utc(timestamp), to_utc(now)) else {
        return PLACEHOLDER.to_string();
    };
    if at.date_naive() == today.date_naive() {
        at.format("%H:%M").to_string()
    } else {
        format!("{} {}", at.format("%b"), at.day())
    }
}

fn to_utc(ts: f64) -> Option<DateTime<Utc>> {
    if !ts.is_finite() {
        return None;
    }
    DateTime::from_timestamp(ts.floor() as i64, 0)
}
