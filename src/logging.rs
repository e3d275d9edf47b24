//! Structured logging for the rotation engine.
//!
//! Every record is a single JSON line carrying a run id, a monotonic
//! sequence number, a level and a domain. Records go to
//! `<LOG_DIR>/<run_id>/events.jsonl` (trace/debug to `trace.jsonl`) when
//! `LOG_DIR` is set, otherwise to stderr so stdout stays free for frames.
//!
//! Environment:
//! - `LOG_LEVEL`: minimum level (default `info`)
//! - `LOG_DOMAINS`: comma-separated domains, or `all`
//! - `PROFILE_SAMPLE`: fraction of `ProfileScope`s that report (default 1)
//! - `RUN_ID`: override the generated run id

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl FromStr for Level {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Level::Trace,
            "debug" => Level::Debug,
            "info" => Level::Info,
            "warn" | "warning" => Level::Warn,
            "error" => Level::Error,
            "fatal" => Level::Fatal,
            _ => return Err(()),
        })
    }
}

impl Level {
    /// Threshold from `LOG_LEVEL`, read once per process.
    pub fn threshold() -> Self {
        static THRESHOLD: OnceLock<Level> = OnceLock::new();
        *THRESHOLD.get_or_init(|| {
            std::env::var("LOG_LEVEL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(Level::Info)
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }
}

/// Record categories, filterable with `LOG_DOMAINS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Ingest,
    Classify,
    Score,
    Trend,
    Alert,
    Physics,
    Playback,
    System,
    Audit,
    Profile,
}

impl Domain {
    pub const ALL: [Domain; 10] = [
        Domain::Ingest,
        Domain::Classify,
        Domain::Score,
        Domain::Trend,
        Domain::Alert,
        Domain::Physics,
        Domain::Playback,
        Domain::System,
        Domain::Audit,
        Domain::Profile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Ingest => "ingest",
            Domain::Classify => "classify",
            Domain::Score => "score",
            Domain::Trend => "trend",
            Domain::Alert => "alert",
            Domain::Physics => "physics",
            Domain::Playback => "playback",
            Domain::System => "system",
            Domain::Audit => "audit",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        static FILTER: OnceLock<Option<Vec<String>>> = OnceLock::new();
        let filter = FILTER.get_or_init(|| {
            std::env::var("LOG_DOMAINS")
                .ok()
                .filter(|v| v.trim() != "all")
                .map(|v| v.split(',').map(|d| d.trim().to_string()).collect())
        });
        match filter {
            None => true,
            Some(names) => names.iter().any(|n| n == self.as_str()),
        }
    }
}

// =============================================================================
// Sinks
// =============================================================================

enum Sink {
    Stderr,
    Files {
        events: Mutex<BufWriter<File>>,
        trace: Mutex<BufWriter<File>>,
    },
}

struct Run {
    id: String,
    sink: Sink,
}

static SEQ: AtomicU64 = AtomicU64::new(0);
static PROFILE_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN: OnceLock<Run> = OnceLock::new();

fn next_seq() -> u64 {
    SEQ.fetch_add(1, Ordering::SeqCst)
}

fn run() -> &'static Run {
    RUN.get_or_init(|| {
        let id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("rot-{}-{}", ts_epoch_ms(), std::process::id()));
        let sink = match std::env::var("LOG_DIR") {
            Ok(base) => open_files(&Path::new(&base).join(&id), &id).unwrap_or_else(|err| {
                eprintln!("[log] falling back to stderr: {}", err);
                Sink::Stderr
            }),
            Err(_) => Sink::Stderr,
        };
        Run { id, sink }
    })
}

fn open_files(dir: &Path, run_id: &str) -> std::io::Result<Sink> {
    fs::create_dir_all(dir)?;
    let manifest = json!({
        "run_id": run_id,
        "started": ts_now(),
        "pid": std::process::id(),
        "crate_version": env!("CARGO_PKG_VERSION"),
    });
    fs::write(dir.join("manifest.json"), manifest.to_string())?;
    Ok(Sink::Files {
        events: Mutex::new(BufWriter::new(File::create(dir.join("events.jsonl"))?)),
        trace: Mutex::new(BufWriter::new(File::create(dir.join("trace.jsonl"))?)),
    })
}

fn append(writer: &Mutex<BufWriter<File>>, line: &str) {
    if let Ok(mut w) = writer.lock() {
        let _ = writeln!(w, "{}", line);
        let _ = w.flush();
    }
}

// =============================================================================
// Records
// =============================================================================

#[derive(Serialize)]
struct Record<'a> {
    ts: String,
    run_id: &'a str,
    seq: u64,
    lvl: &'static str,
    component: &'static str,
    event: &'a str,
    #[serde(flatten)]
    top: Map<String, Value>,
    data: Map<String, Value>,
}

/// Keys promoted from `data` to the top level for grep-ability.
const TOP_LEVEL_KEYS: [&str; 3] = ["symbol", "sector", "msg"];

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let top = TOP_LEVEL_KEYS
        .iter()
        .filter_map(|k| fields.remove(*k).map(|v| (k.to_string(), v)))
        .collect();
    (top, fields)
}

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < Level::threshold() || !domain.is_enabled() {
        return;
    }
    let run = run();
    let (top, data) = split_fields(fields);
    let record = Record {
        ts: ts_now(),
        run_id: &run.id,
        seq: next_seq(),
        lvl: level.as_str(),
        component: domain.as_str(),
        event,
        top,
        data,
    };
    let Ok(line) = serde_json::to_string(&record) else {
        return;
    };
    match &run.sink {
        Sink::Stderr => eprintln!("{}", line),
        Sink::Files { trace, .. } if level <= Level::Debug => append(trace, &line),
        Sink::Files { events, .. } => append(events, &line),
    }
}

// =============================================================================
// Domain helpers
// =============================================================================

pub fn log_snapshot_applied(sectors: usize, rejected: usize, signals: usize, alerts: usize) {
    log(
        Level::Info,
        Domain::Ingest,
        "snapshot_applied",
        obj(&[
            ("sectors", json!(sectors)),
            ("rejected", json!(rejected)),
            ("signals", json!(signals)),
            ("alerts", json!(alerts)),
        ]),
    );
}

/// A sector, signal or alert dropped at ingestion.
pub fn log_rejected(key: &str, reason: &str) {
    log(
        Level::Warn,
        Domain::Ingest,
        "entry_rejected",
        obj(&[("key", v_str(key)), ("reason", v_str(reason))]),
    );
}

/// Assigned state disagrees with the sign of directional strength.
pub fn log_anomaly(sector: &str, state: &str, directional_strength: f64) {
    log(
        Level::Warn,
        Domain::Classify,
        "state_anomaly",
        obj(&[
            ("sector", v_str(sector)),
            ("state", v_str(state)),
            ("directional_strength", v_num(directional_strength)),
        ]),
    );
}

pub fn log_score(symbol: &str, score: u8, capped: bool, trend: &str) {
    log(
        Level::Debug,
        Domain::Score,
        "confidence",
        obj(&[
            ("symbol", v_str(symbol)),
            ("score", json!(score)),
            ("capped", json!(capped)),
            ("trend", v_str(trend)),
        ]),
    );
}

pub fn log_trend_cache(previous: usize) {
    log(Level::Debug, Domain::Trend, "cache_rotated", obj(&[("previous_scores", json!(previous))]));
}

pub fn log_alert(symbol: &str, kind: &str, timestamp: f64, outcome: &str) {
    log(
        Level::Debug,
        Domain::Alert,
        "alert",
        obj(&[
            ("symbol", v_str(symbol)),
            ("type", v_str(kind)),
            ("timestamp", v_num(timestamp)),
            ("outcome", v_str(outcome)),
        ]),
    );
}

pub fn log_alert_rejected(symbol: &str, reason: &str) {
    log(
        Level::Warn,
        Domain::Alert,
        "alert_rejected",
        obj(&[("symbol", v_str(symbol)), ("reason", v_str(reason))]),
    );
}

pub fn log_seen_compacted(before: usize, after: usize) {
    log(
        Level::Debug,
        Domain::Alert,
        "seen_compacted",
        obj(&[("before", json!(before)), ("after", json!(after))]),
    );
}

pub fn log_quadrant_change(sector: &str, from: &str, to: &str) {
    log(
        Level::Info,
        Domain::Physics,
        "quadrant_change",
        obj(&[("sector", v_str(sector)), ("from", v_str(from)), ("to", v_str(to))]),
    );
}

pub fn log_playback(index: usize, date: Option<&str>) {
    log(
        Level::Info,
        Domain::Playback,
        "index_changed",
        obj(&[("index", json!(index)), ("date", date.map(v_str).unwrap_or(Value::Null))]),
    );
}

pub fn log_startup(snapshot_path: &str, convention: &str, tick_hz: f64) {
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("snapshot_path", v_str(snapshot_path)),
            ("rs_convention", v_str(convention)),
            ("tick_hz", v_num(tick_hz)),
        ]),
    );
}

/// Snapshot refresh outcome from the host loop ("applied", "unchanged", "failed").
pub fn log_refresh(path: &str, outcome: &str, error: Option<&str>) {
    let level = if error.is_some() { Level::Warn } else { Level::Debug };
    log(
        level,
        Domain::System,
        "refresh",
        obj(&[
            ("path", v_str(path)),
            ("outcome", v_str(outcome)),
            ("error", error.map(v_str).unwrap_or(Value::Null)),
        ]),
    );
}

pub fn log_audit(event_type: &str, digest: &str) {
    log(Level::Info, Domain::Audit, event_type, obj(&[("digest", v_str(digest))]));
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling
// =============================================================================

fn profile_sampled() -> bool {
    static RATE: OnceLock<f64> = OnceLock::new();
    let rate = *RATE.get_or_init(|| {
        std::env::var("PROFILE_SAMPLE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(1.0)
    });
    if rate >= 1.0 {
        return true;
    }
    if rate <= 0.0 {
        return false;
    }
    let bucket = PROFILE_SEQ.fetch_add(1, Ordering::Relaxed) % 10_000;
    (bucket as f64) < rate * 10_000.0
}

/// Times a scope and reports it on drop, at trace level.
pub struct ProfileScope {
    label: &'static str,
    started: Instant,
    /// `None` when this scope was not sampled
    fields: Option<Map<String, Value>>,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self::with_context(label, &[])
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        Self {
            label,
            started: Instant::now(),
            fields: profile_sampled().then(|| obj(fields)),
        }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let Some(mut fields) = self.fields.take() else {
            return;
        };
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(self.started.elapsed().as_secs_f64() * 1000.0));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}
