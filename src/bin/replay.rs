//! Headless replay: JSON lines on stdin drive one engine, frames and a
//! final summary go to stdout.
//!
//! Each line is either a bare snapshot object or a tagged event:
//! `{"type":"snapshot","now":..,"data":{..}}`, `{"type":"tick","dt":0.5}`,
//! `{"type":"playback","index":3}` (null for latest), `{"type":"frame"}`.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};

use rotationfx::engine::RotationEngine;
use rotationfx::model::{digest, Snapshot};
use rotationfx::logging::log_audit;
use rotationfx::render::JsonLinesAdapter;
use rotationfx::state::{now_ts, Config};

#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum InputEvent {
    Snapshot {
        #[serde(default)]
        now: Option<f64>,
        data: Value,
    },
    Tick {
        dt: f64,
    },
    Playback {
        #[serde(default)]
        index: Option<usize>,
    },
    Frame,
}

fn parse_line(line: &str) -> Result<InputEvent> {
    let value: Value = serde_json::from_str(line).context("bad json")?;
    if value.get("type").is_some() {
        return serde_json::from_value(value).context("bad event");
    }
    Ok(InputEvent::Snapshot { now: None, data: value })
}

fn main() -> Result<()> {
    let cfg = Config::from_env().context("loading config")?;
    let convention = cfg.rs_convention;
    let mut engine = RotationEngine::new(cfg);
    let stdout = io::stdout();
    let mut adapter = JsonLinesAdapter::new(stdout.lock());
    let mut applied = 0usize;
    let mut skipped = 0usize;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let event = match parse_line(&line) {
            Ok(evt) => evt,
            Err(err) => {
                eprintln!("skipping line: {:#}", err);
                skipped += 1;
                continue;
            }
        };

        match event {
            InputEvent::Snapshot { now, data } => {
                let text = data.to_string();
                match Snapshot::from_json(&text, convention) {
                    Ok(snapshot) => {
                        log_audit("snapshot_digest", &digest(&text));
                        engine.apply_snapshot(snapshot, now.unwrap_or_else(now_ts));
                        applied += 1;
                    }
                    Err(err) => {
                        eprintln!("skipping snapshot: {}", err);
                        skipped += 1;
                    }
                }
            }
            InputEvent::Tick { dt } => {
                engine.tick(dt);
            }
            InputEvent::Playback { index } => engine.set_playback_index(index),
            InputEvent::Frame => engine.render(&mut adapter).context("writing frame")?,
        }
    }

    let notices = engine.drain_notices();
    let summary = json!({
        "applied": applied,
        "skipped": skipped,
        "steps": engine.sim().steps(),
        "board": engine.sector_board(),
        "actionable": engine.actionable_sectors(),
        "signals": engine.ranked_signals(None),
        "alert_log": engine.alert_log(),
        "notices": notices,
    });
    let mut out = adapter.into_inner();
    writeln!(out, "{}", summary).context("writing summary")?;
    Ok(())
}
