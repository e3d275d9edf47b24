use anyhow::{Context, Result};
use rotationfx::engine::RotationEngine;
use rotationfx::logging::{log_audit, log_refresh, log_startup};
use rotationfx::model::{digest, Snapshot};
use rotationfx::physics::Scheduler;
use rotationfx::render::JsonLinesAdapter;
use rotationfx::state::{now_ts, Config};
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

/// Re-read the snapshot file; returns whether a new snapshot was applied.
async fn refresh(cfg: &Config, engine: &mut RotationEngine, last_digest: &mut Option<String>) -> Result<bool> {
    let text = tokio::fs::read_to_string(&cfg.snapshot_path)
        .await
        .with_context(|| format!("reading {}", cfg.snapshot_path))?;
    let hash = digest(&text);
    if last_digest.as_deref() == Some(hash.as_str()) {
        return Ok(false);
    }
    let snapshot = Snapshot::from_json(&text, cfg.rs_convention).context("parsing snapshot")?;
    log_audit("snapshot_digest", &hash);
    engine.apply_snapshot(snapshot, now_ts());
    *last_digest = Some(hash);
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env().context("loading config")?;
    log_startup(&cfg.snapshot_path, cfg.rs_convention.as_str(), cfg.tick_hz);

    let mut engine = RotationEngine::new(cfg.clone());
    let mut adapter = JsonLinesAdapter::new(std::io::stdout());
    let mut last_digest: Option<String> = None;

    let frame_period = Duration::from_secs_f64(Scheduler::from_config(&cfg).step_secs());
    let mut frames = interval(frame_period);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut poll = interval(Duration::from_secs(cfg.poll_secs.max(1)));
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let frame_every = cfg.frame_every.max(1);
    let mut last_tick = Instant::now();
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = poll.tick() => {
                match refresh(&cfg, &mut engine, &mut last_digest).await {
                    Ok(true) => log_refresh(&cfg.snapshot_path, "applied", None),
                    Ok(false) => log_refresh(&cfg.snapshot_path, "unchanged", None),
                    Err(err) => log_refresh(&cfg.snapshot_path, "failed", Some(&format!("{:#}", err))),
                }
            }
            _ = frames.tick() => {
                let now = Instant::now();
                engine.tick((now - last_tick).as_secs_f64());
                last_tick = now;
                ticks += 1;
                if ticks % frame_every == 0 {
                    engine.render(&mut adapter).context("writing frame")?;
                }
            }
        }
    }
}
