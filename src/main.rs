use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use serde_json::json;
use tokio::time::{sleep, Duration};

use ductwork::config::Config;
use ductwork::logging::{json_log, log, log_session_summary, obj, v_str, Domain, Level};
use ductwork::simulation::Simulation;
use ductwork::storage::EpochStore;

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env()?;
    let epochs = env_u64("EPOCHS", 100);
    let tick_ms = env_u64("TICK_MS", 0);
    let checkpoint_path = std::env::var("CHECKPOINT_PATH").ok().map(PathBuf::from);

    json_log(
        "startup",
        obj(&[
            ("layout", v_str(cfg.layout.as_str())),
            ("width", json!(cfg.width)),
            ("height", json!(cfg.height)),
            ("backend", v_str(cfg.backend.as_str())),
            ("workers", json!(cfg.workers)),
            ("services", json!(cfg.services)),
            ("epochs", json!(epochs)),
            ("fingerprint", v_str(&cfg.fingerprint())),
        ]),
    );

    let mut sim = match &checkpoint_path {
        Some(path) if path.exists() => Simulation::restore(path, cfg.clone())?,
        _ => Simulation::new(cfg.clone())?,
    };

    let mut store = match std::env::var("SQLITE_PATH") {
        Ok(path) => {
            let mut store = EpochStore::new(&path)?;
            store.init()?;
            Some(store)
        }
        Err(_) => None,
    };

    let started = Instant::now();
    let first_tick = sim.tick();
    let mut last = sim.snapshot();
    for _ in 0..epochs {
        let snap = sim.step()?;
        if let Some(store) = store.as_mut() {
            store.record_epoch(&snap)?;
        }
        if snap.live_count() == 0 {
            log(
                Level::Warn,
                Domain::System,
                "population_extinct",
                obj(&[("tick", json!(snap.tick))]),
            );
            last = Some(snap);
            break;
        }
        last = Some(snap);
        if tick_ms > 0 {
            sleep(Duration::from_millis(tick_ms)).await;
        }
    }

    if let Some(path) = &checkpoint_path {
        sim.checkpoint(path)?;
    }

    log_session_summary(
        started.elapsed().as_secs_f64(),
        sim.tick() - first_tick,
        last.as_ref().map_or(0, |s| s.live_count()),
        sim.controller().total_failures(),
        sim.controller().total_skips(),
    );
    Ok(())
}
