//! Structured logging for the cell simulation.
//!
//! Every record is one JSON object per line:
//! 1. Levels TRACE through ERROR, filtered by `LOG_LEVEL`
//! 2. Domain categories for filtering, selected by `LOG_DOMAINS`
//! 3. A per-process sequence number so interleaved worker output can be ordered
//!
//! Records always go to stdout. When `LOG_DIR` is set they are also written
//! under `<LOG_DIR>/<RUN_ID>/`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    const ORDERED: [Level; 5] = [Level::Trace, Level::Debug, Level::Info, Level::Warn, Level::Error];

    /// Minimum level from `LOG_LEVEL`; info when unset or unrecognised.
    pub fn from_env() -> Self {
        std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|v| Self::ORDERED.into_iter().find(|l| l.as_str() == v.trim()))
            .unwrap_or(Level::Info)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

// =============================================================================
// Log Domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Topology,   // Grid construction, duct provisioning
    Conduit,    // Buffer overflow skips, compaction
    Scheduler,  // Tick execution, cancellation
    Service,    // Per-cell service failures
    Epoch,      // Epoch advance, snapshot publication
    Checkpoint, // Checkpoint write / restore
    Storage,    // Epoch history persistence
    System,     // Startup, shutdown
    Profile,    // Performance profiling
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Topology => "topology",
            Domain::Conduit => "conduit",
            Domain::Scheduler => "scheduler",
            Domain::Service => "service",
            Domain::Epoch => "epoch",
            Domain::Checkpoint => "checkpoint",
            Domain::Storage => "storage",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static PROFILE_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let Ok(base) = std::env::var("LOG_DIR") else {
            return RunContext {
                run_id,
                events: None,
                trace: None,
            };
        };

        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }
        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        let open = |name: &str| match File::create(run_dir.join(name)) {
            Ok(file) => Some(Mutex::new(BufWriter::new(file))),
            Err(err) => {
                eprintln!("[log] failed to create {}: {}", name, err);
                None
            }
        };

        RunContext {
            events: open("events.jsonl"),
            trace: open("trace.jsonl"),
            run_id,
        }
    })
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(writer) = writer {
        if let Ok(mut w) = writer.lock() {
            let _ = writeln!(w, "{}", line);
            let _ = w.flush();
        }
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }

    emit_record(level, domain.as_str(), event, fields);
}

/// Log under a free-form component name at info level
pub fn json_log(module: &str, fields: Map<String, Value>) {
    if Level::Info < Level::from_env() {
        return;
    }
    emit_record(Level::Info, module, module, fields);
}

fn emit_record(level: Level, component: &str, event: &str, mut fields: Map<String, Value>) {
    let ctx = ensure_run_context();

    let msg = fields.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for key in ["tick", "cell"] {
        if let Some(value) = fields.remove(key) {
            entry.insert(key.to_string(), value);
        }
    }
    entry.insert("data".to_string(), Value::Object(fields));

    let line = Value::Object(entry).to_string();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    println!("{}", line);
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_service_failure(tick: u64, cell: usize, service: &str, reason: &str, streak: u32) {
    log(
        Level::Warn,
        Domain::Service,
        "service_failed",
        obj(&[
            ("tick", json!(tick)),
            ("cell", json!(cell)),
            ("service", v_str(service)),
            ("reason", v_str(reason)),
            ("streak", json!(streak)),
        ]),
    );
}

pub fn log_tick_cancelled(tick: u64, pending_cells: usize) {
    log(
        Level::Warn,
        Domain::Scheduler,
        "tick_cancelled",
        obj(&[("tick", json!(tick)), ("pending_cells", json!(pending_cells))]),
    );
}

pub fn log_overflow(tick: u64, skipped: u64) {
    log(
        Level::Debug,
        Domain::Conduit,
        "overflow_skip",
        obj(&[("tick", json!(tick)), ("skipped", json!(skipped))]),
    );
}

pub fn log_epoch(tick: u64, live_cells: usize, total_stock: f64, failures: usize, digest: &str) {
    log(
        Level::Info,
        Domain::Epoch,
        "epoch_advanced",
        obj(&[
            ("tick", json!(tick)),
            ("live_cells", json!(live_cells)),
            ("total_stock", v_num(total_stock)),
            ("failures", json!(failures)),
            ("digest", v_str(digest)),
        ]),
    );
}

pub fn log_checkpoint(action: &str, path: &str, tick: u64, digest: &str) {
    log(
        Level::Info,
        Domain::Checkpoint,
        action,
        obj(&[
            ("tick", json!(tick)),
            ("path", v_str(path)),
            ("digest", v_str(digest)),
        ]),
    );
}

/// Session summary on shutdown
pub fn log_session_summary(
    duration_secs: f64,
    epochs: u64,
    live_cells: usize,
    total_failures: u64,
    total_skips: u64,
) {
    log(
        Level::Info,
        Domain::System,
        "session_summary",
        obj(&[
            ("duration_secs", v_num(duration_secs)),
            ("epochs", json!(epochs)),
            ("live_cells", json!(live_cells)),
            ("total_failures", json!(total_failures)),
            ("total_skips", json!(total_skips)),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Emits elapsed wall time at trace level when dropped.
///
/// `PROFILE_SAMPLE` in `[0, 1]` keeps roughly that share of scopes.
pub struct ProfileScope {
    label: &'static str,
    started: Instant,
    context: Option<Map<String, Value>>,
}

impl ProfileScope {
    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        let sampled = match std::env::var("PROFILE_SAMPLE").ok().and_then(|v| v.parse::<f64>().ok()) {
            None => true,
            Some(rate) => {
                let n = PROFILE_SEQ.fetch_add(1, Ordering::Relaxed);
                ((n % 1_000) as f64) < rate * 1_000.0
            }
        };
        Self {
            label,
            started: Instant::now(),
            context: sampled.then(|| obj(fields)),
        }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let Some(mut fields) = self.context.take() else {
            return;
        };
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(self.started.elapsed().as_secs_f64() * 1e3));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

// =============================================================================
// Tests
// =============================================================================
