//! Structured logging for the training console.
//!
//! Every record is a single JSON line with:
//! 1. Run id and a monotonically increasing sequence number
//! 2. Level (TRACE → FATAL) and a domain for filtering
//! 3. Free-form `data` fields, with secrets redacted
//!
//! Records are appended to `LOG_DIR/RUN_ID/events.jsonl` (trace and debug
//! records go to `trace.jsonl`) and mirrored to stderr so stdout stays free
//! for command output.

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
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        Self::parse(std::env::var("LOG_LEVEL").as_deref().unwrap_or("info"))
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "trace" => Level::Trace,
            "debug" => Level::Debug,
            "warn" => Level::Warn,
            "error" => Level::Error,
            "fatal" => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Catalog,  // Workflow and algorithm lookups
    Metrics,  // Derived metric computation
    Playback, // Sequencer transitions, timer lifecycle
    Present,  // View-model assembly
    Client,   // Training endpoint calls
    System,   // Startup, shutdown, config
    Profile,  // Timing scopes
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Catalog => "catalog",
            Domain::Metrics => "metrics",
            Domain::Playback => "playback",
            Domain::Present => "present",
            Domain::Client => "client",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list or "all"
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
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
    mirror_stderr: bool,
}

fn open_sink(path: PathBuf) -> Option<Mutex<BufWriter<File>>> {
    match File::create(&path) {
        Ok(file) => Some(Mutex::new(BufWriter::new(file))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", path.display(), err);
            None
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let mirror_stderr = !matches!(std::env::var("LOG_STDOUT").as_deref(), Ok("0") | Ok("false"));

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
                "crate": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        RunContext {
            events: open_sink(run_dir.join("events.jsonl")),
            trace: open_sink(run_dir.join("trace.jsonl")),
            run_id,
            mirror_stderr,
        }
    })
}

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in ["authorization", "Authorization", "token", "password", "cookie"] {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["algorithm", "generation", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
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
    if level < Level::from_env() || !domain.is_enabled() {
        return;
    }
    emit_record(level, domain.as_str(), event, fields);
}

/// One JSON line. `hoisted` fields sit next to the envelope keys so runs can
/// be grepped by algorithm or sequencer generation.
#[derive(Serialize)]
struct Record<'a> {
    ts: String,
    run_id: &'a str,
    seq: u64,
    lvl: String,
    component: &'a str,
    event: &'a str,
    msg: Value,
    #[serde(flatten)]
    hoisted: Map<String, Value>,
    data: Map<String, Value>,
}

fn build_record(
    run_id: &str,
    level: Level,
    component: &str,
    event: &str,
    fields: Map<String, Value>,
) -> Value {
    let (mut hoisted, data) = split_fields(sanitize_fields(fields));
    let record = Record {
        ts: ts_now(),
        run_id,
        seq: next_seq(),
        lvl: level.as_str().to_ascii_uppercase(),
        component,
        event,
        msg: hoisted.remove("msg").unwrap_or_else(|| v_str("")),
        hoisted,
        data,
    };
    serde_json::to_value(&record).unwrap_or(Value::Null)
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let line = build_record(&ctx.run_id, level, component, event, fields).to_string();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    if ctx.mirror_stderr {
        eprintln!("{}", line);
    }
}

// =============================================================================
// Domain helpers
// =============================================================================

/// Log a sequencer transition
pub fn log_transition(event: &str, generation: u64, step: usize, total: usize, playing: bool) {
    log(
        Level::Debug,
        Domain::Playback,
        event,
        obj(&[
            ("generation", json!(generation)),
            ("step", json!(step)),
            ("total_steps", json!(total)),
            ("playing", Value::Bool(playing)),
        ]),
    );
}

/// Log a metric that had to be derived client-side
pub fn log_fallback(metric: &str, value: f64, samples: usize, skipped: usize) {
    log(
        Level::Info,
        Domain::Metrics,
        "fallback",
        obj(&[
            ("metric", v_str(metric)),
            ("value", v_num(value)),
            ("samples", json!(samples)),
            ("skipped", json!(skipped)),
        ]),
    );
}

/// Log an outbound training call
pub fn log_request(algorithm: &str, dataset_id: &str, attempt: u32, status: Option<u16>) {
    log(
        Level::Info,
        Domain::Client,
        "train_request",
        obj(&[
            ("algorithm", v_str(algorithm)),
            ("dataset_id", v_str(dataset_id)),
            ("attempt", json!(attempt)),
            ("status", status.map(|s| json!(s)).unwrap_or(Value::Null)),
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

/// Non-finite numbers become null; JSON cannot carry them.
pub fn v_num(n: f64) -> Value {
    if n.is_finite() {
        json!(n)
    } else {
        Value::Null
    }
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Emits elapsed time as a trace record when dropped.
pub struct ProfileScope {
    label: &'static str,
    context: Map<String, Value>,
    started: Instant,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self::with_context(label, &[])
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        Self {
            label,
            context: obj(fields),
            started: Instant::now(),
        }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = std::mem::take(&mut self.context);
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

// =============================================================================
// Tests
// =============================================================================
