//! Structured JSON-lines logging for simulation runs.
//!
//! One record per line on stderr:
//! `{"ts","seq","lvl","component","event","run","data"}`.
//! `LOG_LEVEL` sets the floor (default `info`), `LOG_DOMAINS` restricts
//! components (comma-separated, or `all`). Records never influence results.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

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
}

impl Level {
    pub fn from_env() -> Self {
        Self::parse(std::env::var("LOG_LEVEL").as_deref().unwrap_or("info"))
    }

    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "trace" => Level::Trace,
            "debug" => Level::Debug,
            "warn" => Level::Warn,
            "error" => Level::Error,
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
        }
    }
}

// =============================================================================
// Log Domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Config,      // Preset selection, validation failures
    Pool,        // Reserve updates, ticks, position admission
    Liquidation, // Per-position liquidation and insolvency
    Run,         // Run start/finish, comparison sweeps
    Verify,      // Invariant checks
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Config => "config",
            Domain::Pool => "pool",
            Domain::Liquidation => "liquidation",
            Domain::Run => "run",
            Domain::Verify => "verify",
        }
    }

    pub fn is_enabled(&self) -> bool {
        domain_filter_allows(std::env::var("LOG_DOMAINS").ok().as_deref(), self.as_str())
    }
}

fn domain_filter_allows(filter: Option<&str>, domain: &str) -> bool {
    match filter {
        None | Some("all") => true,
        Some(domains) => domains.split(',').any(|d| d.trim() == domain),
    }
}

// =============================================================================
// Sequence counter
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds.
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Emit a structured log entry.
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < Level::from_env() || !domain.is_enabled() {
        return;
    }
    let line = render(level, domain.as_str(), event, fields);
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = writeln!(handle, "{}", line);
}

/// `run` (the config name) is hoisted out of `data` so records can be
/// grouped per run when several simulations log concurrently.
fn render(level: Level, component: &str, event: &str, mut data: Map<String, Value>) -> String {
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    if let Some(run) = data.remove("run") {
        entry.insert("run".to_string(), run);
    }
    entry.insert("data".to_string(), Value::Object(data));
    Value::Object(entry).to_string()
}

// =============================================================================
// Field helpers
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

/// Fixed-point amounts go out as exact decimal strings; JSON numbers would
/// lose precision above 2^53.
pub fn v_amount(n: u128) -> Value {
    Value::String(n.to_string())
}
