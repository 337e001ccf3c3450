//! Structured logging for connwatch.
//!
//! Provides a [`Logger`] that writes events to stdout and optionally to a log
//! file. Output can be formatted as human-readable plain text or as
//! newline-delimited JSON (NDJSON) for log shippers and SIEM platforms.

use chrono::Local;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

// ── Event types ──────────────────────────────────────────────────────────────

/// All distinct event kinds that connwatch can emit.
///
/// The `#[serde(tag = "event")]` attribute puts an `"event"` key in every JSON
/// line so consumers can filter by type without inspecting structure.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event<'a> {
    /// Informational startup / status message.
    Info { message: &'a str },

    /// Something degraded but the process carries on.
    Warning { message: &'a str },

    /// A connection appeared that was not in the previous sample.
    ///
    /// `src` → `dst` is the guessed direction, see
    /// [`crate::monitor::types::Connection::framed`].
    NewConnection {
        src_ip:   Ipv4Addr,
        src_port: u16,
        dst_ip:   Ipv4Addr,
        dst_port: u16,
    },

    /// A session-table line was dropped from the snapshot.
    SkippedRecord { line: usize, reason: &'a str },

    /// A remote host touched enough local ports to count as a scan.
    PortScan {
        remote: Ipv4Addr,
        local:  Ipv4Addr,
        ports:  &'a [u16],
    },

    /// A DROP rule is now in place for this host.
    HostBlocked { remote: Ipv4Addr, enforced: bool },

    /// A DROP rule for this host was already present before we looked.
    RuleExists { remote: Ipv4Addr },

    /// Installing the DROP rule failed; the host will be retried.
    BlockFailed { remote: Ipv4Addr, error: &'a str },

    /// Removing our DROP rule failed during cleanup.
    UnblockFailed { remote: Ipv4Addr, error: &'a str },

    /// Session summary emitted on graceful shutdown.
    SessionSummary {
        duration_secs:   u64,
        ticks:           u64,
        failed_ticks:    u64,
        new_connections: u64,
        offenders:       u64,
        hosts_blocked:   usize,
    },
}

// ── Logger ───────────────────────────────────────────────────────────────────

/// Shared, thread-safe structured logger.
///
/// Constructed once in `main` and handed out as an `Arc<Logger>`. The internal
/// `Mutex` serialises file writes so lines are never interleaved.
pub struct Logger {
    json: bool,
    file: Option<Mutex<BufWriter<std::fs::File>>>,
}

pub type SharedLogger = Arc<Logger>;

impl Logger {
    /// Creates a new logger.
    ///
    /// # Errors
    /// Returns an `io::Error` if the log file cannot be opened or created.
    pub fn new(json: bool, log_path: Option<&str>) -> io::Result<Self> {
        let file = match log_path {
            Some(path) => {
                let f = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                Some(Mutex::new(BufWriter::new(f)))
            }
            None => None,
        };

        Ok(Self { json, file })
    }

    /// Logs a single [`Event`] to stdout and, if configured, the log file.
    pub fn log(&self, event: &Event) {
        let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string();

        let line = if self.json {
            let mut val = serde_json::to_value(event).unwrap_or_default();
            if let Some(obj) = val.as_object_mut() {
                obj.insert(
                    "timestamp".to_string(),
                    serde_json::Value::String(timestamp.clone()),
                );
            }
            serde_json::to_string(&val).unwrap_or_default()
        } else {
            format!("[{}] {}", timestamp, plain_text(event))
        };

        println!("{}", line);

        if let Some(mutex) = &self.file {
            if let Ok(mut writer) = mutex.lock() {
                let _ = writeln!(writer, "{}", line);
                let _ = writer.flush();
            }
        }
    }
}

/// Formats an [`Event`] as a human-readable string (no timestamp).
fn plain_text(event: &Event) -> String {
    match event {
        Event::Info { message } =>
            format!("[INFO] {}", message),

        Event::Warning { message } =>
            format!("[WARN] {}", message),

        Event::NewConnection { src_ip, src_port, dst_ip, dst_port } =>
            format!("[NEW CONNECTION] {}:{} -> {}:{}", src_ip, src_port, dst_ip, dst_port),

        Event::SkippedRecord { line, reason } =>
            format!("[SKIPPED] line {}: {}", line, reason),

        Event::PortScan { remote, local, ports } =>
            format!("[PORT SCAN] {} -> {} on ports {}", remote, local, join_ports(ports)),

        Event::HostBlocked { remote, enforced: true } =>
            format!("[BLOCKED] {} dropped in INPUT", remote),

        Event::HostBlocked { remote, enforced: false } =>
            format!("[FLAGGED] {} (detect-only, no rule installed)", remote),

        Event::RuleExists { remote } =>
            format!("[BLOCKED] {} already has a DROP rule", remote),

        Event::BlockFailed { remote, error } =>
            format!("[BLOCK FAILED] {}: {}", remote, error),

        Event::UnblockFailed { remote, error } =>
            format!("[UNBLOCK FAILED] {}: {}", remote, error),

        Event::SessionSummary {
            duration_secs, ticks, failed_ticks, new_connections, offenders, hosts_blocked
        } => format!(
            "[SUMMARY] duration={}s ticks={} failed_ticks={} new_connections={} offenders={} blocked={}",
            duration_secs, ticks, failed_ticks, new_connections, offenders, hosts_blocked
        ),
    }
}

/// `[80, 81, 82]` → `"80,81,82"`.
fn join_ports(ports: &[u16]) -> String {
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
