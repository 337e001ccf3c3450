mod cli;
mod error;
mod http;
mod logger;
mod metrics;
mod monitor;

use clap::Parser;
use cli::Cli;
use logger::{Event, Logger, SharedLogger};
use monitor::config::{CONNECTION_TTL, PORT_SCAN_THRESHOLD};
use monitor::firewall::{self, FirewallTable};
use monitor::Monitor;
use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Set by the Ctrl+C / SIGTERM handler; the tick loop exits on its next check.
type ShutdownFlag = Arc<AtomicBool>;

fn main() {
    let cli = Cli::parse();

    let shutdown: ShutdownFlag = Arc::new(AtomicBool::new(false));
    let session_start = Instant::now();

    let logger: SharedLogger = Arc::new(
        Logger::new(cli.json, cli.log_file.as_deref())
            .expect("Failed to open log file"),
    );

    let counter = match metrics::init() {
        Ok(counter) => counter,
        Err(e) => {
            logger.log(&Event::Warning { message: &format!("Metrics unavailable: {}", e) });
            return;
        }
    };
    if cli.metrics_port != 0 {
        if let Err(e) = http::spawn_metrics_server(cli.metrics_port, Arc::clone(&logger)) {
            logger.log(&Event::Warning { message: &e });
        }
    }

    let mut monitor = Monitor::new(
        Box::new(counter),
        open_firewall(&cli, &logger),
        Arc::clone(&logger),
    );
    if !monitor.blocker().is_enforcing() {
        logger.log(&Event::Info { message: "Running in detect-only mode, no rules will be added" });
    }

    register_shutdown_handler(Arc::clone(&shutdown));

    logger.log(&Event::Info {
        message: &format!(
            "Watching {} every {}s (threshold: {} ports in {}s)",
            cli.tcp_table, cli.interval, PORT_SCAN_THRESHOLD, CONNECTION_TTL
        ),
    });

    // Seed the baseline right away so new connections show up without
    // waiting a full interval. The seed is not a tick; a failure is already
    // logged by the watcher and the first tick simply starts from empty.
    if let Some(table) = open_table(&cli.tcp_table, &logger) {
        let _ = monitor.observe(table, unix_now());
    }

    let interval = Duration::from_secs(cli.interval);
    while sleep_unless_shutdown(interval, &shutdown) {
        let Some(table) = open_table(&cli.tcp_table, &logger) else {
            continue;
        };
        monitor.tick(table, unix_now());
    }

    let hosts_blocked = monitor.blocker().blocked_hosts().count();
    monitor.clean_up();
    print_summary(&logger, &monitor, hosts_blocked, session_start);
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// iptables handle, or `None` for detect-only mode.
fn open_firewall(cli: &Cli, logger: &SharedLogger) -> Option<Box<dyn FirewallTable>> {
    if cli.detect_only {
        return None;
    }
    match firewall::open_ipv4() {
        Ok(table) => Some(Box::new(table)),
        Err(e) => {
            logger.log(&Event::Warning {
                message: &format!("{}. Host blocking is disabled.", e),
            });
            None
        }
    }
}

/// Opening the table is the only way to tell "unreadable" from "empty", so
/// an open failure skips the tick here rather than reaching the monitor.
fn open_table(path: &str, logger: &SharedLogger) -> Option<File> {
    match File::open(path) {
        Ok(f) => Some(f),
        Err(e) => {
            logger.log(&Event::Warning {
                message: &format!("Failed to open {}: {}", path, e),
            });
            None
        }
    }
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Sleeps `total` in 1-second steps. Returns `false` as soon as shutdown is
/// requested.
fn sleep_unless_shutdown(total: Duration, shutdown: &ShutdownFlag) -> bool {
    let step = Duration::from_secs(1);
    let mut slept = Duration::ZERO;
    while slept < total {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        thread::sleep(step);
        slept += step;
    }
    !shutdown.load(Ordering::Relaxed)
}

/// Registers a signal handler for graceful shutdown on Ctrl+C / SIGTERM.
fn register_shutdown_handler(shutdown: ShutdownFlag) {
    ctrlc::set_handler(move || {
        println!("\n[!] Shutdown requested, removing firewall rules...");
        shutdown.store(true, Ordering::SeqCst);
    })
    .expect("Failed to register shutdown handler");
}

fn print_summary(logger: &SharedLogger, monitor: &Monitor, hosts_blocked: usize, session_start: Instant) {
    let stats = monitor.stats();
    logger.log(&Event::SessionSummary {
        duration_secs:   session_start.elapsed().as_secs(),
        ticks:           stats.ticks,
        failed_ticks:    stats.failed_ticks,
        new_connections: stats.new_connections,
        offenders:       stats.offenders,
        hosts_blocked,
    });
}
