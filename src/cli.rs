use crate::monitor::config::{METRICS_PORT, SAMPLE_INTERVAL, TCP_TABLE};
use clap::Parser;

/// connwatch: port-scan detection and mitigation from the kernel TCP table.
///
/// Samples the session table on a fixed interval, reports new connections,
/// and inserts an iptables DROP rule for any remote host that touches three
/// or more local ports within sixty seconds. Rules are removed on exit.
#[derive(Parser, Debug, Clone)]
#[command(
    name    = "connwatch",
    version,
    about   = "Port-scan detector with automatic iptables mitigation",
    long_about = None,
)]
pub struct Cli {
    // ── Input ────────────────────────────────────────────────────────────────

    /// Session table to sample. Must be in `/proc/net/tcp` format.
    #[arg(short = 't', long = "tcp-table", value_name = "PATH", default_value = TCP_TABLE)]
    pub tcp_table: String,

    /// Seconds between two samples of the session table.
    #[arg(long = "interval", value_name = "SECS", default_value_t = SAMPLE_INTERVAL.as_secs(),
          value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    // ── Mitigation ───────────────────────────────────────────────────────────

    /// Detect and log scans without touching iptables.
    ///
    /// Also the fallback when iptables cannot be opened.
    #[arg(short = 'n', long = "detect-only")]
    pub detect_only: bool,

    // ── Metrics ──────────────────────────────────────────────────────────────

    /// Port for the Prometheus `/metrics` endpoint. 0 disables it.
    #[arg(long = "metrics-port", value_name = "PORT", default_value_t = METRICS_PORT)]
    pub metrics_port: u16,

    // ── Logging ──────────────────────────────────────────────────────────────

    /// Write log output to this file in addition to stdout.
    ///
    /// The file is created if it does not exist and appended to if it does.
    #[arg(short = 'o', long = "log-file", value_name = "PATH")]
    pub log_file: Option<String>,

    /// Emit log entries as newline-delimited JSON (NDJSON).
    #[arg(short = 'j', long = "json")]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["connwatch"]);
        assert_eq!(cli.tcp_table, "/proc/net/tcp");
        assert_eq!(cli.interval, 10);
        assert_eq!(cli.metrics_port, 9090);
        assert!(!cli.detect_only);
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(Cli::try_parse_from(["connwatch", "--interval", "0"]).is_err());
    }
}
