use std::time::Duration;

/// Kernel session table sampled on every tick.
pub const TCP_TABLE: &str = "/proc/net/tcp";

/// Default time between two samples of the session table.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(10);

/// How long, in seconds, a local port stays counted against a remote host.
///
/// A port last seen `CONNECTION_TTL` or more seconds ago is evicted before
/// offenders are extracted, so the scan window slides with the ticks.
pub const CONNECTION_TTL: i64 = 60;

/// Distinct local ports a remote host must touch on one local address,
/// within [`CONNECTION_TTL`], before it is treated as a scanner.
pub const PORT_SCAN_THRESHOLD: usize = 3;

/// iptables table and chain the DROP rules live in.
pub const FILTER_TABLE: &str = "filter";
pub const INPUT_CHAIN: &str = "INPUT";

/// Rules are inserted at the head of [`INPUT_CHAIN`] so they win over any
/// ACCEPT already present.
pub const RULE_POSITION: i32 = 1;

/// Linux default `net.ipv4.ip_local_port_range`.
pub const MIN_EPHEMERAL_PORT: u16 = 32768;
pub const MAX_EPHEMERAL_PORT: u16 = 60999;

/// Default port for the Prometheus `/metrics` endpoint.
pub const METRICS_PORT: u16 = 9090;
