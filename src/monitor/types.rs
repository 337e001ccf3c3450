use crate::monitor::config::{MAX_EPHEMERAL_PORT, MIN_EPHEMERAL_PORT};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::Ipv4Addr;

/// One side of a TCP connection as listed in the session table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// A connection tuple from a single sample. Never mutated; the next sample
/// builds fresh ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub local:  Endpoint,
    pub remote: Endpoint,
}

impl Connection {
    /// Canonical `local_ip:local_port:remote_ip:remote_port` identity used to
    /// diff one snapshot against the next.
    pub fn key(&self) -> String {
        format!("{}:{}", self.local, self.remote)
    }

    /// The `(local address, remote address)` pair this connection counts
    /// against in the port tracker.
    pub fn pair(&self) -> PairKey {
        PairKey {
            local:  self.local.addr,
            remote: self.remote.addr,
        }
    }

    /// Guesses the direction of the connection for display.
    ///
    /// A local port in the ephemeral range means we dialled out, so the pair is
    /// returned as `(local, remote)`; otherwise `(remote, local)`. Fixed source
    /// ports on outbound connections get framed the wrong way round.
    pub fn framed(&self) -> (Endpoint, Endpoint) {
        if is_ephemeral_port(self.local.port) {
            (self.local, self.remote)
        } else {
            (self.remote, self.local)
        }
    }
}

pub fn is_ephemeral_port(port: u16) -> bool {
    (MIN_EPHEMERAL_PORT..=MAX_EPHEMERAL_PORT).contains(&port)
}

/// One full sample of the session table keyed by [`Connection::key`].
pub type Snapshot = HashMap<String, Connection>;

/// Tracker key. Only addresses take part; the ports are what gets counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    pub local:  Ipv4Addr,
    pub remote: Ipv4Addr,
}

/// Local ports a remote address has connected to on one local address.
///
/// Each port maps to the Unix timestamp (seconds) it was last observed at.
/// A pair with no ports left is inert.
#[derive(Debug, Default, Clone)]
pub struct TrackedPair {
    pub ports: BTreeMap<u16, i64>,
}

/// Per-pair port history, the only state scan detection works from.
///
/// Filled by the connection watcher, aged by
/// [`PortTracker::evict_expired`](crate::monitor::eviction) and drained by
/// [`PortTracker::extract_offenders`](crate::monitor::detection).
#[derive(Debug, Default)]
pub struct PortTracker {
    pub(crate) pairs: HashMap<PairKey, TrackedPair>,
}

/// A pair that met the scan threshold, handed from the tracker to the blocker
/// together with every port it had accumulated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offender {
    pub local:  Ipv4Addr,
    pub remote: Ipv4Addr,
    /// Ascending.
    pub ports:  Vec<u16>,
}

impl fmt::Display for Offender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ports: Vec<String> = self.ports.iter().map(u16::to_string).collect();
        write!(f, "{} -> {} on ports {}", self.remote, self.local, ports.join(","))
    }
}

/// Running totals reported in the shutdown summary.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub ticks:           u64,
    pub failed_ticks:    u64,
    pub new_connections: u64,
    pub offenders:       u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(local_port: u16, remote_port: u16) -> Connection {
        Connection {
            local:  Endpoint { addr: Ipv4Addr::new(10, 192, 1, 18), port: local_port },
            remote: Endpoint { addr: Ipv4Addr::new(10, 192, 1, 21), port: remote_port },
        }
    }

    #[test]
    fn key_orders_local_before_remote() {
        assert_eq!(conn(6443, 55468).key(), "10.192.1.18:6443:10.192.1.21:55468");
    }

    #[test]
    fn ephemeral_range_bounds() {
        assert!(is_ephemeral_port(32768));
        assert!(is_ephemeral_port(60000));
        assert!(is_ephemeral_port(60999));
        assert!(!is_ephemeral_port(32767));
        assert!(!is_ephemeral_port(61000));
        assert!(!is_ephemeral_port(80));
    }

    #[test]
    fn outbound_connection_framed_local_first() {
        let c = conn(40000, 443);
        assert_eq!(c.framed(), (c.local, c.remote));
    }

    #[test]
    fn inbound_connection_framed_remote_first() {
        let c = conn(6443, 55468);
        assert_eq!(c.framed(), (c.remote, c.local));
    }

    #[test]
    fn offender_display_names_remote_first() {
        let o = Offender {
            local:  Ipv4Addr::new(10, 0, 0, 1),
            remote: Ipv4Addr::new(10, 0, 0, 9),
            ports:  vec![22, 80, 443],
        };
        assert_eq!(o.to_string(), "10.0.0.9 -> 10.0.0.1 on ports 22,80,443");
    }
}
