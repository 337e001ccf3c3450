//! Prometheus metrics for connwatch.
//!
//! - `proc_net_tcp_new_connections` - connections seen for the first time

use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use std::sync::OnceLock;

/// Something that counts newly observed connections.
///
/// The connection watcher only sees this trait, so it can run without a
/// global registry.
pub trait ConnectionCounter {
    fn increment(&self);
}

impl ConnectionCounter for IntCounter {
    fn increment(&self) {
        self.inc();
    }
}

pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub static NEW_CONNECTIONS: OnceLock<IntCounter> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Registers the process metrics and returns the new-connection counter.
///
/// Safe to call more than once; later calls hand back the same counter.
pub fn init() -> Result<IntCounter, String> {
    if let Some(counter) = NEW_CONNECTIONS.get() {
        return Ok(counter.clone());
    }

    let counter = IntCounter::new(
        "proc_net_tcp_new_connections",
        "New connections observed at /proc/net/tcp",
    )
    .map_err(|e| format!("cannot create counter: {}", e))?;
    registry()
        .register(Box::new(counter.clone()))
        .map_err(|e| format!("cannot register counter: {}", e))?;

    Ok(NEW_CONNECTIONS.get_or_init(|| counter).clone())
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
