//! Age-based eviction for the port tracker.
//!
//! Runs once per tick, before offenders are extracted, so that a remote host
//! is only judged on ports it touched within the last
//! [`CONNECTION_TTL`](crate::monitor::config::CONNECTION_TTL) seconds.

use crate::monitor::types::{PairKey, PortTracker};

impl PortTracker {
    /// Removes every port whose last sighting is `ttl` or more seconds before
    /// `now` and returns the removed port numbers.
    ///
    /// Expired entries are collected first and deleted afterwards, so no map
    /// is mutated while it is being walked. Pairs left without ports are
    /// dropped.
    pub fn evict_expired(&mut self, now: i64, ttl: i64) -> Vec<u16> {
        let expired: Vec<(PairKey, u16)> = self
            .pairs
            .iter()
            .flat_map(|(key, pair)| {
                pair.ports
                    .iter()
                    .filter(move |&(_, &seen)| now.saturating_sub(seen) >= ttl)
                    .map(move |(&port, _)| (*key, port))
            })
            .collect();

        let mut removed = Vec::with_capacity(expired.len());
        for (key, port) in expired {
            if let Some(pair) = self.pairs.get_mut(&key) {
                if pair.ports.remove(&port).is_some() {
                    removed.push(port);
                }
            }
        }

        self.pairs.retain(|_, pair| !pair.is_inert());
        removed
    }
}
