//! Sample-to-sample diffing of the session table.
//!
//! The watcher keeps the last good snapshot. Each observation builds a new
//! one, reports connections that were not in the old one, feeds every
//! connection into the port tracker and then swaps the snapshots. A failed
//! read leaves the old snapshot in place so the next tick diffs against a
//! known baseline.

use crate::error::MonitorError;
use crate::logger::{Event, SharedLogger};
use crate::metrics::ConnectionCounter;
use crate::monitor::parsers::read_connections;
use crate::monitor::types::{PortTracker, Snapshot};
use std::io::Read;

pub struct ConnectionWatcher {
    connections: Snapshot,
    counter:     Box<dyn ConnectionCounter>,
    logger:      SharedLogger,
}

impl ConnectionWatcher {
    pub fn new(counter: Box<dyn ConnectionCounter>, logger: SharedLogger) -> Self {
        Self {
            connections: Snapshot::new(),
            counter,
            logger,
        }
    }

    /// The snapshot from the last successful observation.
    #[cfg(test)]
    pub fn connections(&self) -> &Snapshot {
        &self.connections
    }

    /// Reads one sample from `source` stamped with `timestamp` (Unix seconds).
    ///
    /// Returns how many connections were new. On error nothing changes: no
    /// new-connection events, no tracker updates, same baseline.
    pub fn observe<R: Read>(
        &mut self,
        source:    R,
        timestamp: i64,
        tracker:   &mut PortTracker,
    ) -> Result<usize, MonitorError> {
        let observed = match read_connections(source, &self.logger) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.logger.log(&Event::Warning {
                    message: &format!("Failed to check new connections: {}", e),
                });
                return Err(e);
            }
        };

        let mut new_count = 0;
        for (key, conn) in &observed {
            if !self.connections.contains_key(key) {
                let (src, dst) = conn.framed();
                self.logger.log(&Event::NewConnection {
                    src_ip:   src.addr,
                    src_port: src.port,
                    dst_ip:   dst.addr,
                    dst_port: dst.port,
                });
                self.counter.increment();
                new_count += 1;
            }

            tracker.add_port(conn.pair(), conn.local.port, timestamp);
        }

        self.connections = observed;
        Ok(new_count)
    }
}
