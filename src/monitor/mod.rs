//! Detection and mitigation engine.
//!
//! One [`Monitor::tick`] runs the whole pipeline against a single sample of
//! the session table:
//!
//! 1. [`ConnectionWatcher::observe`] diffs the sample against the last one and
//!    feeds every connection's local port into the [`PortTracker`].
//! 2. [`PortTracker::evict_expired`] drops ports older than the TTL.
//! 3. [`PortTracker::extract_offenders`] pulls pairs over the threshold.
//! 4. [`HostBlocker::block`] installs DROP rules for them.
//!
//! Everything here is single-threaded and owned by the caller's loop. Ticks
//! must not overlap: extraction resets a pair's history, so two interleaved
//! ticks could each see half a scan.

pub mod blocker;
pub mod config;
pub mod detection;
pub mod eviction;
pub mod firewall;
pub mod parsers;
pub mod tracker;
pub mod types;
pub mod watcher;

use crate::error::MonitorError;
use crate::logger::SharedLogger;
use crate::metrics::ConnectionCounter;
use crate::monitor::blocker::HostBlocker;
use crate::monitor::config::{CONNECTION_TTL, PORT_SCAN_THRESHOLD};
use crate::monitor::firewall::FirewallTable;
use crate::monitor::types::{Offender, PortTracker, SessionStats};
use crate::monitor::watcher::ConnectionWatcher;
use std::io::Read;

pub struct Monitor {
    watcher: ConnectionWatcher,
    tracker: PortTracker,
    blocker: HostBlocker,
    stats:   SessionStats,
}

impl Monitor {
    /// Builds the engine. `firewall` of `None` means detect-only.
    pub fn new(
        counter:  Box<dyn ConnectionCounter>,
        firewall: Option<Box<dyn FirewallTable>>,
        logger:   SharedLogger,
    ) -> Self {
        Self {
            watcher: ConnectionWatcher::new(counter, logger.clone()),
            tracker: PortTracker::new(),
            blocker: HostBlocker::new(firewall, logger),
            stats:   SessionStats::default(),
        }
    }

    /// Diffs one session-table sample taken at `timestamp` (Unix seconds).
    pub fn observe<R: Read>(&mut self, source: R, timestamp: i64) -> Result<usize, MonitorError> {
        let new = self.watcher.observe(source, timestamp, &mut self.tracker)?;
        self.stats.new_connections += new as u64;
        Ok(new)
    }

    /// Forgets ports last seen `ttl` or more seconds before `now`.
    pub fn remove_old_connections(&mut self, now: i64, ttl: i64) -> Vec<u16> {
        self.tracker.evict_expired(now, ttl)
    }

    /// Pairs that touched [`PORT_SCAN_THRESHOLD`] or more local ports. Their
    /// history is consumed.
    pub fn hosts_to_block(&mut self) -> Vec<Offender> {
        let offenders = self.tracker.extract_offenders(PORT_SCAN_THRESHOLD);
        self.stats.offenders += offenders.len() as u64;
        offenders
    }

    pub fn block_hosts(&mut self, offenders: Vec<Offender>) -> Vec<MonitorError> {
        self.blocker.block(offenders)
    }

    /// Removes every DROP rule added during this run.
    pub fn clean_up(&mut self) -> Vec<MonitorError> {
        self.blocker.clean_up()
    }

    /// Observe → evict → extract → block for one sample.
    ///
    /// A sample that cannot be read skips the whole tick, but what the tracker
    /// already holds is still aged and checked so a scan in progress is not
    /// held up by one bad read. Every error is logged where it happens and
    /// returned here.
    pub fn tick<R: Read>(&mut self, source: R, now: i64) -> Vec<MonitorError> {
        self.stats.ticks += 1;

        let mut errors = Vec::new();
        if let Err(e) = self.observe(source, now) {
            self.stats.failed_ticks += 1;
            errors.push(e);
        }

        self.remove_old_connections(now, CONNECTION_TTL);
        let offenders = self.hosts_to_block();
        errors.extend(self.block_hosts(offenders));
        errors
    }

    pub fn blocker(&self) -> &HostBlocker {
        &self.blocker
    }

    #[cfg(test)]
    pub fn tracker(&self) -> &PortTracker {
        &self.tracker
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::Logger;
    use crate::monitor::firewall::drop_rule;
    use crate::monitor::firewall::tests::FakeFirewall;
    use crate::monitor::parsers::tests::HEADER;
    use crate::monitor::types::PairKey;
    use prometheus::IntCounter;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    const SCANNER: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
    const SERVER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

    /// `0500000A` is 10.0.0.5, `0101A8C0` is 192.168.1.1.
    fn table<S: AsRef<str>>(rows: &[S]) -> String {
        let mut out = format!("{HEADER}\n");
        for (i, row) in rows.iter().enumerate() {
            out.push_str(&format!(
                "  {i:2}: {} 01 00000000:00000000 00:00000000 00000000  1000        0 {} 1 0000000000000000 20 4 30 10 -1\n",
                row.as_ref(),
                40000 + i
            ));
        }
        out
    }

    /// Connection from the scanner (port 50000, `C350`) to the server on
    /// `local_port_hex`.
    fn probe(local_port_hex: &str) -> String {
        format!("0500000A:{local_port_hex} 0101A8C0:C350")
    }

    fn monitor(fw: &FakeFirewall) -> (Monitor, IntCounter) {
        let counter = IntCounter::new("test_new_connections", "test").unwrap();
        let logger = Arc::new(Logger::new(false, None).unwrap());
        let m = Monitor::new(Box::new(counter.clone()), Some(Box::new(fw.clone())), logger);
        (m, counter)
    }

    #[test]
    fn three_port_scan_is_blocked_once() {
        let fw = FakeFirewall::default();
        let (mut m, counter) = monitor(&fw);
        let (p80, p81, p82) = (probe("0050"), probe("0051"), probe("0052"));

        // tick 1: port 80
        m.observe(table(&[&p80]).as_bytes(), 100).unwrap();
        m.remove_old_connections(100, CONNECTION_TTL);
        assert!(m.hosts_to_block().is_empty());

        // tick 2: port 81
        m.observe(table(&[&p81]).as_bytes(), 110).unwrap();
        m.remove_old_connections(110, CONNECTION_TTL);
        assert!(m.hosts_to_block().is_empty());

        // tick 3: port 82
        m.observe(table(&[&p82]).as_bytes(), 120).unwrap();
        m.remove_old_connections(120, CONNECTION_TTL);
        let offenders = m.hosts_to_block();
        assert_eq!(
            offenders,
            vec![Offender { local: SERVER, remote: SCANNER, ports: vec![80, 81, 82] }]
        );
        assert_eq!(counter.get(), 3);

        assert!(m.block_hosts(offenders).is_empty());
        assert!(m.blocker().is_blocked(SCANNER));
        assert_eq!(fw.inserts(), vec![drop_rule(SCANNER)]);

        // tick 4: the scanner is dropped, only unrelated traffic remains
        let other = "0500000A:0016 0200A8C0:C351";
        m.observe(table(&[other]).as_bytes(), 130).unwrap();
        m.remove_old_connections(130, CONNECTION_TTL);
        assert!(m.hosts_to_block().is_empty());
        assert!(m.blocker().is_blocked(SCANNER));
        assert!(m.tracker().ports(&PairKey { local: SERVER, remote: SCANNER }).is_empty());

        // tick 5: stale scanner sockets linger in the table; no second rule
        let (p83, p84) = (probe("0053"), probe("0054"));
        assert!(m.tick(table(&[&p80, &p81, &p82, &p83, &p84]).as_bytes(), 140).is_empty());
        assert_eq!(fw.inserts().len(), 1);

        assert!(m.clean_up().is_empty());
        assert_eq!(fw.deletes(), vec![drop_rule(SCANNER)]);
        assert!(fw.rules.borrow().is_empty());
    }

    #[test]
    fn slow_scan_outside_ttl_is_not_flagged() {
        let fw = FakeFirewall::default();
        let (mut m, _) = monitor(&fw);

        for (t, port) in [(0, "0050"), (40, "0051"), (80, "0052"), (120, "0053")] {
            assert!(m.tick(table(&[&probe(port)]).as_bytes(), t).is_empty());
        }

        assert!(fw.calls.borrow().is_empty());
        assert_eq!(m.stats().offenders, 0);
    }

    #[test]
    fn listening_sockets_never_trigger_a_block() {
        let fw = FakeFirewall::default();
        let (mut m, _) = monitor(&fw);
        let listeners = table(&[
            "00000000:0016 00000000:0000",
            "00000000:0050 00000000:0000",
            "0100007F:0277 00000000:0000",
            "00000000:01BB 00000000:0000",
        ]);

        assert!(m.tick(listeners.as_bytes(), 10).is_empty());
        assert!(fw.calls.borrow().is_empty());
        assert_eq!(m.stats().offenders, 1);
    }

    #[test]
    fn bad_sample_counts_as_failed_tick() {
        let fw = FakeFirewall::default();
        let (mut m, _) = monitor(&fw);

        let errors = m.tick(table::<&str>(&[]).as_bytes(), 10);
        assert!(matches!(errors[..], [MonitorError::EmptyInput]));
        assert_eq!(m.stats().ticks, 1);
        assert_eq!(m.stats().failed_ticks, 1);
    }

    #[test]
    fn failed_block_is_reported_and_retried_next_scan() {
        let fw = FakeFirewall::default();
        fw.fail_insert.borrow_mut().insert(drop_rule(SCANNER));
        let (mut m, _) = monitor(&fw);
        let burst = table(&[&probe("0016"), &probe("0017"), &probe("0018")]);

        let errors = m.tick(burst.as_bytes(), 10);
        assert_eq!(errors.len(), 1);
        assert!(!m.blocker().is_blocked(SCANNER));

        fw.fail_insert.borrow_mut().clear();
        assert!(m.tick(burst.as_bytes(), 20).is_empty());
        assert!(m.blocker().is_blocked(SCANNER));
    }

    #[test]
    fn failed_block_is_logged_once() {
        let path = std::env::temp_dir().join(format!("connwatch-block-log-{}.ndjson", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let logger = Arc::new(Logger::new(true, path.to_str()).unwrap());
        let counter = IntCounter::new("test_new_connections", "test").unwrap();
        let fw = FakeFirewall::default();
        fw.fail_insert.borrow_mut().insert(drop_rule(SCANNER));
        let mut m = Monitor::new(Box::new(counter), Some(Box::new(fw.clone())), logger);

        let burst = table(&[&probe("0016"), &probe("0017"), &probe("0018")]);
        assert_eq!(m.tick(burst.as_bytes(), 10).len(), 1);

        let log = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(log.matches(r#""event":"block_failed""#).count(), 1);
        assert_eq!(log.matches(r#""event":"warning""#).count(), 0);
    }

    #[test]
    fn failed_seed_is_not_a_tick() {
        let fw = FakeFirewall::default();
        let (mut m, _) = monitor(&fw);

        assert!(matches!(
            m.observe(table::<&str>(&[]).as_bytes(), 5),
            Err(MonitorError::EmptyInput)
        ));
        assert_eq!(m.stats().ticks, 0);
        assert_eq!(m.stats().failed_ticks, 0);

        assert!(m.tick(table(&[&probe("0050")]).as_bytes(), 15).is_empty());
        assert_eq!(m.stats().new_connections, 1);
    }
}
