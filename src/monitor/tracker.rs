use crate::monitor::types::{PairKey, PortTracker, TrackedPair};

impl TrackedPair {
    /// Records `port` as seen at `timestamp`, replacing any older sighting.
    pub fn touch(&mut self, port: u16, timestamp: i64) {
        self.ports.insert(port, timestamp);
    }

    /// A pair with no ports left cannot contribute to detection.
    pub fn is_inert(&self) -> bool {
        self.ports.is_empty()
    }
}

impl PortTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or refreshes `port` for `pair`, creating the pair on first sight.
    pub fn add_port(&mut self, pair: PairKey, port: u16, timestamp: i64) {
        self.pairs.entry(pair).or_default().touch(port, timestamp);
    }

    /// Ports currently counted for `pair`, ascending. Empty for unknown pairs.
    #[cfg(test)]
    pub fn ports(&self, pair: &PairKey) -> Vec<u16> {
        self.pairs
            .get(pair)
            .map(|p| p.ports.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Number of pairs with at least one tracked port.
    #[cfg(test)]
    pub fn active_pairs(&self) -> usize {
        self.pairs.values().filter(|p| !p.is_inert()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn pair() -> PairKey {
        PairKey {
            local:  Ipv4Addr::new(10, 0, 0, 1),
            remote: Ipv4Addr::new(192, 168, 1, 1),
        }
    }

    #[test]
    fn add_port_creates_pair_and_refreshes_timestamp() {
        let mut tracker = PortTracker::new();
        tracker.add_port(pair(), 80, 10);
        tracker.add_port(pair(), 80, 25);
        tracker.add_port(pair(), 443, 12);

        assert_eq!(tracker.ports(&pair()), vec![80, 443]);
        assert_eq!(tracker.pairs[&pair()].ports[&80], 25);
        assert_eq!(tracker.active_pairs(), 1);
    }

    #[test]
    fn pairs_are_keyed_by_both_addresses() {
        let mut tracker = PortTracker::new();
        let other = PairKey { local: Ipv4Addr::new(10, 0, 0, 2), ..pair() };
        tracker.add_port(pair(), 22, 1);
        tracker.add_port(other, 80, 1);

        assert_eq!(tracker.ports(&pair()), vec![22]);
        assert_eq!(tracker.ports(&other), vec![80]);
    }

    #[test]
    fn unknown_pair_has_no_ports() {
        assert!(PortTracker::new().ports(&pair()).is_empty());
    }
}
