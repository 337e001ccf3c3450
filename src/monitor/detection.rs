//! Port-scan detection over the tracker's accumulated history.

use crate::monitor::types::{Offender, PortTracker};

impl PortTracker {
    /// Pulls out every pair that has touched at least `threshold` distinct
    /// local ports.
    ///
    /// A flagged pair hands over all of its ports, not just the ones past the
    /// threshold, and is left empty: a host has to build up a full set of
    /// fresh ports again before it can be flagged a second time. Pairs below
    /// the threshold are not touched.
    ///
    /// Offenders come back ordered by `(local, remote)` with ascending ports.
    pub fn extract_offenders(&mut self, threshold: usize) -> Vec<Offender> {
        let mut offenders: Vec<Offender> = self
            .pairs
            .iter_mut()
            .filter(|(_, pair)| pair.ports.len() >= threshold)
            .map(|(key, pair)| Offender {
                local:  key.local,
                remote: key.remote,
                ports:  std::mem::take(&mut pair.ports).into_keys().collect(),
            })
            .collect();

        offenders.sort_by_key(|o| (o.local, o.remote));
        offenders
    }
}
