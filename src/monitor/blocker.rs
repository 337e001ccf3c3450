//! Turns offenders into iptables DROP rules and takes them down again on exit.
//!
//! Per remote address the lifecycle is `unseen → flagged → blocked`, and
//! `blocked → unblocked` only during [`HostBlocker::clean_up`]. There is no
//! expiry on a block while the process runs.

use crate::error::{FirewallAction, MonitorError};
use crate::logger::{Event, SharedLogger};
use crate::monitor::config::{FILTER_TABLE, INPUT_CHAIN, RULE_POSITION};
use crate::monitor::firewall::{drop_rule, FirewallTable};
use crate::monitor::types::Offender;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

pub struct HostBlocker {
    /// `None` runs in detect-only mode: offenders are logged and remembered
    /// but no rule is touched.
    firewall: Option<Box<dyn FirewallTable>>,
    /// Hosts with a rule this process installed (or would have, in
    /// detect-only mode). Each is removed exactly once on cleanup.
    blocked:  BTreeSet<Ipv4Addr>,
    /// Hosts that already had a matching DROP rule when we went to add one.
    /// Not ours to remove.
    preexisting: BTreeSet<Ipv4Addr>,
    logger:   SharedLogger,
}

impl HostBlocker {
    pub fn new(firewall: Option<Box<dyn FirewallTable>>, logger: SharedLogger) -> Self {
        Self {
            firewall,
            blocked: BTreeSet::new(),
            preexisting: BTreeSet::new(),
            logger,
        }
    }

    pub fn is_enforcing(&self) -> bool {
        self.firewall.is_some()
    }

    pub fn is_blocked(&self, addr: Ipv4Addr) -> bool {
        self.blocked.contains(&addr) || self.preexisting.contains(&addr)
    }

    /// Hosts whose DROP rule this process is responsible for, ascending.
    pub fn blocked_hosts(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.blocked.iter().copied()
    }

    /// Blocks every offender that is not already blocked.
    ///
    /// The unspecified and loopback addresses are never blocked: listening
    /// sockets show up with a `0.0.0.0` peer, and dropping loopback would cut
    /// off local services.
    ///
    /// A failure on one host is logged and returned; the remaining offenders
    /// are still processed and the failed host stays eligible for a retry.
    pub fn block(&mut self, offenders: Vec<Offender>) -> Vec<MonitorError> {
        let mut errors = Vec::new();

        for offender in offenders {
            let remote = offender.remote;
            if remote.is_unspecified() || remote.is_loopback() || self.is_blocked(remote) {
                continue;
            }

            self.logger.log(&Event::PortScan {
                remote,
                local: offender.local,
                ports: &offender.ports,
            });

            let Some(firewall) = self.firewall.as_deref() else {
                self.blocked.insert(remote);
                self.logger.log(&Event::HostBlocked { remote, enforced: false });
                continue;
            };

            match ensure_dropped(firewall, remote) {
                Ok(Installed::Now) => {
                    self.blocked.insert(remote);
                    self.logger.log(&Event::HostBlocked { remote, enforced: true });
                }
                Ok(Installed::Already) => {
                    self.preexisting.insert(remote);
                    self.logger.log(&Event::RuleExists { remote });
                }
                Err(e) => {
                    self.logger.log(&Event::BlockFailed { remote, error: &e.to_string() });
                    errors.push(e);
                }
            }
        }

        errors
    }

    /// Removes every rule this process installed. One delete per host; a
    /// failure is logged and does not stop the rest.
    ///
    /// Meant to run once at shutdown. The blocked set is drained either way,
    /// so a second call is a no-op.
    pub fn clean_up(&mut self) -> Vec<MonitorError> {
        let hosts = std::mem::take(&mut self.blocked);
        let mut errors = Vec::new();

        let Some(firewall) = self.firewall.as_deref() else {
            return errors;
        };

        self.logger.log(&Event::Info {
            message: &format!("Removing {} DROP rule(s) added during this run", hosts.len()),
        });

        for remote in hosts {
            if let Err(message) = firewall.delete(FILTER_TABLE, INPUT_CHAIN, &drop_rule(remote)) {
                let e = MonitorError::Operation {
                    host:   remote,
                    action: FirewallAction::Delete,
                    message,
                };
                self.logger.log(&Event::UnblockFailed { remote, error: &e.to_string() });
                errors.push(e);
            }
        }

        errors
    }
}

enum Installed {
    Now,
    Already,
}

/// Check-then-insert so a host never gets a second identical rule.
fn ensure_dropped(firewall: &dyn FirewallTable, remote: Ipv4Addr) -> Result<Installed, MonitorError> {
    let rule = drop_rule(remote);
    let op_err = |action, message| MonitorError::Operation { host: remote, action, message };

    let exists = firewall
        .exists(FILTER_TABLE, INPUT_CHAIN, &rule)
        .map_err(|m| op_err(FirewallAction::Check, m))?;
    if exists {
        return Ok(Installed::Already);
    }

    firewall
        .insert(FILTER_TABLE, INPUT_CHAIN, RULE_POSITION, &rule)
        .map_err(|m| op_err(FirewallAction::Insert, m))?;
    Ok(Installed::Now)
}
