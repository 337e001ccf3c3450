//! The slice of a packet-filter API the host blocker needs.

use std::net::Ipv4Addr;

/// Rule operations against one table/chain, shaped after iptables.
///
/// Errors are plain strings; the caller attaches the host and action.
pub trait FirewallTable {
    fn exists(&self, table: &str, chain: &str, rule: &str) -> Result<bool, String>;
    fn insert(&self, table: &str, chain: &str, position: i32, rule: &str) -> Result<(), String>;
    fn delete(&self, table: &str, chain: &str, rule: &str) -> Result<(), String>;
}

impl FirewallTable for iptables::IPTables {
    fn exists(&self, table: &str, chain: &str, rule: &str) -> Result<bool, String> {
        iptables::IPTables::exists(self, table, chain, rule).map_err(|e| e.to_string())
    }

    fn insert(&self, table: &str, chain: &str, position: i32, rule: &str) -> Result<(), String> {
        iptables::IPTables::insert(self, table, chain, rule, position).map_err(|e| e.to_string())
    }

    fn delete(&self, table: &str, chain: &str, rule: &str) -> Result<(), String> {
        iptables::IPTables::delete(self, table, chain, rule).map_err(|e| e.to_string())
    }
}

/// Opens the IPv4 iptables handle.
///
/// Fails when the `iptables` binary is missing or cannot be run; callers fall
/// back to detect-only mode.
pub fn open_ipv4() -> Result<iptables::IPTables, String> {
    iptables::new(false).map_err(|e| format!("cannot open iptables: {}", e))
}

/// `-s <addr> -j DROP`
pub fn drop_rule(addr: Ipv4Addr) -> String {
    format!("-s {} -j DROP", addr)
}
