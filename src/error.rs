//! Error taxonomy for the detection and mitigation engine.
//!
//! None of these are fatal to the process. A [`MonitorError::Format`] costs
//! one session-table line, [`MonitorError::EmptyInput`] and
//! [`MonitorError::Io`] cost one tick, and [`MonitorError::Operation`] costs
//! one host on one pass.

use std::io;
use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// An endpoint token did not decode as `AABBCCDD:PPPP`.
    #[error("malformed endpoint token {token:?}: {reason}")]
    Format { token: String, reason: String },

    /// The session table held a header and nothing else.
    #[error("session table contained no connection records")]
    EmptyInput,

    /// The session table could not be read to the end.
    #[error("failed to read session table: {0}")]
    Io(#[from] io::Error),

    /// A firewall query, insert or delete failed for one host.
    #[error("firewall {action} failed for {host}: {message}")]
    Operation {
        host:    Ipv4Addr,
        action:  FirewallAction,
        message: String,
    },
}

impl MonitorError {
    pub(crate) fn format(token: &str, reason: impl Into<String>) -> Self {
        Self::Format {
            token:  token.to_string(),
            reason: reason.into(),
        }
    }
}

/// The firewall call an [`MonitorError::Operation`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirewallAction {
    Check,
    Insert,
    Delete,
}

impl std::fmt::Display for FirewallAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FirewallAction::Check  => "check",
            FirewallAction::Insert => "insert",
            FirewallAction::Delete => "delete",
        })
    }
}
