//! Server configuration.
//!
//! The configuration is one flat struct handed to the server at startup.
//! How it is produced is the caller's business; deriving `Deserialize`
//! means a YAML or TOML file maps straight onto it. [`Config::policy`]
//! turns the textual policy part into a validated [`UpdatePolicy`] and
//! fails on anything a server must not start with.

use crate::policy::{PolicyScope, UpdatePolicy};
use core::fmt;
use core::str::FromStr;
use core::time::Duration;
use domain::base::iana::Rtype;
use serde::Deserialize;
use std::error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::string::String;
use std::vec::Vec;

/// Scans are not allowed to run more often than this.
const MIN_SCAN_INTERVAL: u64 = 10;

//------------ Config --------------------------------------------------------

/// Everything a server instance needs to know at startup.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Addresses to listen on, over both UDP and TCP.
    #[serde(default = "Config::default_listen")]
    pub listen: Vec<SocketAddr>,

    /// The resolver used for discovery queries.
    #[serde(default = "Config::default_imr")]
    pub imr: SocketAddr,

    /// Capacity of the scan and update queues.
    #[serde(default = "Config::default_queue_len")]
    pub queue_len: usize,

    /// What to do with new work when a queue is full.
    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Seconds between periodic scans.
    #[serde(default = "Config::default_scan_interval")]
    pub scan_interval: u64,

    /// Deadline in seconds for a single outbound query.
    #[serde(default = "Config::default_query_timeout")]
    pub query_timeout: u64,

    /// Seconds an update signature stays valid.
    #[serde(default = "Config::default_sig_validity")]
    pub sig_validity: u64,

    /// Directory with the `.key` files of trusted signers.
    #[serde(default)]
    pub key_dir: Option<PathBuf>,

    /// The `.key`/`.private` pair used for signing our own updates.
    #[serde(default)]
    pub signing_key: Option<PathBuf>,

    /// The child primary the scan engine compares against.
    #[serde(default)]
    pub child_server: Option<SocketAddr>,

    /// The update authorization policy.
    pub policy: PolicyConfig,
}

impl Config {
    fn default_listen() -> Vec<SocketAddr> {
        vec!["127.0.0.1:5354".parse().expect("valid address")]
    }

    fn default_imr() -> SocketAddr {
        "8.8.8.8:53".parse().expect("valid address")
    }

    fn default_queue_len() -> usize {
        5
    }

    fn default_scan_interval() -> u64 {
        60
    }

    fn default_query_timeout() -> u64 {
        5
    }

    fn default_sig_validity() -> u64 {
        300
    }

    /// The interval between periodic scans, never below the minimum.
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval.max(MIN_SCAN_INTERVAL))
    }

    /// The deadline for one outbound query.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }

    /// How long our update signatures stay valid.
    pub fn sig_validity(&self) -> Duration {
        Duration::from_secs(self.sig_validity)
    }

    /// Validates the configuration and builds the update policy.
    ///
    /// Everything this rejects is a reason not to start serving.
    pub fn policy(&self) -> Result<UpdatePolicy, ConfigError> {
        if self.listen.is_empty() {
            return Err(ConfigError::NoListeners);
        }
        if self.queue_len == 0 {
            return Err(ConfigError::ZeroQueue);
        }
        let scope = PolicyScope::from_str(&self.policy.scope)
            .map_err(|_| ConfigError::Scope(self.policy.scope.clone()))?;
        let rtypes = self
            .policy
            .allowed_rtypes
            .iter()
            .map(|name| {
                Rtype::from_str(name)
                    .map_err(|_| ConfigError::Rtype(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        UpdatePolicy::new(scope, rtypes)
            .map_err(|_| ConfigError::EmptyPolicy)
    }
}

//------------ PolicyConfig --------------------------------------------------

/// The textual form of the update policy.
#[derive(Clone, Debug, Deserialize)]
pub struct PolicyConfig {
    /// The policy scope: `self` or `selfsub`.
    pub scope: String,

    /// The record types updates may touch.
    #[serde(default)]
    pub allowed_rtypes: Vec<String>,
}

//------------ OverflowPolicy ------------------------------------------------

/// What happens to new work when a queue is full.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Drop the work and log; the sender still gets its response.
    #[default]
    Drop,

    /// Tell the sender to try again later.
    Reject,
}

//============ Error Types ===================================================

/// The configuration is unusable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// No listen addresses at all.
    NoListeners,

    /// A queue of capacity zero cannot carry work.
    ZeroQueue,

    /// The policy scope is not one we know.
    Scope(String),

    /// A record type in the policy could not be parsed.
    Rtype(String),

    /// The policy allows no record types.
    EmptyPolicy,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::NoListeners => {
                f.write_str("no listen addresses configured")
            }
            ConfigError::ZeroQueue => {
                f.write_str("queue length must not be zero")
            }
            ConfigError::Scope(scope) => {
                write!(f, "unknown policy scope '{}'", scope)
            }
            ConfigError::Rtype(rtype) => {
                write!(f, "invalid record type '{}' in policy", rtype)
            }
            ConfigError::EmptyPolicy => {
                f.write_str("policy allows no record types")
            }
        }
    }
}

impl error::Error for ConfigError {}

//============ Testing ======================================================
