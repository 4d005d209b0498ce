use std::io;
use std::net::IpAddr;

use thiserror::Error;

/// Snapshot could not be read from the config source. Transient: the cycle
/// is aborted and retried on the next interval.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Unable to read snapshot from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Snapshot {path} is not a flat string map: {source}")]
    Format {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Snapshot source unavailable: {0}")]
    Unavailable(String),
}

/// A single key/value that can't be turned into session state.
/// Only the offending key is skipped.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Invalid AS number '{0}'")]
    InvalidAsn(String),
    #[error("No AS number configured for node '{0}' (and no global AS)")]
    UnresolvedAsn(String),
    #[error("Invalid IP address '{0}'")]
    InvalidAddress(String),
    #[error("Malformed value for {key}: {reason}")]
    Malformed { key: String, reason: String },
}

/// The session manager refused an operation. Aborts the cycle without
/// committing the baseline.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("Failed to add session for {addr}: {reason}")]
    Add { addr: IpAddr, reason: String },
    #[error("Failed to remove session for {addr}: {reason}")]
    Remove { addr: IpAddr, reason: String },
    #[error("Failed to advertise local prefix: {0}")]
    Advertise(String),
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Empty IP pool entry")]
    EmptyEntry,
    #[error("IP pool entry has an empty CIDR: {0}")]
    EmptyCidr(String),
    #[error("Invalid IP pool CIDR '{cidr}': {reason}")]
    InvalidCidr { cidr: String, reason: String },
    #[error("Malformed IP pool entry '{entry}': {source}")]
    Malformed {
        entry: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("IP pool update handler failed for {cidr}: {reason}")]
    Handler { cidr: String, reason: String },
}

impl PoolError {
    /// Data errors are logged and skipped; anything else aborts the pool cycle
    pub fn is_data_error(&self) -> bool {
        !matches!(self, PoolError::Handler { .. })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Unable to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid config: {0}")]
    Invalid(String),
}
