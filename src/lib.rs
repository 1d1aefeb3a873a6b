#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! A replicated key-value state machine that runs on top of an externally
//! supplied replicated log.
//!
//! Writes are proposed at the leader, replicated by the log, and applied in
//! log-index order at every participant. Reads are served locally after the
//! caller's requested index has been applied. A follower whose log prefix is
//! missing bootstraps from a full snapshot of the leader's committed store.
//!
//! The log itself (leader election, replication, commit-index calculation)
//! is out of scope for this crate: it is represented only by the [`log::Log`]
//! trait contract.

pub mod client;
pub mod config;
pub mod core;
pub mod dump;
pub mod entry;
pub mod error;
pub mod follower;
pub mod leader;
pub mod log;
pub mod methods;
pub mod options;
pub mod registry;
pub mod rpc;
pub mod store;

pub use config::StateMachineConfig;
pub use entry::{LogEntry, LogEntryData, LogIndex};
pub use error::{Error, Result};
pub use methods::StateMethods;
pub use options::{ReadOptions, WriteOptions};
pub use store::Store;

/// Identifies a single replicated log instance (and therefore a single
/// state machine) within a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct LogId(pub uuid::Uuid);

impl LogId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for LogId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for LogId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(uuid::Uuid::parse_str(s)?))
    }
}

/// Identifies a single server taking part in the cluster (leader or
/// follower of one or more logs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ParticipantId(pub uuid::Uuid);

impl ParticipantId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}
