use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A strictly-increasing position in the replicated log. Assigned by the
/// log on insert; never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct LogIndex(pub u64);

impl LogIndex {
    pub const ZERO: LogIndex = LogIndex(0);

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn next(self) -> LogIndex {
        LogIndex(self.0 + 1)
    }
}

impl From<u64> for LogIndex {
    fn from(value: u64) -> Self {
        LogIndex(value)
    }
}

impl std::fmt::Display for LogIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The operation carried by a single log entry. Apply of any variant is a
/// pure function of `(entry, prior store)`: replaying the same entry
/// against the same prior store always produces the same next store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogEntryData {
    /// Sets each (key, value) pair in the batch.
    Insert { map: HashMap<String, String> },

    /// Erases each key that currently exists; erasing an absent key is a
    /// no-op.
    Delete { keys: Vec<String> },

    /// Unconditionally sets `key` to `new_value`. The precondition check
    /// against `old_value` is performed once, at proposal time, by the
    /// leader (see `LeaderState::compare_exchange`) -- apply never
    /// re-validates it. `old_value` is carried on the wire only so that
    /// followers can self-audit; it is not consulted during apply.
    CompareExchange {
        key: String,
        old_value: String,
        new_value: String,
    },
}

/// A single entry of the replicated log, as seen by the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub index: LogIndex,
    pub data: LogEntryData,
}
