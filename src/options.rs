use crate::entry::LogIndex;
use crate::ParticipantId;

/// Closed set of options accepted by the write-side [`StateMethods`](crate::methods::StateMethods)
/// operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Await the leader having applied the assigned index before resolving.
    pub wait_for_applied: bool,
    /// Await the log's durable-sync guarantee for the assigned index.
    pub wait_for_sync: bool,
    /// Await commit (quorum replication) of the assigned index.
    pub wait_for_commit: bool,
}

/// Closed set of options accepted by the read-side [`StateMethods`](crate::methods::StateMethods)
/// operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// The index the read must have observed applied before it is served.
    pub wait_for_applied: Option<LogIndex>,
    /// Permit serving the read from a follower without first consulting
    /// the leader for the latest index.
    pub allow_dirty_read: bool,
    /// Restrict the read to a specific participant: "if I am that
    /// participant, answer; otherwise fail".
    pub read_from: Option<ParticipantId>,
}
