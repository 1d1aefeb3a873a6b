use thiserror::Error;

use crate::{entry::LogIndex, ParticipantId};

#[derive(Error, Debug)]
pub enum Error {
    #[error("not the leader of this log")]
    NotLeader { leader_hint: Option<ParticipantId> },

    #[error("not a follower of this log")]
    NotFollower,

    #[error("compare-exchange precondition failed")]
    PreconditionFailed,

    #[error("state was resigned while an operation was pending on index {index:?}")]
    ResignedDuringOperation { index: Option<LogIndex> },

    #[error("could not acquire a snapshot from the leader")]
    SnapshotUnavailable,

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("log entry could not be decoded: {0}")]
    InvalidEntry(String),

    #[error("no such log instance")]
    NotFound,

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
