use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::StateCore;
use crate::dump::ValueStorage;
use crate::entry::LogIndex;
use crate::error::{Error, Result};
use crate::follower::FollowerState;
use crate::leader::LeaderState;
use crate::log::Log;
use crate::options::{ReadOptions, WriteOptions};
use crate::registry::{Participant, Registry};
use crate::LogId;

/// Current applied/leadership status of a log instance, as returned by
/// the status RPC.
#[derive(Debug, Clone)]
pub struct Status {
    pub log_id: LogId,
    pub is_leader: bool,
}

/// The thin outer contract callers use to interact with a named log
/// instance. Implemented once against the in-process registry (for a
/// server that hosts the participant) and once against the cluster
/// transport (for a server that must forward to the current leader).
#[async_trait]
pub trait StateMethods: Send + Sync {
    async fn insert(&self, log_id: LogId, map: HashMap<String, String>, options: WriteOptions) -> Result<LogIndex>;
    async fn remove(&self, log_id: LogId, keys: Vec<String>, options: WriteOptions) -> Result<LogIndex>;
    async fn compare_exchange(
        &self,
        log_id: LogId,
        key: String,
        old_value: String,
        new_value: String,
        options: WriteOptions,
    ) -> Result<LogIndex>;
    async fn get(&self, log_id: LogId, key: String, options: ReadOptions) -> Result<Option<String>>;
    async fn get_many(&self, log_id: LogId, keys: Vec<String>, options: ReadOptions) -> Result<HashMap<String, String>>;
    async fn get_snapshot(&self, log_id: LogId, wait_for_index: LogIndex) -> Result<HashMap<String, String>>;
    async fn wait_for_applied(&self, log_id: LogId, index: LogIndex) -> Result<()>;
    async fn create_state(&self, log_id: LogId) -> Result<()>;
    async fn drop(&self, log_id: LogId) -> Result<()>;
    async fn status(&self, log_id: LogId) -> Result<Status>;
}

/// Resolves `(database, logId)` -- collapsed here to just `logId`, since a
/// single `Registry` corresponds to one database's worth of log instances
/// -- to a locally hosted `Participant` and invokes the matching
/// `LeaderState`/`FollowerState` method directly, with no RPC hop.
pub struct LocalStateMethods {
    registry: Arc<Registry>,
    log: Arc<dyn Log>,
    storage: Arc<dyn ValueStorage>,
    flush_batch_size: u64,
    self_id: crate::ParticipantId,
}

impl LocalStateMethods {
    pub fn new(
        registry: Arc<Registry>,
        log: Arc<dyn Log>,
        storage: Arc<dyn ValueStorage>,
        flush_batch_size: u64,
        self_id: crate::ParticipantId,
    ) -> Self {
        Self { registry, log, storage, flush_batch_size, self_id }
    }

    fn resolve(&self, log_id: LogId) -> Result<Participant> {
        self.registry.get(log_id).ok_or(Error::NotFound)
    }

    /// `readOptions.readFrom` pins a read to a specific participant: "if
    /// I am that participant, answer; otherwise fail".
    fn check_read_from(&self, options: &ReadOptions) -> Result<()> {
        match options.read_from {
            Some(wanted) if wanted != self.self_id => Err(Error::NotFollower),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl StateMethods for LocalStateMethods {
    async fn insert(&self, log_id: LogId, map: HashMap<String, String>, options: WriteOptions) -> Result<LogIndex> {
        match self.resolve(log_id)? {
            Participant::Leader(leader) => leader.set(map, options).await,
            Participant::Follower(_) => Err(Error::NotLeader { leader_hint: None }),
        }
    }

    async fn remove(&self, log_id: LogId, keys: Vec<String>, options: WriteOptions) -> Result<LogIndex> {
        match self.resolve(log_id)? {
            Participant::Leader(leader) => leader.remove(keys, options).await,
            Participant::Follower(_) => Err(Error::NotLeader { leader_hint: None }),
        }
    }

    async fn compare_exchange(
        &self,
        log_id: LogId,
        key: String,
        old_value: String,
        new_value: String,
        options: WriteOptions,
    ) -> Result<LogIndex> {
        match self.resolve(log_id)? {
            Participant::Leader(leader) => leader.compare_exchange(key, old_value, new_value, options).await,
            Participant::Follower(_) => Err(Error::NotLeader { leader_hint: None }),
        }
    }

    async fn get(&self, log_id: LogId, key: String, options: ReadOptions) -> Result<Option<String>> {
        self.check_read_from(&options)?;
        match self.resolve(log_id)? {
            Participant::Leader(leader) => {
                let wait_index = options.wait_for_applied.unwrap_or_else(|| leader.applied_index());
                leader.get(&key, wait_index).await
            }
            Participant::Follower(follower) => {
                if !options.allow_dirty_read && options.wait_for_applied.is_none() {
                    return Err(Error::NotLeader { leader_hint: None });
                }
                follower.get(&key)
            }
        }
    }

    async fn get_many(&self, log_id: LogId, keys: Vec<String>, options: ReadOptions) -> Result<HashMap<String, String>> {
        self.check_read_from(&options)?;
        match self.resolve(log_id)? {
            Participant::Leader(leader) => {
                let wait_index = options.wait_for_applied.unwrap_or_else(|| leader.applied_index());
                leader.get_many(&keys, wait_index).await
            }
            Participant::Follower(follower) => {
                if !options.allow_dirty_read && options.wait_for_applied.is_none() {
                    return Err(Error::NotLeader { leader_hint: None });
                }
                follower.get_many(&keys)
            }
        }
    }

    async fn get_snapshot(&self, log_id: LogId, wait_for_index: LogIndex) -> Result<HashMap<String, String>> {
        match self.resolve(log_id)? {
            Participant::Leader(leader) => leader.get_snapshot(wait_for_index).await,
            Participant::Follower(_) => Err(Error::NotLeader { leader_hint: None }),
        }
    }

    async fn wait_for_applied(&self, log_id: LogId, index: LogIndex) -> Result<()> {
        match self.resolve(log_id)? {
            Participant::Leader(leader) => leader.wait_for_applied(index).await,
            Participant::Follower(_) => Err(Error::NotLeader { leader_hint: None }),
        }
    }

    async fn create_state(&self, log_id: LogId) -> Result<()> {
        if self.registry.contains(log_id) {
            return Ok(());
        }
        let core = StateCore::construct(log_id, Arc::clone(&self.storage), self.flush_batch_size).await?;
        let leader = LeaderState::new(core, Arc::clone(&self.log));
        leader.start();
        self.registry.insert_leader(log_id, leader);
        Ok(())
    }

    async fn drop(&self, log_id: LogId) -> Result<()> {
        match self.registry.remove(log_id) {
            Some(Participant::Leader(leader)) => {
                leader.resign()?;
                Ok(())
            }
            Some(Participant::Follower(follower)) => {
                follower.resign()?;
                Ok(())
            }
            None => Err(Error::NotFound),
        }
    }

    async fn status(&self, log_id: LogId) -> Result<Status> {
        match self.resolve(log_id)? {
            Participant::Leader(_) => Ok(Status { log_id, is_leader: true }),
            Participant::Follower(_) => Ok(Status { log_id, is_leader: false }),
        }
    }
}

