use std::sync::Arc;

use dashmap::DashMap;

use crate::follower::FollowerState;
use crate::leader::LeaderState;
use crate::LogId;

/// The role a locally hosted state instance is currently playing.
/// Mirrors the teacher's `DashMap<NodeId, NodeInfo>` peer registry, keyed
/// here by the log identifier instead of a node identifier.
#[derive(Clone)]
pub enum Participant {
    Leader(Arc<LeaderState>),
    Follower(Arc<FollowerState>),
}

/// Resolves `logId` to the locally hosted `Participant`, if this process
/// hosts one. One entry per log instance this process participates in,
/// as either leader or follower.
#[derive(Default)]
pub struct Registry {
    participants: DashMap<LogId, Participant>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, log_id: LogId) -> Option<Participant> {
        self.participants.get(&log_id).map(|entry| entry.value().clone())
    }

    pub fn insert_leader(&self, log_id: LogId, leader: Arc<LeaderState>) {
        self.participants.insert(log_id, Participant::Leader(leader));
    }

    pub fn insert_follower(&self, log_id: LogId, follower: Arc<FollowerState>) {
        self.participants.insert(log_id, Participant::Follower(follower));
    }

    /// Removes and returns the participant previously hosted for
    /// `log_id`, e.g. after a role transition surrenders its state.
    pub fn remove(&self, log_id: LogId) -> Option<Participant> {
        self.participants.remove(&log_id).map(|(_, v)| v)
    }

    pub fn contains(&self, log_id: LogId) -> bool {
        self.participants.contains_key(&log_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StateCore;
    use crate::dump::InMemoryValueStorage;
    use crate::log::InMemoryLog;

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let registry = Registry::new();
        let log_id = LogId::new();
        let log = Arc::new(InMemoryLog::new());
        let core = StateCore::construct(log_id, Arc::new(InMemoryValueStorage::new()), 1000)
            .await
            .unwrap();
        registry.insert_leader(log_id, LeaderState::new(core, log));

        assert!(matches!(registry.get(log_id), Some(Participant::Leader(_))));
        assert!(registry.get(LogId::new()).is_none());
    }
}
