use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::StateCore;
use crate::entry::{LogEntry, LogIndex};
use crate::error::{Error, Result};
use crate::log::Log;

/// Applies committed entries from the log into a [`StateCore`], flushing
/// and releasing the log prefix as the backlog demands, and acquires a
/// full snapshot from the leader when the log signals a missing prefix.
pub struct FollowerState {
    core: Mutex<Option<StateCore>>,
    log: Arc<dyn Log>,
}

/// The leader-side operation a follower calls into to bootstrap a
/// snapshot. Out of scope for this crate beyond this narrow contract
/// (cluster membership, RPC transport, and leader discovery live
/// elsewhere); [`crate::methods::StateMethods`] implementations supply it.
#[async_trait::async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn get_snapshot(&self, wait_for_index: LogIndex) -> Result<HashMap<String, String>>;
}

impl FollowerState {
    pub fn new(core: StateCore, log: Arc<dyn Log>) -> Arc<Self> {
        Arc::new(Self { core: Mutex::new(Some(core)), log })
    }

    /// Applies `entries` under the lock, then -- outside the lock --
    /// performs any flush and log-release the new backlog calls for.
    pub async fn apply_entries(self: &Arc<Self>, entries: &[LogEntry]) -> Result<()> {
        let flush_job = {
            let mut guard = self.core.lock();
            let core = guard.as_mut().ok_or(Error::NotFollower)?;
            core.apply_entries(entries);
            core.take_flush_dump().map(|dump| (core.storage(), dump))
        };

        if let Some((storage, dump)) = flush_job {
            let applied = dump.applied_index;
            match storage.store(&dump).await {
                Ok(()) => {
                    {
                        let mut guard = self.core.lock();
                        if let Some(core) = guard.as_mut() {
                            core.commit_persisted(applied);
                        }
                    }
                    self.log.release(applied).await?;
                }
                Err(err) => {
                    tracing::error!(error = %err, "follower flush failed, will retry");
                }
            }
        }

        Ok(())
    }

    /// Fetches a full snapshot from `source` and merges it into the core.
    /// Used when the log signals this follower's stored prefix is
    /// missing; must be called before the first `apply_entries`.
    pub async fn acquire_snapshot(
        self: &Arc<Self>,
        source: &dyn SnapshotSource,
        wait_for_index: LogIndex,
    ) -> Result<()> {
        let map = source.get_snapshot(wait_for_index).await?;

        let mut guard = self.core.lock();
        let core = guard.as_mut().ok_or(Error::NotFollower)?;
        core.reset_ongoing_states();
        core.apply_snapshot(map);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let guard = self.core.lock();
        let core = guard.as_ref().ok_or(Error::NotFollower)?;
        Ok(core.get(key))
    }

    pub fn get_many(&self, keys: &[String]) -> Result<HashMap<String, String>> {
        let guard = self.core.lock();
        let core = guard.as_ref().ok_or(Error::NotFollower)?;
        Ok(core.get_many(keys.iter().map(String::as_str)))
    }

    /// Surrenders the `StateCore`. Later operations fail with
    /// `NotFollower`.
    pub fn resign(&self) -> Result<StateCore> {
        self.core.lock().take().ok_or(Error::NotFollower)
    }
}
