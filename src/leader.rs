use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::core::StateCore;
use crate::entry::{LogEntryData, LogIndex};
use crate::error::{Error, Result};
use crate::log::Log;
use crate::options::WriteOptions;

struct Guarded {
    /// `None` once this state has resigned; every operation below checks
    /// this first and fails with `NotLeader` if it is gone.
    core: Option<StateCore>,
    wait_for_applied_queue: BTreeMap<u64, Vec<oneshot::Sender<()>>>,
    next_wait_for_index: LogIndex,
}

/// Ordered write admission and ordered local read at the log's current
/// leader. Wraps a [`StateCore`] behind an exclusive lock and adds the
/// wait-for-applied promise queue and the background poll loop that
/// drains newly committed entries into it.
pub struct LeaderState {
    guarded: Mutex<Guarded>,
    log: Arc<dyn Log>,
    /// Serializes `compare_exchange` end to end, including the wait for its
    /// own entry to apply. The committed-store check and the entry that
    /// decides it are separated by the log's round trip, so without this a
    /// second CAS can read the same pre-image before the first's outcome is
    /// visible and both would be proposed. Plain `set`/`remove` don't need
    /// it: their precondition-free semantics are already made consistent by
    /// log order.
    cas_lock: tokio::sync::Mutex<()>,
}

impl LeaderState {
    pub fn new(core: StateCore, log: Arc<dyn Log>) -> Arc<Self> {
        Arc::new(Self {
            guarded: Mutex::new(Guarded {
                core: Some(core),
                wait_for_applied_queue: BTreeMap::new(),
                next_wait_for_index: LogIndex(1),
            }),
            log,
            cas_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Applies the uncommitted tail a newly elected leader must re-play to
    /// re-materialize its in-memory state, then starts the poll loop.
    /// Called once, at leadership inception.
    pub async fn recover_entries(self: &Arc<Self>, entries: &[crate::entry::LogEntry]) -> Result<()> {
        {
            let mut guarded = self.guarded.lock();
            let core = guarded.core.as_mut().ok_or(Error::NotLeader { leader_hint: None })?;
            core.apply_entries(entries);
        }
        self.start();
        Ok(())
    }

    /// Spawns the background task that drains newly committed entries
    /// from the log into ongoing states and resolves pending
    /// `waitForApplied` promises. Following the teacher's pattern of
    /// spawning long-lived loops from `RhcNode::start`.
    pub fn start(self: &Arc<Self>) {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            state.poll_loop().await;
        });
    }

    async fn poll_loop(self: Arc<Self>) {
        loop {
            let wait_for = {
                let guarded = self.guarded.lock();
                if guarded.core.is_none() {
                    return;
                }
                guarded.next_wait_for_index
            };

            if self.log.wait_for_commit(wait_for).await.is_err() {
                return;
            }

            let committed = self.log.committed().await;
            if committed < wait_for {
                continue;
            }
            let upper_exclusive = committed.next();

            let entries = match self.log.range(wait_for, upper_exclusive).await {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::error!(error = %err, "leader poll loop failed to read committed range");
                    continue;
                }
            };

            let (to_resolve, flush_job) = {
                let mut guarded = self.guarded.lock();
                let Some(core) = guarded.core.as_mut() else {
                    return;
                };

                for entry in &entries {
                    core.apply_to_ongoing_state(entry.index, &entry.data);
                }
                let new_cutoff = LogIndex(upper_exclusive.value() - 1);
                core.update(new_cutoff);
                guarded.next_wait_for_index = upper_exclusive;

                let flush_job = core.take_flush_dump().map(|dump| (core.storage(), dump));

                let cutoff = guarded.next_wait_for_index.value();
                let keys_to_drain: Vec<u64> = guarded
                    .wait_for_applied_queue
                    .range(..cutoff)
                    .map(|(k, _)| *k)
                    .collect();
                let mut resolved = Vec::new();
                for key in keys_to_drain {
                    if let Some(senders) = guarded.wait_for_applied_queue.remove(&key) {
                        resolved.extend(senders);
                    }
                }
                (resolved, flush_job)
            };

            for sender in to_resolve {
                let _ = sender.send(());
            }

            if let Some((storage, dump)) = flush_job {
                let applied = dump.applied_index;
                match storage.store(&dump).await {
                    Ok(()) => {
                        {
                            let mut guarded = self.guarded.lock();
                            if let Some(core) = guarded.core.as_mut() {
                                core.commit_persisted(applied);
                            }
                        }
                        if let Err(err) = self.log.release(applied).await {
                            tracing::warn!(error = %err, "failed to release log prefix after flush");
                        }
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "flush failed, will retry");
                    }
                }
            }
        }
    }

    /// Proposes an `Insert` entry, returning its assigned index once the
    /// options-selected commit/apply guarantee has been observed.
    pub async fn set(
        self: &Arc<Self>,
        map: HashMap<String, String>,
        options: WriteOptions,
    ) -> Result<LogIndex> {
        self.propose(LogEntryData::Insert { map }, options).await
    }

    /// Proposes a `Delete` entry for `keys`.
    pub async fn remove(
        self: &Arc<Self>,
        keys: Vec<String>,
        options: WriteOptions,
    ) -> Result<LogIndex> {
        self.propose(LogEntryData::Delete { keys }, options).await
    }

    /// Checks `key == old_value` against the committed store, then proposes
    /// a `CompareExchange` entry if it matches. Held across the entire
    /// round trip by `cas_lock`, including the wait for this entry to
    /// apply, so the next caller's check always sees this one's outcome:
    /// see the field doc on `cas_lock` for why that's required.
    pub async fn compare_exchange(
        self: &Arc<Self>,
        key: String,
        old_value: String,
        new_value: String,
        options: WriteOptions,
    ) -> Result<LogIndex> {
        let _cas_guard = self.cas_lock.lock().await;

        {
            let guarded = self.guarded.lock();
            let core = guarded.core.as_ref().ok_or(Error::NotLeader { leader_hint: None })?;
            match core.get_committed(&key) {
                Some(current) if current == old_value => {}
                _ => return Err(Error::PreconditionFailed),
            }
        }

        let index = self
            .propose(
                LogEntryData::CompareExchange { key, old_value, new_value },
                WriteOptions { wait_for_applied: true, ..options },
            )
            .await?;

        Ok(index)
    }

    async fn propose(self: &Arc<Self>, data: LogEntryData, options: WriteOptions) -> Result<LogIndex> {
        {
            let guarded = self.guarded.lock();
            if guarded.core.is_none() {
                return Err(Error::NotLeader { leader_hint: None });
            }
        }

        let index = self.log.insert(data).await?;

        if options.wait_for_commit || options.wait_for_sync {
            self.log.wait_for_commit(index).await?;
        }
        if options.wait_for_applied {
            self.wait_for_applied(index).await?;
        }

        Ok(index)
    }

    pub async fn get(self: &Arc<Self>, key: &str, wait_for_applied: LogIndex) -> Result<Option<String>> {
        self.wait_for_applied(wait_for_applied).await?;
        let guarded = self.guarded.lock();
        let core = guarded.core.as_ref().ok_or(Error::NotLeader { leader_hint: None })?;
        Ok(core.get(key))
    }

    pub async fn get_many(
        self: &Arc<Self>,
        keys: &[String],
        wait_for_applied: LogIndex,
    ) -> Result<HashMap<String, String>> {
        self.wait_for_applied(wait_for_applied).await?;
        let guarded = self.guarded.lock();
        let core = guarded.core.as_ref().ok_or(Error::NotLeader { leader_hint: None })?;
        Ok(core.get_many(keys.iter().map(String::as_str)))
    }

    pub async fn get_snapshot(self: &Arc<Self>, wait_for_index: LogIndex) -> Result<HashMap<String, String>> {
        self.wait_for_applied(wait_for_index).await?;
        let guarded = self.guarded.lock();
        let core = guarded.core.as_ref().ok_or(Error::NotLeader { leader_hint: None })?;
        Ok(core.get_snapshot())
    }

    /// The latest index this leader has locally applied. Used as the
    /// implicit `waitForApplied` target for reads that don't name one
    /// explicitly.
    pub fn applied_index(&self) -> LogIndex {
        let next = self.guarded.lock().next_wait_for_index;
        LogIndex(next.value().saturating_sub(1))
    }

    /// Resolves once `index` has been applied locally. Resolves
    /// immediately if it already has; otherwise enqueues a promise the
    /// poll loop will resolve in index order.
    pub async fn wait_for_applied(self: &Arc<Self>, index: LogIndex) -> Result<()> {
        let receiver = {
            let mut guarded = self.guarded.lock();
            if guarded.core.is_none() {
                return Err(Error::NotLeader { leader_hint: None });
            }
            if index < guarded.next_wait_for_index {
                return Ok(());
            }
            let (tx, rx) = oneshot::channel();
            guarded.wait_for_applied_queue.entry(index.value()).or_default().push(tx);
            rx
        };

        receiver
            .await
            .map_err(|_| Error::ResignedDuringOperation { index: Some(index) })
    }

    /// Atomically surrenders the `StateCore`, returning it to the caller.
    /// Every pending `waitForApplied` promise is dropped, which fails
    /// their futures with `ResignedDuringOperation`; later calls observe
    /// `core` as `None` and fail with `NotLeader`.
    pub fn resign(self: &Arc<Self>) -> Result<StateCore> {
        let mut guarded = self.guarded.lock();
        let mut core = guarded.core.take().ok_or(Error::NotLeader { leader_hint: None })?;
        core.reset_ongoing_states();
        guarded.wait_for_applied_queue.clear();
        Ok(core)
    }
}
