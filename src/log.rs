use async_trait::async_trait;
use std::collections::BTreeMap;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::entry::{LogEntry, LogEntryData, LogIndex};
use crate::error::Result;

/// The contract this crate expects of an externally supplied replicated
/// log. Leader election, replication, and commit-index calculation all
/// happen on the other side of this trait; the state machine only ever
/// inserts entries, waits for them to commit, and streams committed
/// entries back out in order.
///
/// Implementations may leave gaps in the index sequence (for log-internal
/// meta-entries that carry no [`LogEntryData`]); [`StateCore::apply_entries`](crate::core::StateCore::apply_entries)
/// tolerates gaps by simply skipping indices the log never hands back.
#[async_trait]
pub trait Log: Send + Sync {
    /// Appends `data` to the log, returning the index it was assigned.
    /// Only ever called on the leader.
    async fn insert(&self, data: LogEntryData) -> Result<LogIndex>;

    /// Resolves once `index` is known to be committed (durably replicated
    /// to a quorum). Resolves immediately if it is already committed.
    async fn wait_for_commit(&self, index: LogIndex) -> Result<()>;

    /// Returns every entry with `from <= index < to`, in index order,
    /// skipping any gaps. Used by both leader and follower to drain newly
    /// committed entries into the state machine.
    async fn range(&self, from: LogIndex, to: LogIndex) -> Result<Vec<LogEntry>>;

    /// The first index the log still retains; entries below this have been
    /// compacted away and can only be recovered via a snapshot.
    async fn head(&self) -> LogIndex;

    /// The index of the most recently committed entry, or `LogIndex::ZERO`
    /// if nothing has committed yet.
    async fn committed(&self) -> LogIndex;

    /// Releases (permits compaction of) every entry up to and including
    /// `index`. Called once the state machine has durably persisted a
    /// snapshot covering that index.
    async fn release(&self, index: LogIndex) -> Result<()>;
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<u64, LogEntry>,
    next_index: u64,
    committed: u64,
    head: u64,
}

/// An in-process [`Log`] that commits every inserted entry immediately.
/// Used by this crate's own integration tests, and a reasonable stand-in
/// anywhere a single-node deployment needs a log without running an actual
/// replication protocol.
///
/// `wait_for_commit` genuinely suspends until the requested index commits,
/// woken via `notify`, rather than resolving unconditionally -- so a
/// `LeaderState` poll loop parked on it actually blocks when there is
/// nothing new to consume, instead of busy-spinning.
pub struct InMemoryLog {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { next_index: 1, ..Inner::default() }),
            notify: Notify::new(),
        }
    }
}

impl Default for InMemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Log for InMemoryLog {
    async fn insert(&self, data: LogEntryData) -> Result<LogIndex> {
        let index = {
            let mut inner = self.inner.lock();
            let index = LogIndex(inner.next_index);
            inner.next_index += 1;
            inner.entries.insert(index.value(), LogEntry { index, data });
            inner.committed = index.value();
            index
        };
        self.notify.notify_waiters();
        Ok(index)
    }

    async fn wait_for_commit(&self, index: LogIndex) -> Result<()> {
        loop {
            let notified = self.notify.notified();
            if self.inner.lock().committed >= index.value() {
                return Ok(());
            }
            notified.await;
        }
    }

    async fn range(&self, from: LogIndex, to: LogIndex) -> Result<Vec<LogEntry>> {
        let inner = self.inner.lock();
        Ok(inner
            .entries
            .range(from.value()..to.value())
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn head(&self) -> LogIndex {
        LogIndex(self.inner.lock().head)
    }

    async fn committed(&self) -> LogIndex {
        LogIndex(self.inner.lock().committed)
    }

    async fn release(&self, index: LogIndex) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.entries.retain(|&i, _| i > index.value());
        inner.head = inner.head.max(index.value());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn insert_assigns_increasing_indices() {
        let log = InMemoryLog::new();
        let a = log.insert(LogEntryData::Delete { keys: vec![] }).await.unwrap();
        let b = log.insert(LogEntryData::Delete { keys: vec![] }).await.unwrap();
        assert!(b.value() > a.value());
    }

    #[tokio::test]
    async fn range_is_half_open() {
        let log = InMemoryLog::new();
        for _ in 0..3 {
            log.insert(LogEntryData::Delete { keys: vec![] }).await.unwrap();
        }
        let entries = log.range(LogIndex(1), LogIndex(3)).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index, LogIndex(1));
        assert_eq!(entries[1].index, LogIndex(2));
    }

    #[tokio::test]
    async fn wait_for_commit_blocks_until_the_index_is_inserted() {
        let log = Arc::new(InMemoryLog::new());
        let waiter = {
            let log = log.clone();
            tokio::spawn(async move { log.wait_for_commit(LogIndex(1)).await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        log.insert(LogEntryData::Delete { keys: vec![] }).await.unwrap();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn release_advances_head_and_drops_entries() {
        let log = InMemoryLog::new();
        log.insert(LogEntryData::Delete { keys: vec![] }).await.unwrap();
        log.insert(LogEntryData::Delete { keys: vec![] }).await.unwrap();
        log.release(LogIndex(1)).await.unwrap();
        assert_eq!(log.head().await, LogIndex(1));
        let entries = log.range(LogIndex(0), LogIndex(10)).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].index, LogIndex(2));
    }
}
