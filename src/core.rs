use std::collections::VecDeque;
use std::sync::Arc;

use crate::dump::{Dump, ValueStorage};
use crate::entry::{LogEntry, LogEntryData, LogIndex};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::LogId;

/// The apply engine. Owns the persistent key-value map, tracks
/// `last_applied_index`/`last_persisted_index`, and (on the leader only)
/// a deque of uncommitted ongoing states.
///
/// `FollowerState` and `LeaderState` each own exactly one `StateCore`
/// behind their own mutex; this type itself does no locking.
pub struct StateCore {
    log_id: LogId,
    store: Store,
    last_applied_index: LogIndex,
    last_persisted_index: LogIndex,
    ongoing_states: VecDeque<(LogIndex, Store)>,
    storage: Arc<dyn ValueStorage>,
    flush_batch_size: u64,
}

impl StateCore {
    /// Loads the latest durable dump (if any) and builds a core atop it.
    /// Fails fatally if the load itself errors -- a participant whose
    /// storage cannot be read must not start.
    pub async fn construct(
        log_id: LogId,
        storage: Arc<dyn ValueStorage>,
        flush_batch_size: u64,
    ) -> Result<Self> {
        let dump = storage
            .load()
            .await
            .map_err(|e| Error::StorageError(e.to_string()))?;

        let (store, last_applied_index) = match dump {
            Some(Dump { applied_index, map }) => (Store::from_map(map), applied_index),
            None => (Store::new(), LogIndex::ZERO),
        };

        tracing::debug!(log_id = %log_id, applied = %last_applied_index, "state core constructed");

        Ok(Self {
            log_id,
            store,
            last_applied_index,
            last_persisted_index: last_applied_index,
            ongoing_states: VecDeque::new(),
            storage,
            flush_batch_size,
        })
    }

    pub fn log_id(&self) -> LogId {
        self.log_id
    }

    pub fn last_applied_index(&self) -> LogIndex {
        self.last_applied_index
    }

    pub fn last_persisted_index(&self) -> LogIndex {
        self.last_persisted_index
    }

    /// Applies every entry of `entries` (already sorted in strictly
    /// increasing index order, gaps permitted) to `store`, then advances
    /// `last_applied_index` to the last entry's index. Idempotent under
    /// re-application of an already-applied prefix, because callers are
    /// expected to drive this only with entries `> last_applied_index`,
    /// and each variant's apply is a pure function of `(entry, store)`.
    pub fn apply_entries(&mut self, entries: &[LogEntry]) {
        let Some(last) = entries.last() else {
            return;
        };
        let final_index = last.index;

        tracing::trace!(log_id = %self.log_id, count = entries.len(), "applying entries");

        for entry in entries {
            self.store.apply(&entry.data);
        }
        self.last_applied_index = final_index;
    }

    /// Leader-only: applies `entry` to `store` and records the resulting
    /// snapshot as a new ongoing state at `idx`. Cheap because `Store`
    /// clones are structural-sharing.
    pub fn apply_to_ongoing_state(&mut self, idx: LogIndex, entry: &LogEntryData) {
        self.store.apply(entry);
        self.ongoing_states.push_back((idx, self.store.clone()));
    }

    /// Leader-only: advances the committed cutoff to `last_index_to_apply`.
    /// Pops ongoing states from the front while the *second* element's
    /// index is still `<= cutoff`, preserving the invariant that the
    /// front is always the latest ongoing state at or before the cutoff
    /// (or the sole remaining one). Gaps in the index sequence mean the
    /// deque need not contain a state exactly at the cutoff.
    pub fn update(&mut self, last_index_to_apply: LogIndex) {
        while self.ongoing_states.len() > 1 {
            let second_index = self.ongoing_states[1].0;
            if second_index <= last_index_to_apply {
                self.ongoing_states.pop_front();
            } else {
                break;
            }
        }
        self.last_applied_index = last_index_to_apply;
    }

    /// Leader: the front of `ongoing_states` if non-empty, else the
    /// committed `store`. Follower: always the committed `store` (the
    /// deque is never populated on followers).
    pub fn get_read_state(&self) -> &Store {
        match self.ongoing_states.front() {
            Some((_, store)) => store,
            None => &self.store,
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_read_state().get(key)
    }

    pub fn get_many<'a, I>(&self, keys: I) -> std::collections::HashMap<String, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.get_read_state().get_many(keys)
    }

    /// Reads directly against the committed store, bypassing ongoing
    /// states. Used for the `compareExchange` precondition check, which
    /// must linearize with commit order rather than the leader's own
    /// locally-applied-but-uncommitted writes.
    pub fn get_committed(&self, key: &str) -> Option<String> {
        self.store.get(key)
    }

    /// Returns a `Dump` of the committed store if the unpersisted backlog
    /// exceeds `flush_batch_size`, else `None`. Does not perform I/O and
    /// does not mutate `last_persisted_index` -- the actual storage write
    /// is I/O and must happen outside whatever lock guards this core;
    /// callers report success back via [`StateCore::commit_persisted`].
    pub fn take_flush_dump(&self) -> Option<Dump> {
        let backlog = self.last_applied_index.value().saturating_sub(self.last_persisted_index.value());
        if backlog <= self.flush_batch_size {
            return None;
        }
        Some(Dump {
            applied_index: self.last_applied_index,
            map: self.store.to_map(),
        })
    }

    /// The storage handle, for callers performing the flush I/O outside
    /// this core's lock.
    pub fn storage(&self) -> Arc<dyn ValueStorage> {
        Arc::clone(&self.storage)
    }

    /// Records that `index` has been durably persisted. A no-op if a
    /// later flush already advanced past it (can happen if two flush
    /// attempts race; the later index always wins).
    pub fn commit_persisted(&mut self, index: LogIndex) {
        if index > self.last_persisted_index {
            self.last_persisted_index = index;
            tracing::debug!(log_id = %self.log_id, index = %index, "flushed dump");
        }
    }

    /// Convenience wrapper combining [`StateCore::take_flush_dump`], the
    /// storage write, and [`StateCore::commit_persisted`] for callers (such
    /// as tests) that don't need to release the lock around the I/O.
    /// Production call sites (the leader poll loop, follower apply path)
    /// use the split form instead. Failure is logged and absorbed.
    pub async fn flush(&mut self) -> bool {
        let Some(dump) = self.take_flush_dump() else {
            return false;
        };
        let applied = dump.applied_index;
        match self.storage().store(&dump).await {
            Ok(()) => {
                self.commit_persisted(applied);
                true
            }
            Err(err) => {
                tracing::error!(log_id = %self.log_id, error = %err, "flush failed, will retry");
                false
            }
        }
    }

    /// Exports the committed store as a plain map, for the snapshot RPC.
    pub fn get_snapshot(&self) -> std::collections::HashMap<String, String> {
        self.store.to_map()
    }

    /// Merges `map` into the committed store. Safe only on a fresh core
    /// (or one whose ongoing states were just reset with an empty store);
    /// callers must invoke this before the first `apply_entries` call.
    /// `last_applied_index` is untouched -- the caller derives it from
    /// the entries applied afterward.
    pub fn apply_snapshot(&mut self, map: std::collections::HashMap<String, String>) {
        self.store.merge_from(map);
    }

    /// Clears ongoing states. Used on leader resign and when a snapshot
    /// is applied.
    pub fn reset_ongoing_states(&mut self) {
        self.ongoing_states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::InMemoryValueStorage;

    async fn fresh_core() -> StateCore {
        StateCore::construct(LogId::new(), Arc::new(InMemoryValueStorage::new()), 1000)
            .await
            .unwrap()
    }

    fn insert_entry(index: u64, pairs: &[(&str, &str)]) -> LogEntry {
        LogEntry {
            index: LogIndex(index),
            data: LogEntryData::Insert {
                map: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            },
        }
    }

    #[tokio::test]
    async fn construct_with_no_dump_starts_empty() {
        let core = fresh_core().await;
        assert_eq!(core.last_applied_index(), LogIndex::ZERO);
        assert_eq!(core.get("x"), None);
    }

    #[tokio::test]
    async fn apply_entries_advances_last_applied_index() {
        let mut core = fresh_core().await;
        core.apply_entries(&[insert_entry(1, &[("a", "1")]), insert_entry(2, &[("b", "2")])]);
        assert_eq!(core.last_applied_index(), LogIndex(2));
        assert_eq!(core.get("a"), Some("1".to_string()));
        assert_eq!(core.get("b"), Some("2".to_string()));
    }

    #[tokio::test]
    async fn ongoing_state_pops_only_while_second_index_at_or_before_cutoff() {
        let mut core = fresh_core().await;
        core.apply_to_ongoing_state(LogIndex(1), &LogEntryData::Insert {
            map: [("a".to_string(), "1".to_string())].into(),
        });
        core.apply_to_ongoing_state(LogIndex(2), &LogEntryData::Insert {
            map: [("a".to_string(), "2".to_string())].into(),
        });
        core.apply_to_ongoing_state(LogIndex(3), &LogEntryData::Insert {
            map: [("a".to_string(), "3".to_string())].into(),
        });

        core.update(LogIndex(2));
        assert_eq!(core.get("a"), Some("2".to_string()));

        core.update(LogIndex(3));
        assert_eq!(core.get("a"), Some("3".to_string()));
    }

    #[tokio::test]
    async fn flush_respects_batch_threshold() {
        let mut core = StateCore::construct(LogId::new(), Arc::new(InMemoryValueStorage::new()), 2)
            .await
            .unwrap();
        core.apply_entries(&[insert_entry(1, &[("a", "1")])]);
        assert!(!core.flush().await);

        core.apply_entries(&[insert_entry(2, &[("b", "2")]), insert_entry(3, &[("c", "3")])]);
        assert!(core.flush().await);
        assert_eq!(core.last_persisted_index(), LogIndex(3));
    }

    #[tokio::test]
    async fn snapshot_round_trips_into_fresh_core() {
        let mut source = fresh_core().await;
        source.apply_entries(&[insert_entry(1, &[("a", "1"), ("b", "2")])]);
        let snapshot = source.get_snapshot();

        let mut target = fresh_core().await;
        target.apply_snapshot(snapshot.clone());
        assert_eq!(target.get_snapshot(), snapshot);
    }

    #[tokio::test]
    async fn compare_exchange_precondition_bypasses_read_lag() {
        // get_read_state() can lag behind the true apply cutoff until
        // update() catches up (that's what lets reads stay at a
        // caller-pinned index); get_committed() never lags, because
        // compareExchange's precondition must race-free against the
        // latest applied write regardless of where reads are pinned.
        let mut core = fresh_core().await;
        core.apply_to_ongoing_state(LogIndex(1), &LogEntryData::Insert {
            map: [("k".to_string(), "0".to_string())].into(),
        });
        core.update(LogIndex(1));
        core.apply_to_ongoing_state(LogIndex(2), &LogEntryData::Insert {
            map: [("k".to_string(), "1".to_string())].into(),
        });

        assert_eq!(core.get("k"), Some("0".to_string()));
        assert_eq!(core.get_committed("k"), Some("1".to_string()));

        core.update(LogIndex(2));
        assert_eq!(core.get("k"), Some("1".to_string()));
    }
}
