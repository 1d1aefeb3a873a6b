use std::collections::HashMap;

use imbl::HashMap as PersistentMap;

use crate::entry::LogEntryData;

/// A copy-on-write, structurally-shared mapping from string keys to string
/// values. Cloning a `Store` is O(1)-amortized, which is what lets
/// `StateCore::apply_to_ongoing_state` stash a snapshot per uncommitted
/// entry without ever deep-copying the map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Store {
    map: PersistentMap<String, String>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a single log entry's operation to this store in place.
    /// Pure with respect to `(entry, prior store)`: calling this twice with
    /// the same data from the same starting point yields the same result,
    /// which is what makes `StateCore::apply_entries` idempotent under
    /// re-application of an already-applied range.
    pub fn apply(&mut self, data: &LogEntryData) {
        match data {
            LogEntryData::Insert { map } => {
                for (k, v) in map {
                    self.map.insert(k.clone(), v.clone());
                }
            }
            LogEntryData::Delete { keys } => {
                for k in keys {
                    self.map.remove(k);
                }
            }
            LogEntryData::CompareExchange { key, new_value, .. } => {
                self.map.insert(key.clone(), new_value.clone());
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_many<'a, I>(&self, keys: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        keys.into_iter()
            .filter_map(|k| self.map.get(k).map(|v| (k.to_string(), v.clone())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Exports a plain-map copy of the store, used for the snapshot RPC and
    /// for persisted dumps.
    pub fn to_map(&self) -> HashMap<String, String> {
        self.map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Merges `map` into this store. This is a merge, not a replace: it is
    /// only safe to call on a freshly constructed store (or one whose
    /// ongoing states were just reset), otherwise stale keys from before
    /// the merge would linger alongside the imported snapshot.
    pub fn merge_from(&mut self, map: HashMap<String, String>) {
        for (k, v) in map {
            self.map.insert(k, v);
        }
    }

    pub fn from_map(map: HashMap<String, String>) -> Self {
        let mut store = Self::new();
        store.merge_from(map);
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(pairs: &[(&str, &str)]) -> LogEntryData {
        LogEntryData::Insert {
            map: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn insert_then_get() {
        let mut store = Store::new();
        store.apply(&insert(&[("x", "1")]));
        assert_eq!(store.get("x"), Some("1".to_string()));
    }

    #[test]
    fn delete_missing_key_is_noop() {
        let mut store = Store::new();
        store.apply(&LogEntryData::Delete { keys: vec!["missing".to_string()] });
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn compare_exchange_apply_is_unconditional() {
        let mut store = Store::new();
        store.apply(&insert(&[("k", "0")]));
        store.apply(&LogEntryData::CompareExchange {
            key: "k".to_string(),
            old_value: "does-not-match".to_string(),
            new_value: "A".to_string(),
        });
        assert_eq!(store.get("k"), Some("A".to_string()));
    }

    #[test]
    fn replaying_a_suffix_a_second_time_does_not_change_the_result() {
        let entries = vec![
            insert(&[("a", "1"), ("b", "2")]),
            insert(&[("a", "10")]),
            LogEntryData::Delete { keys: vec!["b".to_string()] },
        ];

        let mut once = Store::new();
        for e in &entries {
            once.apply(e);
        }

        // Applying the full sequence, then applying its tail from index 1
        // again, must land on the same store: every LogEntryData variant's
        // apply is a pure function of (entry, prior store), so re-running
        // an already-applied suffix is a no-op on top of the first pass.
        let mut replayed = Store::new();
        for e in &entries {
            replayed.apply(e);
        }
        for e in &entries[1..] {
            replayed.apply(e);
        }

        assert_eq!(once.to_map(), replayed.to_map());
    }

    #[test]
    fn snapshot_round_trip() {
        let mut store = Store::new();
        store.apply(&insert(&[("a", "1"), ("b", "2")]));
        let exported = store.to_map();

        let restored = Store::from_map(exported.clone());
        assert_eq!(restored.to_map(), exported);
    }
}
