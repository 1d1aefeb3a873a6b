use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::entry::LogIndex;
use crate::error::Result;

/// A durable record of the state machine's contents as of a particular
/// applied index. Written after every `config.dump_interval` applied
/// entries (see [`crate::config::StateMachineConfig`]) and read back once,
/// at startup, to avoid replaying the log from its very first entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dump {
    pub applied_index: LogIndex,
    pub map: HashMap<String, String>,
}

/// Where a [`Dump`] is written and read from. Kept separate from the
/// in-memory [`crate::store::Store`] so the persistence backend can be
/// swapped (file, object store, embedded database) without touching
/// [`crate::core::StateCore`].
#[async_trait]
pub trait ValueStorage: Send + Sync + std::fmt::Debug {
    async fn load(&self) -> Result<Option<Dump>>;
    async fn store(&self, dump: &Dump) -> Result<()>;
}

/// A [`ValueStorage`] that keeps its most recent dump in a process-local
/// map. Loses its dump on restart; useful for tests and for single-process
/// deployments where durability is handled by the log itself.
#[derive(Debug, Default)]
pub struct InMemoryValueStorage {
    slot: DashMap<(), Dump>,
}

impl InMemoryValueStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ValueStorage for InMemoryValueStorage {
    async fn load(&self) -> Result<Option<Dump>> {
        Ok(self.slot.get(&()).map(|entry| entry.value().clone()))
    }

    async fn store(&self, dump: &Dump) -> Result<()> {
        self.slot.insert((), dump.clone());
        Ok(())
    }
}
