//! [`MemoryManager`] – single source of truth for memory objects.
//!
//! The manager owns a RAM cache (`id → MemoryObject`) and a name index
//! (`lowercased name → [id]`) and keeps both in agreement with the
//! [`MemoryStore`] on every mutating call. Writes go to the durable store
//! first; the cache and index are only updated once the row is committed, so
//! a failed write leaves the cache as it was.
//!
//! # Counted and uncounted reads
//!
//! [`get`](MemoryManager::get) and [`find_by_name`](MemoryManager::find_by_name)
//! count as a use of the memory: they bump `usage_count`, refresh
//! `last_accessed_at` and persist the change. [`peek`](MemoryManager::peek)
//! is a plain borrow used by the modality accessors and ranking predicates,
//! which must not inflate usage.
//!
//! # Threading
//!
//! The cache is an ordinary unsynchronized map and every mutation needs
//! `&mut self`. Share a manager across threads only behind an external lock.

use std::collections::HashMap;
use std::path::Path;

use mnemos_types::{MemoryId, MemoryObject, NewMemory};
use tracing::{debug, info};

use crate::{MemoryError, MemoryStore};

fn index_key(name: &str) -> String {
    name.to_lowercase()
}

/// Cache + name index over a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryManager {
    store: MemoryStore,
    memories: HashMap<MemoryId, MemoryObject>,
    /// Registration order; drives `list_all` and candidate order.
    order: Vec<MemoryId>,
    name_index: HashMap<String, Vec<MemoryId>>,
}

impl MemoryManager {
    /// Open the store at `location`, creating the schema if needed, and
    /// rebuild the cache and name index from every stored row.
    ///
    /// A row that fails to decode aborts startup with
    /// [`MemoryError::CorruptRow`].
    pub fn open(location: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let store = MemoryStore::open(location)?;
        let mut manager = Self {
            store,
            memories: HashMap::new(),
            order: Vec::new(),
            name_index: HashMap::new(),
        };
        for memory in manager.store.load_all()? {
            manager.register(memory);
        }
        info!(
            path = %manager.store.path().display(),
            count = manager.len(),
            "memory cache rebuilt from store"
        );
        Ok(manager)
    }

    pub fn location(&self) -> &Path {
        self.store.path()
    }

    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.memories.contains_key(id)
    }

    /// Create and persist a new memory with a fresh identity.
    pub fn create(&mut self, new: NewMemory) -> Result<MemoryObject, MemoryError> {
        let mut memory = MemoryObject::create(new.clone());
        while self.memories.contains_key(memory.id()) {
            memory = MemoryObject::create(new.clone());
        }
        self.store.upsert(&memory)?;
        self.register(memory.clone());
        info!(id = %memory.id(), name = %memory.structured.name, "memory created");
        Ok(memory)
    }

    /// Fetch a memory and count it as used.
    ///
    /// Returns `Ok(None)` for an unknown id. On success the usage counter is
    /// incremented, `last_accessed_at` refreshed and the row rewritten.
    pub fn get(&mut self, id: &str) -> Result<Option<MemoryObject>, MemoryError> {
        let Some(cached) = self.memories.get(id) else {
            return Ok(None);
        };
        let mut memory = cached.clone();
        memory.record_use();
        self.store.upsert(&memory)?;
        debug!(id = %memory.id(), usage = memory.usage_count(), "memory accessed");
        self.memories.insert(memory.id().clone(), memory.clone());
        Ok(Some(memory))
    }

    /// Borrow a cached memory without counting a use.
    pub fn peek(&self, id: &str) -> Option<&MemoryObject> {
        self.memories.get(id)
    }

    /// Persist `memory` and make it the cached copy.
    ///
    /// Unknown memories are registered; a changed name moves the index entry.
    /// Usage is owned by the manager: the saved copy keeps the cached count
    /// and access time when those are newer than the caller's.
    pub fn save(&mut self, memory: &MemoryObject) -> Result<(), MemoryError> {
        let mut memory = memory.clone();
        let previous_key = self.memories.get(memory.id()).map(|cached| {
            memory.merge_usage_from(cached);
            index_key(&cached.structured.name)
        });
        self.store.upsert(&memory)?;

        let id = memory.id().clone();
        match previous_key {
            None => self.register(memory),
            Some(old_key) => {
                let new_key = index_key(&memory.structured.name);
                if old_key != new_key {
                    self.unindex(&old_key, &id);
                    self.name_index.entry(new_key).or_default().push(id.clone());
                }
                self.memories.insert(id.clone(), memory);
            }
        }
        debug!(id = %id, "memory saved");
        Ok(())
    }

    /// Case-insensitive name lookup. Every match is fetched through
    /// [`get`](MemoryManager::get) and therefore counted as a use.
    pub fn find_by_name(&mut self, name: &str) -> Result<Vec<MemoryObject>, MemoryError> {
        let ids = self
            .name_index
            .get(&index_key(name))
            .cloned()
            .unwrap_or_default();
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(memory) = self.get(id.as_str())? {
                found.push(memory);
            }
        }
        Ok(found)
    }

    /// Remove a memory from the store, the cache and the name index.
    ///
    /// Returns `Ok(false)` when the id is unknown. Name buckets left empty are
    /// dropped from the index.
    pub fn delete(&mut self, id: &str) -> Result<bool, MemoryError> {
        if !self.memories.contains_key(id) {
            return Ok(false);
        }
        self.store.delete(id)?;

        let Some(memory) = self.memories.remove(id) else {
            return Ok(false);
        };
        self.order.retain(|known| known.as_str() != id);
        self.unindex(&index_key(&memory.structured.name), memory.id());
        info!(id = %memory.id(), name = %memory.structured.name, "memory deleted");
        Ok(true)
    }

    /// Snapshot of every cached memory, in registration order.
    ///
    /// Reflects the cache only; the durable store is never re-read.
    pub fn list_all(&self) -> Vec<MemoryObject> {
        self.iter().cloned().collect()
    }

    /// Iterate cached memories in registration order without cloning.
    pub fn iter(&self) -> impl Iterator<Item = &MemoryObject> {
        self.order.iter().filter_map(|id| self.memories.get(id))
    }

    fn register(&mut self, memory: MemoryObject) {
        let id = memory.id().clone();
        self.name_index
            .entry(index_key(&memory.structured.name))
            .or_default()
            .push(id.clone());
        self.order.push(id.clone());
        self.memories.insert(id, memory);
    }

    fn unindex(&mut self, key: &str, id: &MemoryId) {
        if let Some(bucket) = self.name_index.get_mut(key) {
            bucket.retain(|known| known != id);
            if bucket.is_empty() {
                self.name_index.remove(key);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
