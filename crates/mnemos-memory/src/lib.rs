//! `mnemos-memory` – the memory store and retrieval engine.
//!
//! Keeps every [`MemoryObject`][mnemos_types::MemoryObject] in a RAM cache
//! backed by a local SQLite file, and ranks memories against free-text
//! queries.
//!
//! # Modules
//!
//! - [`store`] – [`MemoryStore`]: the durable tier. One row per memory, three
//!   JSON payloads plus indexed summary columns.
//! - [`manager`] – [`MemoryManager`]: the single source of truth. Owns the
//!   cache and the name index and keeps them in agreement with the store on
//!   every mutation.
//! - [`structured`], [`semantic`], [`visual`] – per-modality accessors built
//!   on the manager's public interface.
//! - [`signals`] – [`RetrievalSignals`]: the read predicates the ranking
//!   engine consumes, with the substring-based [`NaiveSignals`] default.
//! - [`merger`] – [`MemoryMerger`]: candidate generation, scoring, ranking
//!   and usage reinforcement.
//!
//! # Example
//!
//! ```rust
//! use mnemos_memory::{MemoryManager, MemoryMerger, RetrieveOptions};
//! use mnemos_memory::semantic::SemanticMemory;
//! use mnemos_memory::structured::{Definition, StructuredMemory};
//! use mnemos_types::{EntityType, NewMemory};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut manager = MemoryManager::open(dir.path().join("memory.db")).unwrap();
//!
//! let button = manager
//!     .create(NewMemory::new("Volume Button", EntityType::DeviceComponent))
//!     .unwrap();
//! let id = button.id().as_str();
//! StructuredMemory::new(&mut manager)
//!     .define(id, Definition::default().function("speaker on/off"))
//!     .unwrap();
//! SemanticMemory::new(&mut manager).add_text(id, "speaker on/off", None).unwrap();
//!
//! let hits = MemoryMerger::new()
//!     .retrieve(&mut manager, "speaker", RetrieveOptions::default())
//!     .unwrap();
//! assert_eq!(hits[0].memory.id(), button.id());
//! assert_eq!(hits[0].memory.usage_count(), 1);
//! ```

mod error;
pub mod manager;
pub mod merger;
pub mod semantic;
pub mod signals;
pub mod store;
pub mod structured;
pub mod visual;

pub use error::MemoryError;
pub use manager::MemoryManager;
pub use merger::{Explanation, MemoryMerger, RetrieveOptions, ScoreWeights, ScoredMemory};
pub use signals::{NaiveSignals, RetrievalSignals};
pub use store::MemoryStore;

/// Append `value` unless an identical entry is already present.
pub(crate) fn push_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|existing| existing == value) {
        false
    } else {
        list.push(value.to_string());
        true
    }
}
