//! Read predicates consumed by the ranking engine.
//!
//! [`MemoryMerger`](crate::MemoryMerger) never reaches into the modality
//! accessors directly; it asks a [`RetrievalSignals`] implementation. Swap
//! [`NaiveSignals`] for a similarity-backed implementation to change how
//! candidates are generated without touching the scoring rules.

use mnemos_types::MemoryId;

use crate::{MemoryManager, semantic, structured, visual};

/// Candidate generation and per-memory predicates used for scoring.
///
/// Implementations must not count uses: the merger reinforces survivors
/// itself after ranking.
pub trait RetrievalSignals {
    /// Ids of the memories relevant to `query`, in a stable order.
    fn search(&self, manager: &MemoryManager, query: &str) -> Vec<MemoryId>;

    fn is_well_defined(&self, manager: &MemoryManager, id: &str) -> bool;

    fn has_visual(&self, manager: &MemoryManager, id: &str) -> bool;
}

/// Substring search over semantic texts plus the structured and visual
/// predicates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveSignals;

impl RetrievalSignals for NaiveSignals {
    fn search(&self, manager: &MemoryManager, query: &str) -> Vec<MemoryId> {
        semantic::naive_search(manager, query)
            .into_iter()
            .map(|memory| memory.id().clone())
            .collect()
    }

    fn is_well_defined(&self, manager: &MemoryManager, id: &str) -> bool {
        structured::is_well_defined(manager, id)
    }

    fn has_visual(&self, manager: &MemoryManager, id: &str) -> bool {
        visual::has_visual(manager, id)
    }
}
