//! [`MemoryMerger`] – ranks memories against a free-text query.
//!
//! Retrieval runs in four steps:
//!
//! 1. **Candidates** – ids from [`RetrievalSignals::search`]. No candidates
//!    means no scoring and no reinforcement.
//! 2. **Scoring** – a base score adjusted by structural completeness, visual
//!    evidence and prior usage (see [`ScoreWeights`]).
//! 3. **Ranking** – stable sort by score, highest first. Equal scores keep
//!    candidate order.
//! 4. **Reinforcement** – only the `top_k` survivors count one use, through
//!    [`MemoryManager::get`].
//!
//! [`MemoryMerger::explain`] reports the inputs to step 2 without mutating
//! anything.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use mnemos_types::{MemoryId, MemoryObject};
use serde::Serialize;
use tracing::debug;

use crate::signals::{NaiveSignals, RetrievalSignals};
use crate::{MemoryError, MemoryManager};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Score adjustments applied to every candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    /// Starting score of every candidate.
    pub base: f64,
    pub well_defined_bonus: f64,
    /// Subtracted when the memory lacks a name or a function.
    pub incomplete_penalty: f64,
    /// Added when a visual is required and present.
    pub visual_match_bonus: f64,
    /// Added when a visual is present but not required.
    pub visual_presence_bonus: f64,
    /// Bonus per counted use, capped at `usage_cap`.
    pub usage_step: f64,
    pub usage_cap: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            base: 0.5,
            well_defined_bonus: 0.2,
            incomplete_penalty: 0.3,
            visual_match_bonus: 0.2,
            visual_presence_bonus: 0.05,
            usage_step: 0.01,
            usage_cap: 0.1,
        }
    }
}

/// Per-call retrieval options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrieveOptions {
    /// Drop candidates without any visual record.
    pub require_visual: bool,
    pub top_k: usize,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            require_visual: false,
            top_k: 5,
        }
    }
}

impl RetrieveOptions {
    pub fn require_visual(mut self, require_visual: bool) -> Self {
        self.require_visual = require_visual;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────────────────

/// A retrieved memory and the score it was ranked by.
///
/// `memory` already reflects the use counted by the retrieval; `score` was
/// computed before it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMemory {
    pub memory: MemoryObject,
    pub score: f64,
}

/// Why a candidate scored the way it did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub id: MemoryId,
    pub name: String,
    pub usage_count: u64,
    pub has_visual: bool,
    pub is_complete: bool,
    /// Last update of the structured record.
    #[serde(with = "mnemos_types::timestamp")]
    pub last_updated: DateTime<Utc>,
    /// Informational; computed as if no visual were required.
    pub score: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryMerger
// ─────────────────────────────────────────────────────────────────────────────

/// Stateless ranking engine over a [`MemoryManager`].
#[derive(Debug, Clone, Default)]
pub struct MemoryMerger<S = NaiveSignals> {
    signals: S,
    weights: ScoreWeights,
}

impl MemoryMerger<NaiveSignals> {
    /// Merger with the substring signals and default weights.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: RetrievalSignals> MemoryMerger<S> {
    pub fn with_signals(signals: S) -> Self {
        Self {
            signals,
            weights: ScoreWeights::default(),
        }
    }

    /// Replace the score weights.
    pub fn weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Score one memory, or `None` when it is unknown or dropped by the
    /// visual requirement. Never counts a use.
    pub fn score(&self, manager: &MemoryManager, id: &str, require_visual: bool) -> Option<f64> {
        let memory = manager.peek(id)?;
        let w = &self.weights;
        let mut score = w.base;

        if self.signals.is_well_defined(manager, id) {
            score += w.well_defined_bonus;
        } else {
            score -= w.incomplete_penalty;
        }

        let has_visual = self.signals.has_visual(manager, id);
        if require_visual {
            if !has_visual {
                return None;
            }
            score += w.visual_match_bonus;
        } else if has_visual {
            score += w.visual_presence_bonus;
        }

        score += (memory.usage_count() as f64 * w.usage_step).min(w.usage_cap);
        Some(score)
    }

    /// Rank memories for `query` and count one use for each returned memory.
    pub fn retrieve(
        &self,
        manager: &mut MemoryManager,
        query: &str,
        options: RetrieveOptions,
    ) -> Result<Vec<ScoredMemory>, MemoryError> {
        let candidates = self.candidates(manager, query);
        if candidates.is_empty() {
            debug!(query, "retrieve: no candidates");
            return Ok(Vec::new());
        }

        let mut scored: Vec<(MemoryId, f64)> = candidates
            .iter()
            .filter_map(|id| {
                self.score(manager, id.as_str(), options.require_visual)
                    .map(|score| (id.clone(), score))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(options.top_k);

        let mut results = Vec::with_capacity(scored.len());
        for (id, score) in scored {
            if let Some(memory) = manager.get(id.as_str())? {
                results.push(ScoredMemory { memory, score });
            }
        }

        debug!(
            query,
            candidates = candidates.len(),
            survivors = results.len(),
            require_visual = options.require_visual,
            top_k = options.top_k,
            "retrieve complete"
        );
        Ok(results)
    }

    /// Report every raw candidate for `query` without ranking it or counting
    /// a use.
    pub fn explain(&self, manager: &MemoryManager, query: &str) -> Vec<Explanation> {
        self.candidates(manager, query)
            .into_iter()
            .filter_map(|id| {
                let memory = manager.peek(id.as_str())?;
                Some(Explanation {
                    name: memory.structured.name.clone(),
                    usage_count: memory.usage_count(),
                    has_visual: self.signals.has_visual(manager, id.as_str()),
                    is_complete: self.signals.is_well_defined(manager, id.as_str()),
                    last_updated: memory.structured.base.updated_at,
                    score: self.score(manager, id.as_str(), false)?,
                    id,
                })
            })
            .collect()
    }

    /// Signal candidates with duplicates removed, first occurrence wins.
    fn candidates(&self, manager: &MemoryManager, query: &str) -> Vec<MemoryId> {
        let mut seen = HashSet::new();
        self.signals
            .search(manager, query)
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::SemanticMemory;
    use crate::structured::{Definition, StructuredMemory};
    use crate::visual::VisualMemory;
    use mnemos_types::{BoundingBox, EntityType, NewMemory, VisualAnnotation};
    use tempfile::TempDir;

    fn open() -> (TempDir, MemoryManager) {
        let dir = tempfile::tempdir().unwrap();
        let manager = MemoryManager::open(dir.path().join("memory.db")).unwrap();
        (dir, manager)
    }

    fn memory(manager: &mut MemoryManager, name: &str, text: &str) -> MemoryId {
        let id = manager
            .create(NewMemory::new(name, EntityType::DeviceComponent))
            .unwrap()
            .id()
            .clone();
        SemanticMemory::new(manager)
            .add_text(id.as_str(), text, None)
            .unwrap();
        id
    }

    fn define(manager: &mut MemoryManager, id: &MemoryId, function: &str) {
        StructuredMemory::new(manager)
            .define(id.as_str(), Definition::default().function(function))
            .unwrap();
    }

    fn attach_visual(manager: &mut MemoryManager, id: &MemoryId) {
        VisualMemory::new(manager)
            .add_visual(
                id.as_str(),
                VisualAnnotation::new("panel.jpg", BoundingBox::new(0.1, 0.1, 0.2, 0.2)),
            )
            .unwrap();
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn complete_visual_memory_outranks_incomplete_one() {
        let (_dir, mut manager) = open();
        let b = memory(&mut manager, "B", "speaker grille");
        let a = memory(&mut manager, "A", "speaker button");
        define(&mut manager, &a, "speaker on/off");
        attach_visual(&mut manager, &a);

        let hits = MemoryMerger::new()
            .retrieve(&mut manager, "speaker", RetrieveOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].memory.id(), &a);
        assert!(approx(hits[0].score, 0.75));
        assert_eq!(hits[1].memory.id(), &b);
        assert!(approx(hits[1].score, 0.2));
    }

    #[test]
    fn require_visual_drops_memories_without_visuals() {
        let (_dir, mut manager) = open();
        let plain = memory(&mut manager, "Plain", "speaker");
        let pictured = memory(&mut manager, "Pictured", "speaker");
        attach_visual(&mut manager, &pictured);

        let hits = MemoryMerger::new()
            .retrieve(
                &mut manager,
                "speaker",
                RetrieveOptions::default().require_visual(true),
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory.id(), &pictured);
        assert!(approx(hits[0].score, 0.5 - 0.3 + 0.2));
        assert_eq!(manager.peek(plain.as_str()).unwrap().usage_count(), 0);
    }

    #[test]
    fn top_k_bounds_results_and_reinforcement() {
        let (_dir, mut manager) = open();
        let ids: Vec<_> = (0..4)
            .map(|i| memory(&mut manager, &format!("m{i}"), "speaker"))
            .collect();

        let hits = MemoryMerger::new()
            .retrieve(&mut manager, "speaker", RetrieveOptions::default().top_k(2))
            .unwrap();
        assert_eq!(hits.len(), 2);

        let reinforced: Vec<u64> = ids
            .iter()
            .map(|id| manager.peek(id.as_str()).unwrap().usage_count())
            .collect();
        assert_eq!(reinforced, vec![1, 1, 0, 0]);
        assert!(hits.iter().all(|hit| hit.memory.usage_count() == 1));
    }

    #[test]
    fn top_k_larger_than_candidates_returns_all() {
        let (_dir, mut manager) = open();
        memory(&mut manager, "one", "speaker");
        let hits = MemoryMerger::new()
            .retrieve(&mut manager, "speaker", RetrieveOptions::default().top_k(10))
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn top_k_zero_returns_nothing() {
        let (_dir, mut manager) = open();
        let id = memory(&mut manager, "one", "speaker");
        let hits = MemoryMerger::new()
            .retrieve(&mut manager, "speaker", RetrieveOptions::default().top_k(0))
            .unwrap();
        assert!(hits.is_empty());
        assert_eq!(manager.peek(id.as_str()).unwrap().usage_count(), 0);
    }

    #[test]
    fn no_candidates_returns_empty() {
        let (_dir, mut manager) = open();
        memory(&mut manager, "one", "speaker");
        let hits = MemoryMerger::new()
            .retrieve(&mut manager, "toaster", RetrieveOptions::default())
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn reinforcement_is_persisted_and_raises_later_scores() {
        let (dir, mut manager) = open();
        let id = memory(&mut manager, "one", "speaker");
        let merger = MemoryMerger::new();
        for _ in 0..3 {
            merger
                .retrieve(&mut manager, "speaker", RetrieveOptions::default())
                .unwrap();
        }

        let mut reopened = MemoryManager::open(dir.path().join("memory.db")).unwrap();
        assert_eq!(reopened.peek(id.as_str()).unwrap().usage_count(), 3);
        let hits = merger
            .retrieve(&mut reopened, "speaker", RetrieveOptions::default())
            .unwrap();
        assert!(approx(hits[0].score, 0.2 + 0.03));
        assert_eq!(hits[0].memory.usage_count(), 4);
    }

    #[test]
    fn usage_bonus_is_capped() {
        let (_dir, mut manager) = open();
        let id = memory(&mut manager, "one", "speaker");
        for _ in 0..25 {
            manager.get(id.as_str()).unwrap();
        }
        let score = MemoryMerger::new().score(&manager, id.as_str(), false).unwrap();
        assert!(approx(score, 0.2 + 0.1));
    }

    #[test]
    fn ties_keep_candidate_order() {
        let (_dir, mut manager) = open();
        let first = memory(&mut manager, "first", "speaker");
        let second = memory(&mut manager, "second", "speaker");
        let third = memory(&mut manager, "third", "speaker");

        let hits = MemoryMerger::new()
            .retrieve(&mut manager, "speaker", RetrieveOptions::default())
            .unwrap();
        let order: Vec<_> = hits.iter().map(|hit| hit.memory.id().clone()).collect();
        assert_eq!(order, vec![first, second, third]);
    }

    #[test]
    fn explain_reports_without_mutating() {
        let (_dir, mut manager) = open();
        let id = memory(&mut manager, "Volume Button", "speaker on/off");
        define(&mut manager, &id, "speaker on/off");

        let merger = MemoryMerger::new();
        let report = merger.explain(&manager, "speaker");
        assert_eq!(report.len(), 1);
        let entry = &report[0];
        assert_eq!(entry.id, id);
        assert_eq!(entry.name, "Volume Button");
        assert!(entry.is_complete);
        assert!(!entry.has_visual);
        assert_eq!(entry.usage_count, 0);
        assert!(approx(entry.score, 0.7));

        merger.explain(&manager, "speaker");
        assert_eq!(manager.peek(id.as_str()).unwrap().usage_count(), 0);

        let json = serde_json::to_value(entry).unwrap();
        assert_eq!(json["is_complete"], true);
        assert!(json["last_updated"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn volume_button_scenario() {
        let (_dir, mut manager) = open();
        let id = manager
            .create(NewMemory::new("Volume Button", EntityType::DeviceComponent))
            .unwrap()
            .id()
            .clone();
        define(&mut manager, &id, "speaker on/off");
        SemanticMemory::new(&mut manager)
            .add_texts(id.as_str(), &["스피커 버튼", "speaker on/off"], None)
            .unwrap();

        let merger = MemoryMerger::new();
        let report = merger.explain(&manager, "speaker");
        assert!(report[0].is_complete);
        assert!(!report[0].has_visual);

        let hits = merger
            .retrieve(&mut manager, "speaker", RetrieveOptions::default())
            .unwrap();
        let hit = hits.iter().find(|hit| hit.memory.id() == &id).unwrap();
        assert!(approx(hit.score, 0.7));
        assert_eq!(hit.memory.usage_count(), 1);

        let hits = merger
            .retrieve(&mut manager, "스피커", RetrieveOptions::default())
            .unwrap();
        assert!(approx(hits[0].score, 0.71));
    }

    #[test]
    fn custom_signals_drive_candidate_generation() {
        struct Named(&'static str);

        impl RetrievalSignals for Named {
            fn search(&self, manager: &MemoryManager, _query: &str) -> Vec<MemoryId> {
                manager
                    .iter()
                    .filter(|m| m.structured.name == self.0)
                    .map(|m| m.id().clone())
                    .chain(manager.iter().map(|m| m.id().clone()))
                    .collect()
            }

            fn is_well_defined(&self, _manager: &MemoryManager, _id: &str) -> bool {
                true
            }

            fn has_visual(&self, _manager: &MemoryManager, _id: &str) -> bool {
                false
            }
        }

        let (_dir, mut manager) = open();
        memory(&mut manager, "other", "x");
        let target = memory(&mut manager, "target", "y");

        let merger = MemoryMerger::with_signals(Named("target"));
        assert_eq!(merger.explain(&manager, "anything").len(), 2);
        let hits = merger
            .retrieve(&mut manager, "anything", RetrieveOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].memory.id(), &target);
        assert!(approx(hits[0].score, 0.7));
    }

    #[test]
    fn custom_weights_change_scores() {
        let (_dir, mut manager) = open();
        let id = memory(&mut manager, "one", "speaker");
        let merger = MemoryMerger::new().weights(ScoreWeights {
            base: 1.0,
            incomplete_penalty: 0.0,
            ..ScoreWeights::default()
        });
        assert!(approx(merger.score(&manager, id.as_str(), false).unwrap(), 1.0));
        assert!(merger.score(&manager, id.as_str(), true).is_none());
        assert!(merger.score(&manager, "mem_unknown", false).is_none());
    }
}
