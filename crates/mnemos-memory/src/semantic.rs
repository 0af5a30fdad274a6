//! Semantic modality: the phrases people use for a memory.
//!
//! Texts are kept in insertion order and appended only when no identical
//! text is present. [`naive_search`] is the substring baseline used for
//! candidate generation until a similarity search replaces it.

use mnemos_types::MemoryObject;

use crate::{MemoryError, MemoryManager, push_unique};

/// Memories whose texts contain `query`, compared case-insensitively, in
/// manager registration order. Never counts a use.
pub fn naive_search<'m>(manager: &'m MemoryManager, query: &str) -> Vec<&'m MemoryObject> {
    let needle = query.to_lowercase();
    manager
        .iter()
        .filter(|memory| {
            memory
                .semantic
                .texts
                .iter()
                .any(|text| text.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Editor for the semantic modality.
pub struct SemanticMemory<'a> {
    manager: &'a mut MemoryManager,
}

impl<'a> SemanticMemory<'a> {
    pub fn new(manager: &'a mut MemoryManager) -> Self {
        Self { manager }
    }

    /// Append one expression. See [`add_texts`](SemanticMemory::add_texts).
    pub fn add_text(
        &mut self,
        id: &str,
        text: &str,
        language_hint: Option<&str>,
    ) -> Result<bool, MemoryError> {
        self.add_texts(id, &[text], language_hint)
    }

    /// Append expressions (and a language hint) that are not present yet.
    ///
    /// Returns `Ok(true)` when anything was appended; unknown ids and exact
    /// duplicates return `Ok(false)` without touching storage.
    pub fn add_texts(
        &mut self,
        id: &str,
        texts: &[&str],
        language_hint: Option<&str>,
    ) -> Result<bool, MemoryError> {
        let Some(mut memory) = self.manager.peek(id).cloned() else {
            return Ok(false);
        };
        let record = &mut memory.semantic;
        let mut changed = false;
        for text in texts {
            changed |= push_unique(&mut record.texts, text);
        }
        if let Some(hint) = language_hint {
            changed |= push_unique(&mut record.language_hints, hint);
        }

        if changed {
            record.base.touch();
            self.manager.save(&memory)?;
        }
        Ok(changed)
    }

    /// Stored expressions in insertion order; empty for unknown ids.
    pub fn get_texts(&self, id: &str) -> Vec<String> {
        self.manager
            .peek(id)
            .map(|memory| memory.semantic.texts.clone())
            .unwrap_or_default()
    }

    pub fn naive_search(&self, query: &str) -> Vec<MemoryObject> {
        naive_search(self.manager, query).into_iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemos_types::{EntityType, MemoryId, NewMemory};
    use tempfile::TempDir;

    fn setup() -> (TempDir, MemoryManager, MemoryId) {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = MemoryManager::open(dir.path().join("memory.db")).unwrap();
        let id = manager
            .create(NewMemory::new("Volume Button", EntityType::DeviceComponent))
            .unwrap()
            .id()
            .clone();
        (dir, manager, id)
    }

    #[test]
    fn add_text_appends_in_order() {
        let (_dir, mut manager, id) = setup();
        let mut semantic = SemanticMemory::new(&mut manager);
        assert!(semantic.add_text(id.as_str(), "스피커 버튼", Some("ko")).unwrap());
        assert!(semantic.add_text(id.as_str(), "speaker on/off", Some("en")).unwrap());
        assert_eq!(semantic.get_texts(id.as_str()), vec!["스피커 버튼", "speaker on/off"]);
        assert_eq!(
            manager.peek(id.as_str()).unwrap().semantic.language_hints,
            vec!["ko", "en"]
        );
    }

    #[test]
    fn add_text_is_idempotent() {
        let (dir, mut manager, id) = setup();
        let mut semantic = SemanticMemory::new(&mut manager);
        assert!(semantic.add_text(id.as_str(), "speaker on/off", None).unwrap());
        assert!(!semantic.add_text(id.as_str(), "speaker on/off", None).unwrap());
        assert_eq!(semantic.get_texts(id.as_str()).len(), 1);

        let reopened = MemoryManager::open(dir.path().join("memory.db")).unwrap();
        assert_eq!(reopened.peek(id.as_str()).unwrap().semantic.texts.len(), 1);
    }

    #[test]
    fn add_texts_reports_change_for_new_hint_only() {
        let (_dir, mut manager, id) = setup();
        let mut semantic = SemanticMemory::new(&mut manager);
        semantic.add_texts(id.as_str(), &["a", "b"], None).unwrap();
        assert!(!semantic.add_texts(id.as_str(), &["a", "b"], None).unwrap());
        assert!(semantic.add_texts(id.as_str(), &["a"], Some("en")).unwrap());
        assert!(!semantic.add_texts(id.as_str(), &["b"], Some("en")).unwrap());
    }

    #[test]
    fn unknown_id_is_not_an_error() {
        let (_dir, mut manager, _id) = setup();
        let mut semantic = SemanticMemory::new(&mut manager);
        assert!(!semantic.add_text("mem_unknown", "x", None).unwrap());
        assert!(semantic.get_texts("mem_unknown").is_empty());
    }

    #[test]
    fn naive_search_is_case_insensitive_substring() {
        let (_dir, mut manager, id) = setup();
        let other = manager
            .create(NewMemory::new("Power", EntityType::DeviceComponent))
            .unwrap();
        let mut semantic = SemanticMemory::new(&mut manager);
        semantic.add_text(id.as_str(), "Speaker ON/OFF", None).unwrap();
        semantic.add_text(other.id().as_str(), "power switch", None).unwrap();

        let hits = semantic.naive_search("speaker");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id(), &id);
        assert!(semantic.naive_search("SWITCH")[0].id() == other.id());
        assert!(semantic.naive_search("toaster").is_empty());
    }

    #[test]
    fn naive_search_does_not_count_usage() {
        let (_dir, mut manager, id) = setup();
        SemanticMemory::new(&mut manager)
            .add_text(id.as_str(), "speaker", None)
            .unwrap();
        assert_eq!(naive_search(&manager, "speak").len(), 1);
        assert_eq!(manager.peek(id.as_str()).unwrap().usage_count(), 0);
    }
}
