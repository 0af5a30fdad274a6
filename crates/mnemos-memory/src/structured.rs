//! Structured modality: *what* a memory is and how it is used.
//!
//! [`StructuredMemory`] edits the structured record of existing memories
//! through [`MemoryManager::peek`] and [`MemoryManager::save`] only. The
//! completeness predicate is also available as the free function
//! [`is_well_defined`] for callers that hold a shared borrow of the manager.

use mnemos_types::{EntityType, MemoryId, MemoryObject, Metadata};
use serde::Serialize;

use crate::{MemoryError, MemoryManager, push_unique};

/// Field updates for [`StructuredMemory::define`]. `None` leaves a field as
/// it is; metadata entries are merged into the existing map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Definition {
    pub function: Option<String>,
    pub description: Option<String>,
    pub metadata: Metadata,
    pub confidence: Option<f64>,
}

impl Definition {
    pub fn function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn metadata_entry(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Flattened, read-only view of a structured record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefinitionView {
    pub id: MemoryId,
    pub name: String,
    pub entity_type: EntityType,
    pub function: String,
    pub description: String,
    pub aliases: Vec<String>,
    pub constraints: Vec<String>,
    pub device: Option<String>,
    pub domain: Option<String>,
    pub metadata: Metadata,
    pub confidence: f64,
}

/// `true` when the memory has both a name and a function.
pub fn is_complete(memory: &MemoryObject) -> bool {
    !memory.structured.name.is_empty() && !memory.structured.function.is_empty()
}

/// `true` when `id` exists and [`is_complete`]. Never counts a use.
pub fn is_well_defined(manager: &MemoryManager, id: &str) -> bool {
    manager.peek(id).is_some_and(is_complete)
}

/// Editor for the structured modality.
pub struct StructuredMemory<'a> {
    manager: &'a mut MemoryManager,
}

impl<'a> StructuredMemory<'a> {
    pub fn new(manager: &'a mut MemoryManager) -> Self {
        Self { manager }
    }

    /// Apply `definition` to the memory's structured record.
    ///
    /// Returns `Ok(true)` when at least one field changed; the record is then
    /// touched and persisted. Unknown ids return `Ok(false)`. Confidence is
    /// clamped to `[0, 1]`.
    pub fn define(&mut self, id: &str, definition: Definition) -> Result<bool, MemoryError> {
        let Some(mut memory) = self.manager.peek(id).cloned() else {
            return Ok(false);
        };
        let record = &mut memory.structured;
        let mut changed = false;

        if let Some(function) = definition.function
            && record.function != function
        {
            record.function = function;
            changed = true;
        }
        if let Some(description) = definition.description
            && record.description != description
        {
            record.description = description;
            changed = true;
        }
        if let Some(confidence) = definition.confidence {
            let before = record.base.confidence();
            record.base.set_confidence(confidence);
            changed |= record.base.confidence() != before;
        }
        for (key, value) in definition.metadata {
            if record.metadata.get(&key) != Some(&value) {
                record.metadata.insert(key, value);
                changed = true;
            }
        }

        if changed {
            record.base.touch();
            self.manager.save(&memory)?;
        }
        Ok(changed)
    }

    /// Append aliases and constraints that are not present yet.
    ///
    /// Returns `Ok(true)` when anything was appended.
    pub fn add_requirements(
        &mut self,
        id: &str,
        aliases: &[&str],
        constraints: &[&str],
    ) -> Result<bool, MemoryError> {
        let Some(mut memory) = self.manager.peek(id).cloned() else {
            return Ok(false);
        };
        let record = &mut memory.structured;
        let mut changed = false;
        for alias in aliases {
            changed |= push_unique(&mut record.aliases, alias);
        }
        for constraint in constraints {
            changed |= push_unique(&mut record.constraints, constraint);
        }

        if changed {
            record.base.touch();
            self.manager.save(&memory)?;
        }
        Ok(changed)
    }

    pub fn get_definition(&self, id: &str) -> Option<DefinitionView> {
        let memory = self.manager.peek(id)?;
        let s = &memory.structured;
        Some(DefinitionView {
            id: memory.id().clone(),
            name: s.name.clone(),
            entity_type: s.entity_type,
            function: s.function.clone(),
            description: s.description.clone(),
            aliases: s.aliases.clone(),
            constraints: s.constraints.clone(),
            device: s.device.clone(),
            domain: s.domain.clone(),
            metadata: s.metadata.clone(),
            confidence: s.base.confidence(),
        })
    }

    pub fn is_well_defined(&self, id: &str) -> bool {
        is_well_defined(&*self.manager, id)
    }

    /// Keep only the memories that are complete.
    pub fn filter_well_defined(&self, memories: Vec<MemoryObject>) -> Vec<MemoryObject> {
        memories.into_iter().filter(is_complete).collect()
    }
}
