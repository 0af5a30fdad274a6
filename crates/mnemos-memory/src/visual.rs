//! Visual modality: *where* a memory is, as annotated image regions.

use mnemos_types::{VisualAnnotation, VisualRecord};

use crate::{MemoryError, MemoryManager};

/// `true` when `id` exists and carries at least one visual record.
pub fn has_visual(manager: &MemoryManager, id: &str) -> bool {
    manager.peek(id).is_some_and(|memory| memory.has_visual())
}

/// Editor for the visual modality.
pub struct VisualMemory<'a> {
    manager: &'a mut MemoryManager,
}

impl<'a> VisualMemory<'a> {
    pub fn new(manager: &'a mut MemoryManager) -> Self {
        Self { manager }
    }

    /// Attach an annotated region to the memory.
    ///
    /// A region with the same image id and the exact same bounding box as an
    /// existing record is ignored and reported as `Ok(false)`.
    pub fn add_visual(
        &mut self,
        id: &str,
        annotation: VisualAnnotation,
    ) -> Result<bool, MemoryError> {
        let Some(mut memory) = self.manager.peek(id).cloned() else {
            return Ok(false);
        };
        let duplicate = memory
            .visuals()
            .iter()
            .any(|v| v.image_id == annotation.image_id && v.bbox == annotation.bbox);
        if duplicate {
            return Ok(false);
        }

        memory.attach_visual(annotation);
        self.manager.save(&memory)?;
        Ok(true)
    }

    /// Visual records of the memory, optionally restricted to one image.
    pub fn get_visuals(&self, id: &str, image_id: Option<&str>) -> Vec<VisualRecord> {
        let Some(memory) = self.manager.peek(id) else {
            return Vec::new();
        };
        memory
            .visuals()
            .iter()
            .filter(|v| image_id.is_none_or(|wanted| v.image_id == wanted))
            .cloned()
            .collect()
    }

    /// Set the confidence of every record annotated on `image_id`.
    ///
    /// The value is clamped to `[0, 1]`. Returns `Ok(true)` when at least one
    /// record matched.
    pub fn update_confidence(
        &mut self,
        id: &str,
        image_id: &str,
        confidence: f64,
    ) -> Result<bool, MemoryError> {
        let Some(mut memory) = self.manager.peek(id).cloned() else {
            return Ok(false);
        };
        let mut changed = false;
        for record in memory.visuals_mut().iter_mut().filter(|v| v.image_id == image_id) {
            record.base.set_confidence(confidence);
            record.base.touch();
            changed = true;
        }

        if changed {
            self.manager.save(&memory)?;
        }
        Ok(changed)
    }

    pub fn has_visual(&self, id: &str) -> bool {
        has_visual(&*self.manager, id)
    }
}
