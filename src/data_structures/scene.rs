//! Single-slot scene content.
//!
//! The viewer shows exactly one model at a time. Installing a new one
//! disposes the previous occupant first, so switching assets can never
//! accumulate stale geometry or leak its GPU buffers.

use crate::data_structures::model::Model;

#[derive(Debug, Default)]
pub struct Scene {
    model: Option<Model>,
}

impl Scene {
    pub fn new() -> Self {
        Self { model: None }
    }

    /// Replace the scene's content, disposing whatever was there.
    pub fn install(&mut self, model: Model) {
        if let Some(mut old) = self.model.take() {
            log::info!("replacing {} with {}", old.label, model.label);
            old.dispose();
        }
        self.model = Some(model);
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut Model> {
        self.model.as_mut()
    }

    /// Dispose the occupant, leaving the scene blank.
    pub fn clear(&mut self) {
        if let Some(mut model) = self.model.take() {
            model.dispose();
        }
    }
}
