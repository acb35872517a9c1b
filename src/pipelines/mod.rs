//! Render pipeline definitions and the bind group layouts they expect.

pub mod light;
pub mod model;
