//! Viewer data structures: models, textures, bounds, and the scene slot.
//!
//! This module contains the core data types for scene representation:
//!
//! - `model` contains mesh and material definitions, GPU resources for 3D models
//! - `texture` contains GPU texture wrapper and creation utilities
//! - `bounds` is the axis-aligned bounding box used for camera framing
//! - `scene` holds the single-slot owner of the currently loaded model

pub mod bounds;
pub mod model;
pub mod scene;
pub mod texture;
