//! decal-studio
//!
//! A lightweight, cross-platform product viewer core for 3D customizers,
//! focused on native and WASM compatibility. It boots a GPU context,
//! loads product models asynchronously, frames them in front of an orbit
//! camera and lets the user stamp a decal and tint onto the customizable
//! mesh, with deterministic GPU resource cleanup on teardown.
//!
//! High-level modules
//! - `camera`: orbit camera, controller, framing and uniforms for view/projection
//! - `context`: central GPU and window context that owns device/queue/pipeline
//! - `customize`: material mutation semantics (decal and tint, apply and clear)
//! - `data_structures`: viewer data models (meshes, materials, bounds, scene)
//! - `pipelines`: the render pipeline and light resources
//! - `resources`: model decoding and upload, asset IO
//! - `session`: the sign-in gate in front of the stage
//! - `viewer`: window, event loop, async loading and the render loop
//!

pub mod camera;
pub mod context;
pub mod customize;
pub mod data_structures;
pub mod pipelines;
pub mod resources;
pub mod session;
pub mod viewer;

// Re-exports commonly used types for convenience in downstream code.
pub use winit::dpi::PhysicalPosition;
pub use cgmath::*;
pub use winit::event::DeviceEvent;
pub use winit::event::WindowEvent;
pub use wgpu::*;
