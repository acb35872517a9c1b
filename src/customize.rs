//! Material mutation: decal and tint edits against the active mesh.
//!
//! The viewer keeps the active mesh as an explicit `Option<usize>` into the
//! loaded model's mesh list and passes it into every operation here; with
//! nothing loaded (or an asset with no named meshes) every operation is a
//! silent no-op. The two clears are deliberately asymmetric: clearing the
//! decal touches only the active material, while clearing the tint resets
//! every mesh that shares the active mesh's parent node.

use crate::{
    data_structures::{
        model::{Customizable, Model, DEFAULT_TINT},
        texture::Texture,
    },
    resources::ROOT_NODE,
};

/// Index of the first named mesh in traversal order, the one that becomes
/// the active customization target after a load.
pub fn first_named<T: Customizable>(meshes: &[T]) -> Option<usize> {
    meshes.iter().position(|mesh| !mesh.name().is_empty())
}

/// Indices of every mesh reachable from the active mesh's parent node:
/// the set a tint reset propagates to. Empty when nothing is active.
pub fn clear_tint_scope<T: Customizable>(meshes: &[T], active: Option<usize>) -> Vec<usize> {
    let Some(active) = active else {
        return Vec::new();
    };
    let Some(mesh) = meshes.get(active) else {
        return Vec::new();
    };
    let parent = mesh.lineage().last().copied().unwrap_or(ROOT_NODE);
    meshes
        .iter()
        .enumerate()
        .filter(|(_, m)| m.lineage().contains(&parent))
        .map(|(idx, _)| idx)
        .collect()
}

/// Bind a freshly decoded decal to the active material.
pub fn apply_decal(
    model: &mut Model,
    active: Option<usize>,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    decal: Texture,
) {
    let Some(material) = active_material(model, active) else {
        log::debug!("decal ignored, nothing to customize");
        return;
    };
    material.set_decal(device, queue, layout, decal);
}

/// Remove the active material's decal. Only the active material is
/// touched, unlike [`clear_tint`].
pub fn clear_decal(
    model: &mut Model,
    active: Option<usize>,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    fallback: &Texture,
) {
    let Some(material) = active_material(model, active) else {
        return;
    };
    material.clear_decal(device, queue, layout, fallback);
}

/// Tint the active material.
pub fn apply_tint(model: &mut Model, active: Option<usize>, queue: &wgpu::Queue, tint: [f32; 4]) {
    let Some(material) = active_material(model, active) else {
        log::debug!("tint ignored, nothing to customize");
        return;
    };
    material.set_tint(queue, tint);
}

/// Reset the tint to white on every mesh under the active mesh's parent.
pub fn clear_tint(model: &mut Model, active: Option<usize>, queue: &wgpu::Queue) {
    for idx in clear_tint_scope(&model.meshes, active) {
        let material = model.meshes[idx].material;
        model.materials[material].set_tint(queue, DEFAULT_TINT);
    }
}

fn active_material(
    model: &mut Model,
    active: Option<usize>,
) -> Option<&mut crate::data_structures::model::Material> {
    let mesh = model.meshes.get(active?)?;
    model.materials.get_mut(mesh.material)
}
