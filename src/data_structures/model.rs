//! Mesh, material and model definitions plus their GPU resources.
//!
//! A [`Model`] is the uploaded form of one loaded asset: meshes with their
//! vertex/index buffers and one [`Material`] per mesh. Customization state
//! lives in [`MaterialState`], which is plain data so the mutation rules can
//! be exercised without a device; [`Material`] wraps that state together
//! with the params uniform, the optional decal texture and the bind group.

use wgpu::util::DeviceExt;

use crate::data_structures::{bounds::Aabb, texture::Texture};

/// Tint applied when none is chosen and restored by clear-color.
pub const DEFAULT_TINT: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 5]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// A mesh entity that may be customizable.
///
/// Anything with a name and a node lineage can answer the two questions the
/// customizer asks: "are you the active edit target?" (first named mesh
/// wins) and "do you share the active mesh's parent?" (the color-reset
/// scope). Implemented by both the decoded mesh data and the uploaded mesh.
pub trait Customizable {
    /// The node's explicit identifier; empty when the asset left it unnamed.
    fn name(&self) -> &str;
    /// Node ids from the scene root down to this mesh's parent.
    fn lineage(&self) -> &[usize];
}

/// Customization state of one material, independent of the GPU.
///
/// Both mutation pairs are idempotent: clearing a decal that is not set or
/// a tint already at the default leaves the state untouched.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaterialState {
    pub tint: [f32; 4],
    pub has_decal: bool,
}

impl MaterialState {
    pub fn new(tint: [f32; 4]) -> Self {
        Self {
            tint,
            has_decal: false,
        }
    }

    pub fn set_tint(&mut self, tint: [f32; 4]) -> bool {
        if self.tint == tint {
            return false;
        }
        self.tint = tint;
        true
    }

    pub fn clear_tint(&mut self) -> bool {
        self.set_tint(DEFAULT_TINT)
    }

    pub fn set_decal(&mut self) -> bool {
        let changed = !self.has_decal;
        self.has_decal = true;
        changed
    }

    pub fn clear_decal(&mut self) -> bool {
        let changed = self.has_decal;
        self.has_decal = false;
        changed
    }
}

impl Default for MaterialState {
    fn default() -> Self {
        Self::new(DEFAULT_TINT)
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct MaterialParamsRaw {
    tint: [f32; 4],
    use_decal: u32,
    // Due to uniforms requiring 16 byte (4 float) spacing, we need to use a padding field here
    _padding: [u32; 3],
}

impl From<&Material> for MaterialParamsRaw {
    fn from(material: &Material) -> Self {
        Self {
            tint: material.state.tint,
            use_decal: material.state.has_decal as u32,
            _padding: [0; 3],
        }
    }
}

/// One mesh's surface: tint + optional decal, mirrored into a params
/// uniform and a bind group the model pipeline consumes.
#[derive(Debug)]
pub struct Material {
    pub name: String,
    pub state: MaterialState,
    pub decal: Option<Texture>,
    params_buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl Material {
    pub fn new(
        device: &wgpu::Device,
        name: &str,
        state: MaterialState,
        decal: Option<Texture>,
        fallback: &Texture,
        layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let mut state = state;
        state.has_decal = decal.is_some();
        let params = MaterialParamsRaw {
            tint: state.tint,
            use_decal: state.has_decal as u32,
            _padding: [0; 3],
        };
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{name} material params")),
            contents: bytemuck::cast_slice(&[params]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = mk_bind_group(
            device,
            name,
            layout,
            decal.as_ref().unwrap_or(fallback),
            &params_buffer,
        );
        Self {
            name: name.to_string(),
            state,
            decal,
            params_buffer,
            bind_group,
        }
    }

    /// Install a decal, destroying any superseded one, and rebind.
    pub fn set_decal(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        decal: Texture,
    ) {
        if let Some(old) = self.decal.take() {
            old.destroy();
        }
        self.bind_group = mk_bind_group(device, &self.name, layout, &decal, &self.params_buffer);
        self.decal = Some(decal);
        self.state.set_decal();
        self.write_params(queue);
    }

    /// Drop the decal and fall back to the white base map. Idempotent.
    pub fn clear_decal(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        fallback: &Texture,
    ) {
        if !self.state.clear_decal() {
            return;
        }
        if let Some(old) = self.decal.take() {
            old.destroy();
        }
        self.bind_group = mk_bind_group(device, &self.name, layout, fallback, &self.params_buffer);
        self.write_params(queue);
    }

    pub fn set_tint(&mut self, queue: &wgpu::Queue, tint: [f32; 4]) {
        if self.state.set_tint(tint) {
            self.write_params(queue);
        }
    }

    pub fn clear_tint(&mut self, queue: &wgpu::Queue) {
        if self.state.clear_tint() {
            self.write_params(queue);
        }
    }

    fn write_params(&self, queue: &wgpu::Queue) {
        let params = MaterialParamsRaw::from(self);
        queue.write_buffer(&self.params_buffer, 0, bytemuck::cast_slice(&[params]));
    }

    /// Free the GPU memory this material holds.
    pub fn dispose(&mut self) {
        if let Some(decal) = self.decal.take() {
            decal.destroy();
        }
        self.params_buffer.destroy();
    }
}

fn mk_bind_group(
    device: &wgpu::Device,
    name: &str,
    layout: &wgpu::BindGroupLayout,
    base: &Texture,
    params_buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    let sampler = base
        .sampler
        .as_ref()
        .expect("material textures always carry a sampler");
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&base.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: params_buffer.as_entire_binding(),
            },
        ],
        label: Some(&format!("{name} material bind group")),
    })
}

/// One uploaded mesh: geometry buffers plus the index of its material.
#[derive(Debug)]
pub struct Mesh {
    pub name: String,
    pub lineage: Vec<usize>,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_elements: u32,
    pub material: usize,
}

impl Customizable for Mesh {
    fn name(&self) -> &str {
        &self.name
    }

    fn lineage(&self) -> &[usize] {
        &self.lineage
    }
}

/// An uploaded asset: meshes, one material per mesh, and the bounds it was
/// framed with. Replaced wholesale when the user switches assets.
#[derive(Debug)]
pub struct Model {
    pub label: String,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub bounds: Aabb,
}

impl Model {
    /// Free every GPU resource the model owns. Called when the model is
    /// superseded or the scene is torn down.
    pub fn dispose(&mut self) {
        for mesh in &self.meshes {
            mesh.vertex_buffer.destroy();
            mesh.index_buffer.destroy();
        }
        for material in &mut self.materials {
            material.dispose();
        }
    }
}

pub trait DrawModel<'a> {
    fn draw_mesh(
        &mut self,
        mesh: &'a Mesh,
        material: &'a Material,
        camera_bind_group: &'a wgpu::BindGroup,
        light_bind_group: &'a wgpu::BindGroup,
    );
    fn draw_model(
        &mut self,
        model: &'a Model,
        camera_bind_group: &'a wgpu::BindGroup,
        light_bind_group: &'a wgpu::BindGroup,
    );
}

impl<'a, 'b> DrawModel<'b> for wgpu::RenderPass<'a>
where
    'b: 'a,
{
    fn draw_mesh(
        &mut self,
        mesh: &'b Mesh,
        material: &'b Material,
        camera_bind_group: &'b wgpu::BindGroup,
        light_bind_group: &'b wgpu::BindGroup,
    ) {
        self.set_bind_group(0, &material.bind_group, &[]);
        self.set_bind_group(1, camera_bind_group, &[]);
        self.set_bind_group(2, light_bind_group, &[]);
        self.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        self.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.draw_indexed(0..mesh.num_elements, 0, 0..1);
    }

    fn draw_model(
        &mut self,
        model: &'b Model,
        camera_bind_group: &'b wgpu::BindGroup,
        light_bind_group: &'b wgpu::BindGroup,
    ) {
        for mesh in &model.meshes {
            let material = &model.materials[mesh.material];
            self.draw_mesh(mesh, material, camera_bind_group, light_bind_group);
        }
    }
}
