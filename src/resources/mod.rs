//! Loading and decoding of model assets.
//!
//! Decoding is split from uploading so the interesting part runs off the
//! event loop and without a device: [`load_model`] produces a plain
//! [`ModelData`] (world transforms baked, bounds computed, node lineage
//! captured), which the viewer recenters, frames and then turns into a GPU
//! [`Model`] with [`upload_model`].

use std::io::{BufReader, Cursor};

use anyhow::Context as _;
use cgmath::{InnerSpace, Matrix, Matrix3, Matrix4, Point3, SquareMatrix, Vector3, Vector4};
use wgpu::util::DeviceExt;

use crate::data_structures::{
    bounds::Aabb,
    model::{Customizable, Material, MaterialState, Mesh, Model, ModelVertex},
    texture::Texture,
};

pub mod texture;

/// Virtual node id for the scene root, the parent of every top-level mesh.
pub const ROOT_NODE: usize = usize::MAX;

/// One decoded mesh, not yet uploaded.
#[derive(Clone, Debug)]
pub struct MeshData {
    /// Explicit identifier from the asset; empty when unnamed.
    pub name: String,
    /// Node ids from the root down to this mesh's parent.
    pub lineage: Vec<usize>,
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
    /// Base color factor carried over from the asset's material.
    pub base_tint: [f32; 4],
    /// Pre-baked base color image. Named meshes arrive with this cleared
    /// so the user always starts from a clean slate.
    pub base_image: Option<image::DynamicImage>,
}

impl Customizable for MeshData {
    fn name(&self) -> &str {
        &self.name
    }

    fn lineage(&self) -> &[usize] {
        &self.lineage
    }
}

/// A decoded asset: mesh data plus the bounding box of everything in it.
#[derive(Debug)]
pub struct ModelData {
    pub label: String,
    pub meshes: Vec<MeshData>,
    pub bounds: Aabb,
}

impl ModelData {
    /// Shift every vertex so the bounding-box center lands on the origin.
    /// Returns the offset that was applied.
    pub fn recenter(&mut self) -> Vector3<f32> {
        if self.bounds.is_empty() {
            return Vector3::new(0.0, 0.0, 0.0);
        }
        let offset = self.bounds.center_offset();
        for mesh in &mut self.meshes {
            for vertex in &mut mesh.vertices {
                vertex.position[0] += offset.x;
                vertex.position[1] += offset.y;
                vertex.position[2] += offset.z;
            }
        }
        self.bounds.translate(offset);
        offset
    }
}

/// Load and decode an asset by file name, dispatching on its extension.
///
/// On failure the caller logs the error and keeps showing whatever was
/// loaded before.
pub async fn load_model(file_name: &str) -> anyhow::Result<ModelData> {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("glb") | Some("gltf") => load_model_gltf(file_name).await,
        Some("obj") => {
            let text = texture::load_string(file_name).await?;
            decode_obj(file_name, &text).await
        }
        _ => anyhow::bail!("{file_name}: unsupported model format"),
    }
}

/// Read a glTF asset, fetching external buffers concurrently, and decode it.
pub async fn load_model_gltf(file_name: &str) -> anyhow::Result<ModelData> {
    let bytes = texture::load_binary(file_name).await?;
    let gltf = gltf::Gltf::from_slice(&bytes)?;

    let fetches: Vec<_> = gltf
        .buffers()
        .filter_map(|buffer| match buffer.source() {
            gltf::buffer::Source::Uri(uri) => Some(texture::load_binary(uri)),
            gltf::buffer::Source::Bin => None,
        })
        .collect();
    let mut fetched = futures::future::try_join_all(fetches).await?.into_iter();

    let mut buffer_data = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                let blob = gltf
                    .blob
                    .as_deref()
                    .with_context(|| format!("{file_name}: binary glTF without a binary chunk"))?;
                buffer_data.push(blob.to_vec());
            }
            gltf::buffer::Source::Uri(_) => {
                buffer_data.push(fetched.next().context("buffer fetch mismatch")?);
            }
        }
    }

    parse_document(file_name, &gltf.document, &buffer_data)
}

/// Decode an in-memory glTF binary. Only self-contained assets are
/// accepted here; anything referencing external buffers goes through
/// [`load_model`].
pub fn decode_gltf(label: &str, bytes: &[u8]) -> anyhow::Result<ModelData> {
    let gltf = gltf::Gltf::from_slice(bytes)?;
    let mut buffer_data = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                let blob = gltf
                    .blob
                    .as_deref()
                    .with_context(|| format!("{label}: binary glTF without a binary chunk"))?;
                buffer_data.push(blob.to_vec());
            }
            gltf::buffer::Source::Uri(uri) => {
                anyhow::bail!("{label}: external buffer {uri} requires async loading");
            }
        }
    }
    parse_document(label, &gltf.document, &buffer_data)
}

/// Walk the node graph of a parsed glTF document into flat mesh data.
pub fn parse_document(
    label: &str,
    document: &gltf::Document,
    buffer_data: &[Vec<u8>],
) -> anyhow::Result<ModelData> {
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .with_context(|| format!("{label}: no scene to load"))?;

    let mut meshes = Vec::new();
    let mut bounds = Aabb::empty();
    for node in scene.nodes() {
        visit_node(
            label,
            node,
            Matrix4::identity(),
            &[ROOT_NODE],
            buffer_data,
            &mut meshes,
            &mut bounds,
        );
    }

    Ok(ModelData {
        label: label.to_string(),
        meshes,
        bounds,
    })
}

fn visit_node(
    label: &str,
    node: gltf::Node,
    parent_world: Matrix4<f32>,
    lineage: &[usize],
    buffer_data: &[Vec<u8>],
    meshes: &mut Vec<MeshData>,
    bounds: &mut Aabb,
) {
    let world = parent_world * Matrix4::from(node.transform().matrix());

    if let Some(mesh) = node.mesh() {
        let name = node
            .name()
            .or_else(|| mesh.name())
            .unwrap_or("")
            .to_string();
        let primitives: Vec<_> = mesh.primitives().collect();
        // A multi-primitive node acts as the parent of its own drawables,
        // so a tint reset on one of them covers its siblings.
        let mesh_lineage: Vec<usize> = if primitives.len() > 1 {
            let mut extended = lineage.to_vec();
            extended.push(node.index());
            extended
        } else {
            lineage.to_vec()
        };
        for primitive in primitives {
            match read_primitive(label, &name, &primitive, world, buffer_data, bounds) {
                Some(mut data) => {
                    data.lineage = mesh_lineage.clone();
                    meshes.push(data);
                }
                None => log::warn!("{label}: skipping primitive without positions"),
            }
        }
    }

    let mut child_lineage = lineage.to_vec();
    child_lineage.push(node.index());
    for child in node.children() {
        visit_node(
            label,
            child,
            world,
            &child_lineage,
            buffer_data,
            meshes,
            bounds,
        );
    }
}

fn read_primitive(
    label: &str,
    name: &str,
    primitive: &gltf::Primitive,
    world: Matrix4<f32>,
    buffer_data: &[Vec<u8>],
    bounds: &mut Aabb,
) -> Option<MeshData> {
    let reader = primitive.reader(|buffer| buffer_data.get(buffer.index()).map(Vec::as_slice));

    let positions: Vec<[f32; 3]> = reader.read_positions()?.collect();
    if positions.is_empty() {
        return None;
    }
    let tex_coords: Vec<[f32; 2]> = reader
        .read_tex_coords(0)
        .map(|tc| tc.into_f32().collect())
        .unwrap_or_default();
    let indices: Vec<u32> = reader
        .read_indices()
        .map(|i| i.into_u32().collect())
        .unwrap_or_else(|| (0..positions.len() as u32).collect());
    let normals: Vec<[f32; 3]> = reader
        .read_normals()
        .map(|n| n.collect())
        .filter(|n: &Vec<[f32; 3]>| n.len() == positions.len())
        .unwrap_or_else(|| compute_normals(&positions, &indices));

    let normal_matrix = Matrix3::from_cols(
        world.x.truncate(),
        world.y.truncate(),
        world.z.truncate(),
    )
    .invert()
    .map(|m| m.transpose())
    .unwrap_or_else(Matrix3::identity);

    let mut vertices = Vec::with_capacity(positions.len());
    for (i, position) in positions.iter().enumerate() {
        let p = world * Vector4::new(position[0], position[1], position[2], 1.0);
        bounds.include(Point3::new(p.x, p.y, p.z));
        let n = normal_matrix * Vector3::from(normals[i]);
        let n = if n.magnitude2() > 0.0 {
            n.normalize()
        } else {
            Vector3::unit_y()
        };
        vertices.push(ModelVertex {
            position: [p.x, p.y, p.z],
            tex_coords: tex_coords.get(i).copied().unwrap_or([0.0, 0.0]),
            normal: n.into(),
        });
    }

    let pbr = primitive.material().pbr_metallic_roughness();
    let base_tint = pbr.base_color_factor();
    // Named meshes are user-customizable and start from a clean slate;
    // unnamed ones keep whatever base map the asset baked in.
    let base_image = if name.is_empty() {
        pbr.base_color_texture()
            .and_then(|info| decode_base_image(label, &info.texture(), buffer_data))
    } else {
        None
    };

    Some(MeshData {
        name: name.to_string(),
        lineage: Vec::new(),
        vertices,
        indices,
        base_tint,
        base_image,
    })
}

fn decode_base_image(
    label: &str,
    texture: &gltf::Texture,
    buffer_data: &[Vec<u8>],
) -> Option<image::DynamicImage> {
    match texture.source().source() {
        gltf::image::Source::View { view, .. } => {
            let buffer = buffer_data.get(view.buffer().index())?;
            let bytes = buffer.get(view.offset()..view.offset() + view.length())?;
            match image::load_from_memory(bytes) {
                Ok(img) => Some(img),
                Err(e) => {
                    log::warn!("{label}: undecodable base image: {e}");
                    None
                }
            }
        }
        gltf::image::Source::Uri { uri, .. } => {
            // Bundled assets embed their images; external references would
            // need the async loader and are not worth it for a base map.
            log::warn!("{label}: external base image {uri} ignored");
            None
        }
    }
}

/// Decode Wavefront OBJ text. Group names map to mesh names; material
/// diffuse colors become the initial tint.
pub async fn decode_obj(label: &str, obj_text: &str) -> anyhow::Result<ModelData> {
    let obj_cursor = Cursor::new(obj_text);
    let mut obj_reader = BufReader::new(obj_cursor);

    let (models, obj_materials) = tobj::load_obj_buf_async(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |p| async move {
            match texture::load_string(&p).await {
                Ok(mat_text) => tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(mat_text))),
                Err(_) => Err(tobj::LoadError::OpenFileFailed),
            }
        },
    )
    .await?;

    let materials = match obj_materials {
        Ok(materials) => materials,
        Err(e) => {
            log::warn!("{label}: materials unavailable: {e}");
            Vec::new()
        }
    };

    let mut meshes = Vec::new();
    let mut bounds = Aabb::empty();
    for m in models {
        let mesh = &m.mesh;
        let vertex_count = mesh.positions.len() / 3;
        if vertex_count == 0 {
            continue;
        }
        let positions: Vec<[f32; 3]> = (0..vertex_count)
            .map(|i| {
                [
                    mesh.positions[i * 3],
                    mesh.positions[i * 3 + 1],
                    mesh.positions[i * 3 + 2],
                ]
            })
            .collect();
        let normals = if mesh.normals.len() == mesh.positions.len() {
            (0..vertex_count)
                .map(|i| {
                    [
                        mesh.normals[i * 3],
                        mesh.normals[i * 3 + 1],
                        mesh.normals[i * 3 + 2],
                    ]
                })
                .collect()
        } else {
            compute_normals(&positions, &mesh.indices)
        };
        let vertices: Vec<ModelVertex> = positions
            .iter()
            .enumerate()
            .map(|(i, position)| {
                bounds.include(Point3::new(position[0], position[1], position[2]));
                // OBJ uses a bottom-left uv origin.
                let tex_coords = if mesh.texcoords.len() >= (i + 1) * 2 {
                    [mesh.texcoords[i * 2], 1.0 - mesh.texcoords[i * 2 + 1]]
                } else {
                    [0.0, 0.0]
                };
                ModelVertex {
                    position: *position,
                    tex_coords,
                    normal: normals[i],
                }
            })
            .collect();
        let base_tint = mesh
            .material_id
            .and_then(|id| materials.get(id))
            .and_then(|mat| mat.diffuse)
            .map(|d| [d[0], d[1], d[2], 1.0])
            .unwrap_or([1.0, 1.0, 1.0, 1.0]);

        meshes.push(MeshData {
            name: m.name.clone(),
            lineage: vec![ROOT_NODE],
            vertices,
            indices: mesh.indices.clone(),
            base_tint,
            base_image: None,
        });
    }

    Ok(ModelData {
        label: label.to_string(),
        meshes,
        bounds,
    })
}

/// Accumulate face normals per vertex when the asset ships none.
pub fn compute_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut acc = vec![Vector3::new(0.0f32, 0.0, 0.0); positions.len()];
    for tri in indices.chunks_exact(3) {
        let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let pa = Vector3::from(positions[a]);
        let pb = Vector3::from(positions[b]);
        let pc = Vector3::from(positions[c]);
        // Cross product length carries the face area, weighting the average.
        let n = (pb - pa).cross(pc - pa);
        acc[a] += n;
        acc[b] += n;
        acc[c] += n;
    }
    acc.into_iter()
        .map(|n| {
            if n.magnitude2() > 0.0 {
                n.normalize().into()
            } else {
                [0.0, 1.0, 0.0]
            }
        })
        .collect()
}

/// Turn decoded mesh data into a GPU model: geometry buffers plus one
/// material per mesh.
pub fn upload_model(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    data: &ModelData,
    layout: &wgpu::BindGroupLayout,
    fallback: &Texture,
) -> Model {
    let mut meshes = Vec::with_capacity(data.meshes.len());
    let mut materials = Vec::with_capacity(data.meshes.len());
    for (idx, mesh) in data.meshes.iter().enumerate() {
        let label = if mesh.name.is_empty() {
            format!("{}#{}", data.label, idx)
        } else {
            mesh.name.clone()
        };
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} vertex buffer")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} index buffer")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let base = mesh.base_image.as_ref().and_then(|img| {
            match Texture::from_image(device, queue, img, Some(&label)) {
                Ok(texture) => Some(texture),
                Err(e) => {
                    log::warn!("{label}: failed to upload base image: {e}");
                    None
                }
            }
        });
        materials.push(Material::new(
            device,
            &label,
            MaterialState::new(mesh.base_tint),
            base,
            fallback,
            layout,
        ));
        meshes.push(Mesh {
            name: mesh.name.clone(),
            lineage: mesh.lineage.clone(),
            vertex_buffer,
            index_buffer,
            num_elements: mesh.indices.len() as u32,
            material: idx,
        });
    }

    Model {
        label: data.label.clone(),
        meshes,
        materials,
        bounds: data.bounds,
    }
}
