#![allow(dead_code)] // each test binary uses its own subset of these helpers

use std::{cell::Cell, rc::Rc};

use decal_studio::{context::GPUResource, resources::MeshData};

/// Assembles a self-contained binary glTF in memory.
///
/// Register materials and meshes first, wire them into nodes, mark the
/// roots, then [`build`](Self::build). Only the pieces the loader reads are
/// supported: node names, translations, children, multi-primitive meshes,
/// base color factors and embedded base color textures.
pub struct GlbBuilder {
    bin: Vec<u8>,
    buffer_views: Vec<String>,
    accessors: Vec<String>,
    materials: Vec<String>,
    images: Vec<String>,
    textures: Vec<String>,
    meshes: Vec<String>,
    nodes: Vec<String>,
    roots: Vec<usize>,
}

/// One primitive of a [`GlbBuilder`] mesh. Everything beyond positions is
/// optional so tests can exercise the loader's fallback paths.
#[derive(Clone)]
pub struct Primitive {
    positions: Vec<[f32; 3]>,
    normals: Option<Vec<[f32; 3]>>,
    tex_coords: Option<Vec<[f32; 2]>>,
    indices: Option<Vec<u32>>,
    material: Option<usize>,
}

impl Primitive {
    pub fn points(positions: &[[f32; 3]]) -> Self {
        Self {
            positions: positions.to_vec(),
            normals: None,
            tex_coords: None,
            indices: None,
            material: None,
        }
    }

    pub fn normals(mut self, normals: &[[f32; 3]]) -> Self {
        self.normals = Some(normals.to_vec());
        self
    }

    pub fn tex_coords(mut self, tex_coords: &[[f32; 2]]) -> Self {
        self.tex_coords = Some(tex_coords.to_vec());
        self
    }

    pub fn indices(mut self, indices: &[u32]) -> Self {
        self.indices = Some(indices.to_vec());
        self
    }

    pub fn material(mut self, material: usize) -> Self {
        self.material = Some(material);
        self
    }
}

impl GlbBuilder {
    pub fn new() -> Self {
        Self {
            bin: Vec::new(),
            buffer_views: Vec::new(),
            accessors: Vec::new(),
            materials: Vec::new(),
            images: Vec::new(),
            textures: Vec::new(),
            meshes: Vec::new(),
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    fn push_view(&mut self, bytes: &[u8]) -> usize {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        let offset = self.bin.len();
        self.bin.extend_from_slice(bytes);
        self.buffer_views.push(format!(
            r#"{{"buffer":0,"byteOffset":{offset},"byteLength":{}}}"#,
            bytes.len()
        ));
        self.buffer_views.len() - 1
    }

    fn positions_accessor(&mut self, positions: &[[f32; 3]]) -> usize {
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for p in positions {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        let bytes: Vec<u8> = positions
            .iter()
            .flatten()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let view = self.push_view(&bytes);
        self.accessors.push(format!(
            r#"{{"bufferView":{view},"componentType":5126,"count":{},"type":"VEC3","min":[{},{},{}],"max":[{},{},{}]}}"#,
            positions.len(),
            min[0], min[1], min[2],
            max[0], max[1], max[2]
        ));
        self.accessors.len() - 1
    }

    fn vec3_accessor(&mut self, data: &[[f32; 3]]) -> usize {
        let bytes: Vec<u8> = data.iter().flatten().flat_map(|v| v.to_le_bytes()).collect();
        let view = self.push_view(&bytes);
        self.accessors.push(format!(
            r#"{{"bufferView":{view},"componentType":5126,"count":{},"type":"VEC3"}}"#,
            data.len()
        ));
        self.accessors.len() - 1
    }

    fn vec2_accessor(&mut self, data: &[[f32; 2]]) -> usize {
        let bytes: Vec<u8> = data.iter().flatten().flat_map(|v| v.to_le_bytes()).collect();
        let view = self.push_view(&bytes);
        self.accessors.push(format!(
            r#"{{"bufferView":{view},"componentType":5126,"count":{},"type":"VEC2"}}"#,
            data.len()
        ));
        self.accessors.len() - 1
    }

    fn index_accessor(&mut self, indices: &[u32]) -> usize {
        let bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
        let view = self.push_view(&bytes);
        self.accessors.push(format!(
            r#"{{"bufferView":{view},"componentType":5125,"count":{},"type":"SCALAR"}}"#,
            indices.len()
        ));
        self.accessors.len() - 1
    }

    /// A material with a plain base color factor.
    pub fn material(&mut self, base_color: [f32; 4]) -> usize {
        self.materials.push(format!(
            r#"{{"pbrMetallicRoughness":{{"baseColorFactor":[{},{},{},{}]}}}}"#,
            base_color[0], base_color[1], base_color[2], base_color[3]
        ));
        self.materials.len() - 1
    }

    /// A material with an embedded base color image.
    pub fn textured_material(&mut self, png: &[u8]) -> usize {
        let view = self.push_view(png);
        self.images
            .push(format!(r#"{{"bufferView":{view},"mimeType":"image/png"}}"#));
        let image = self.images.len() - 1;
        self.textures.push(format!(r#"{{"source":{image}}}"#));
        let texture = self.textures.len() - 1;
        self.materials.push(format!(
            r#"{{"pbrMetallicRoughness":{{"baseColorTexture":{{"index":{texture}}}}}}}"#
        ));
        self.materials.len() - 1
    }

    pub fn mesh(&mut self, name: Option<&str>, primitives: &[Primitive]) -> usize {
        let mut rendered = Vec::with_capacity(primitives.len());
        for p in primitives {
            let position = self.positions_accessor(&p.positions);
            let mut attributes = format!(r#""POSITION":{position}"#);
            if let Some(normals) = &p.normals {
                let accessor = self.vec3_accessor(normals);
                attributes.push_str(&format!(r#","NORMAL":{accessor}"#));
            }
            if let Some(tex_coords) = &p.tex_coords {
                let accessor = self.vec2_accessor(tex_coords);
                attributes.push_str(&format!(r#","TEXCOORD_0":{accessor}"#));
            }
            let mut primitive = format!(r#"{{"attributes":{{{attributes}}}"#);
            if let Some(indices) = &p.indices {
                let accessor = self.index_accessor(indices);
                primitive.push_str(&format!(r#","indices":{accessor}"#));
            }
            if let Some(material) = p.material {
                primitive.push_str(&format!(r#","material":{material}"#));
            }
            primitive.push('}');
            rendered.push(primitive);
        }
        let name = name
            .map(|n| format!(r#""name":"{n}","#))
            .unwrap_or_default();
        self.meshes
            .push(format!(r#"{{{name}"primitives":[{}]}}"#, rendered.join(",")));
        self.meshes.len() - 1
    }

    pub fn node(
        &mut self,
        name: Option<&str>,
        mesh: Option<usize>,
        translation: Option<[f32; 3]>,
        children: &[usize],
    ) -> usize {
        let mut parts = Vec::new();
        if let Some(name) = name {
            parts.push(format!(r#""name":"{name}""#));
        }
        if let Some(mesh) = mesh {
            parts.push(format!(r#""mesh":{mesh}"#));
        }
        if let Some(t) = translation {
            parts.push(format!(r#""translation":[{},{},{}]"#, t[0], t[1], t[2]));
        }
        if !children.is_empty() {
            let list: Vec<String> = children.iter().map(|c| c.to_string()).collect();
            parts.push(format!(r#""children":[{}]"#, list.join(",")));
        }
        self.nodes.push(format!("{{{}}}", parts.join(",")));
        self.nodes.len() - 1
    }

    /// Attach a node to the scene root.
    pub fn root(&mut self, node: usize) {
        self.roots.push(node);
    }

    pub fn build(mut self) -> Vec<u8> {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }

        let roots: Vec<String> = self.roots.iter().map(|r| r.to_string()).collect();
        let mut json = format!(
            r#"{{"asset":{{"version":"2.0"}},"scene":0,"scenes":[{{"nodes":[{}]}}]"#,
            roots.join(",")
        );
        if !self.bin.is_empty() {
            json.push_str(&format!(
                r#","buffers":[{{"byteLength":{}}}]"#,
                self.bin.len()
            ));
        }
        for (key, items) in [
            ("nodes", &self.nodes),
            ("meshes", &self.meshes),
            ("materials", &self.materials),
            ("images", &self.images),
            ("textures", &self.textures),
            ("accessors", &self.accessors),
            ("bufferViews", &self.buffer_views),
        ] {
            if !items.is_empty() {
                json.push_str(&format!(r#","{key}":[{}]"#, items.join(",")));
            }
        }
        json.push('}');

        // Chunks are padded to four bytes, JSON with spaces, binary with zeros.
        let mut json = json.into_bytes();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }

        let bin_chunk = if self.bin.is_empty() {
            0
        } else {
            8 + self.bin.len()
        };
        let total = 12 + 8 + json.len() + bin_chunk;

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&0x4654_6C67u32.to_le_bytes()); // "glTF"
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(json.len() as u32).to_le_bytes());
        out.extend_from_slice(&0x4E4F_534Au32.to_le_bytes()); // "JSON"
        out.extend_from_slice(&json);
        if !self.bin.is_empty() {
            out.extend_from_slice(&(self.bin.len() as u32).to_le_bytes());
            out.extend_from_slice(&0x004E_4942u32.to_le_bytes()); // "BIN"
            out.extend_from_slice(&self.bin);
        }
        out
    }
}

impl Default for GlbBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a solid-color PNG for embedding as a base map.
pub fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut bytes = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("png encoding cannot fail in memory");
    bytes.into_inner()
}

/// Mesh data carrying only the fields customization looks at.
pub fn named_mesh(name: &str, lineage: &[usize]) -> MeshData {
    MeshData {
        name: name.to_string(),
        lineage: lineage.to_vec(),
        vertices: Vec::new(),
        indices: Vec::new(),
        base_tint: [1.0, 1.0, 1.0, 1.0],
        base_image: None,
    }
}

/// Counts release calls, standing in for a GPU handle in registry tests.
pub struct SpyResource {
    releases: Rc<Cell<u32>>,
}

impl SpyResource {
    pub fn new() -> (Self, Rc<Cell<u32>>) {
        let releases = Rc::new(Cell::new(0));
        (
            Self {
                releases: releases.clone(),
            },
            releases,
        )
    }
}

impl GPUResource for SpyResource {
    fn release(&mut self) {
        self.releases.set(self.releases.get() + 1);
    }
}
