use cgmath::{Point3, Vector3};
use decal_studio::{
    customize::{clear_tint_scope, first_named},
    resources::{ROOT_NODE, compute_normals, decode_gltf, decode_obj, load_model},
};
use image::GenericImageView;

use crate::common::test_utils::{GlbBuilder, Primitive, solid_png};

mod common;

/// A counter-clockwise unit triangle in the XY plane, facing +Z.
const TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

#[test]
fn decodes_named_nodes_and_their_lineage() {
    let mut builder = GlbBuilder::new();
    let tri = Primitive::points(&TRIANGLE);
    let lid_mesh = builder.mesh(None, &[tri.clone()]);
    let liner_mesh = builder.mesh(None, &[tri.clone()]);
    let base_mesh = builder.mesh(None, &[tri.clone()]);
    let lid = builder.node(Some("lid"), Some(lid_mesh), None, &[]);
    let liner = builder.node(None, Some(liner_mesh), None, &[]);
    let parent = builder.node(None, None, None, &[lid, liner]);
    let base = builder.node(Some("base"), Some(base_mesh), None, &[]);
    builder.root(parent);
    builder.root(base);

    let data = decode_gltf("fixture.glb", &builder.build()).unwrap();

    assert_eq!(data.label, "fixture.glb");
    assert_eq!(data.meshes.len(), 3);
    assert_eq!(data.meshes[0].name, "lid");
    assert_eq!(data.meshes[0].lineage, vec![ROOT_NODE, parent]);
    assert_eq!(data.meshes[1].name, "");
    assert_eq!(data.meshes[1].lineage, vec![ROOT_NODE, parent]);
    assert_eq!(data.meshes[2].name, "base");
    assert_eq!(data.meshes[2].lineage, vec![ROOT_NODE]);

    // The decoded data drives mesh activation and the tint-reset scope.
    assert_eq!(first_named(&data.meshes), Some(0));
    assert_eq!(clear_tint_scope(&data.meshes, Some(0)), vec![0, 1]);
}

#[test]
fn node_names_fall_back_to_the_mesh_name() {
    let mut builder = GlbBuilder::new();
    let mesh = builder.mesh(Some("wing"), &[Primitive::points(&TRIANGLE)]);
    let node = builder.node(None, Some(mesh), None, &[]);
    builder.root(node);

    let data = decode_gltf("fixture.glb", &builder.build()).unwrap();
    assert_eq!(data.meshes[0].name, "wing");
}

#[test]
fn bakes_node_transforms_into_world_space() {
    let mut builder = GlbBuilder::new();
    let tri = builder.mesh(None, &[Primitive::points(&TRIANGLE).indices(&[0, 1, 2])]);
    let child = builder.node(Some("wing"), Some(tri), Some([0.0, 1.0, 0.0]), &[]);
    let parent = builder.node(None, None, Some([2.0, 0.0, 0.0]), &[child]);
    builder.root(parent);

    let data = decode_gltf("fixture.glb", &builder.build()).unwrap();

    let mesh = &data.meshes[0];
    assert_eq!(mesh.vertices[0].position, [2.0, 1.0, 0.0]);
    assert_eq!(mesh.vertices[1].position, [3.0, 1.0, 0.0]);
    assert_eq!(mesh.vertices[2].position, [2.0, 2.0, 0.0]);
    assert_eq!(data.bounds.min, Point3::new(2.0, 1.0, 0.0));
    assert_eq!(data.bounds.max, Point3::new(3.0, 2.0, 0.0));
    // No material assigned: the tint defaults to plain white.
    assert_eq!(mesh.base_tint, [1.0, 1.0, 1.0, 1.0]);
}

#[test]
fn multi_primitive_nodes_parent_their_own_drawables() {
    let mut builder = GlbBuilder::new();
    let shifted: Vec<[f32; 3]> = TRIANGLE.iter().map(|p| [p[0] + 2.0, p[1], p[2]]).collect();
    let badge = builder.mesh(
        None,
        &[Primitive::points(&TRIANGLE), Primitive::points(&shifted)],
    );
    let node = builder.node(Some("badge"), Some(badge), None, &[]);
    builder.root(node);

    let data = decode_gltf("fixture.glb", &builder.build()).unwrap();

    assert_eq!(data.meshes.len(), 2);
    assert_eq!(data.meshes[0].name, "badge");
    assert_eq!(data.meshes[1].name, "badge");
    assert_eq!(data.meshes[0].lineage, vec![ROOT_NODE, node]);
    assert_eq!(data.meshes[1].lineage, vec![ROOT_NODE, node]);

    // A tint reset on one primitive covers its siblings.
    assert_eq!(clear_tint_scope(&data.meshes, Some(0)), vec![0, 1]);
}

#[test]
fn carries_the_base_color_factor_into_the_tint() {
    let mut builder = GlbBuilder::new();
    let blue = builder.material([0.2, 0.4, 0.8, 1.0]);
    let mesh = builder.mesh(None, &[Primitive::points(&TRIANGLE).material(blue)]);
    let node = builder.node(Some("cup"), Some(mesh), None, &[]);
    builder.root(node);

    let data = decode_gltf("fixture.glb", &builder.build()).unwrap();
    assert_eq!(data.meshes[0].base_tint, [0.2, 0.4, 0.8, 1.0]);
}

#[test]
fn named_meshes_start_from_a_clean_slate() {
    let png = solid_png(2, 2, [10, 200, 30, 255]);
    let uvs = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
    let mut builder = GlbBuilder::new();
    let textured = builder.textured_material(&png);
    let named = builder.mesh(
        None,
        &[Primitive::points(&TRIANGLE)
            .tex_coords(&uvs)
            .material(textured)],
    );
    let plain = builder.mesh(
        None,
        &[Primitive::points(&TRIANGLE)
            .tex_coords(&uvs)
            .material(textured)],
    );
    let a = builder.node(Some("panel"), Some(named), None, &[]);
    let b = builder.node(None, Some(plain), None, &[]);
    builder.root(a);
    builder.root(b);

    let data = decode_gltf("fixture.glb", &builder.build()).unwrap();

    assert!(
        data.meshes[0].base_image.is_none(),
        "named meshes drop the baked base map"
    );
    let image = data.meshes[1]
        .base_image
        .as_ref()
        .expect("unnamed meshes keep the baked base map");
    assert_eq!(image.dimensions(), (2, 2));
    assert_eq!(data.meshes[1].vertices[1].tex_coords, [1.0, 0.0]);
}

#[test]
fn synthesizes_missing_indices_normals_and_uvs() {
    let mut builder = GlbBuilder::new();
    let mesh = builder.mesh(None, &[Primitive::points(&TRIANGLE)]);
    let node = builder.node(Some("tri"), Some(mesh), None, &[]);
    builder.root(node);

    let data = decode_gltf("fixture.glb", &builder.build()).unwrap();

    let mesh = &data.meshes[0];
    assert_eq!(mesh.indices, vec![0, 1, 2]);
    for vertex in &mesh.vertices {
        assert_eq!(vertex.normal, [0.0, 0.0, 1.0]);
        assert_eq!(vertex.tex_coords, [0.0, 0.0]);
    }
}

#[test]
fn supplied_normals_win_over_recomputation() {
    let mut builder = GlbBuilder::new();
    let prim = Primitive::points(&TRIANGLE)
        .normals(&[[1.0, 0.0, 0.0]; 3])
        .indices(&[0, 1, 2]);
    let mesh = builder.mesh(None, &[prim]);
    let node = builder.node(Some("tri"), Some(mesh), None, &[]);
    builder.root(node);

    let data = decode_gltf("fixture.glb", &builder.build()).unwrap();
    assert_eq!(data.meshes[0].vertices[0].normal, [1.0, 0.0, 0.0]);
}

#[test]
fn recenter_shifts_the_model_onto_the_origin() {
    let mut builder = GlbBuilder::new();
    // A product standing on the floor: based at y = 0, rising to y = 1.
    let mesh = builder.mesh(
        None,
        &[Primitive::points(&[
            [-0.5, 0.0, -0.5],
            [0.5, 0.0, -0.5],
            [0.5, 1.0, 0.5],
        ])],
    );
    let node = builder.node(Some("mug"), Some(mesh), None, &[]);
    builder.root(node);

    let mut data = decode_gltf("fixture.glb", &builder.build()).unwrap();
    assert_eq!(data.bounds.center(), Point3::new(0.0, 0.5, 0.0));

    let offset = data.recenter();
    assert_eq!(offset, Vector3::new(0.0, -0.5, 0.0));
    assert_eq!(data.bounds.center(), Point3::new(0.0, 0.0, 0.0));
    assert_eq!(data.meshes[0].vertices[0].position, [-0.5, -0.5, -0.5]);
}

#[test]
fn an_empty_scene_decodes_and_recenters_quietly() {
    let mut data = decode_gltf("empty.glb", &GlbBuilder::new().build()).unwrap();
    assert!(data.meshes.is_empty());
    assert!(data.bounds.is_empty());
    assert_eq!(data.recenter(), Vector3::new(0.0, 0.0, 0.0));
}

#[test]
fn external_buffers_are_rejected_in_sync_decoding() {
    let gltf_json = br#"{
        "asset": {"version": "2.0"},
        "scene": 0,
        "scenes": [{"nodes": []}],
        "buffers": [{"uri": "external.bin", "byteLength": 4}]
    }"#;
    let err = decode_gltf("remote.gltf", gltf_json).unwrap_err();
    assert!(
        err.to_string().contains("requires async loading"),
        "unexpected error: {err:#}"
    );
}

#[test]
fn compute_normals_area_weights_shared_vertices() {
    let positions = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 2.0, 0.0],
        [0.0, 0.0, 0.5],
    ];
    // A large face toward +Z and a small one toward +Y share an edge.
    let indices = [0, 1, 2, 0, 3, 1];
    let normals = compute_normals(&positions, &indices);

    let n = normals[0];
    assert!(
        n[2] > n[1] && n[1] > 0.0,
        "expected the larger face to dominate: {n:?}"
    );
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    assert!((len - 1.0).abs() < 1e-5);

    // A vertex only the large face touches points straight out of it.
    assert_eq!(normals[2], [0.0, 0.0, 1.0]);
}

#[test]
fn compute_normals_tolerates_degenerate_input() {
    // Unreferenced vertices get a vertical stand-in normal.
    let normals = compute_normals(&[[0.0; 3]; 2], &[]);
    assert_eq!(normals, vec![[0.0, 1.0, 0.0]; 2]);

    // An index pointing past the vertex list is skipped, not fatal.
    let normals = compute_normals(&[[0.0; 3]; 3], &[0, 1, 9]);
    assert_eq!(normals.len(), 3);
}

#[tokio::test]
async fn unsupported_formats_are_rejected() {
    let err = load_model("product.stl").await.unwrap_err();
    assert!(err.to_string().contains("unsupported model format"));
}

#[tokio::test]
async fn decodes_wavefront_geometry() {
    let obj = "\
o visor
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 0.0 1.0
vn 0.0 0.0 1.0
f 1/1/1 2/2/1 3/3/1
";
    let data = decode_obj("visor.obj", obj).await.unwrap();

    assert_eq!(data.meshes.len(), 1);
    let mesh = &data.meshes[0];
    assert_eq!(mesh.name, "visor");
    assert_eq!(mesh.lineage, vec![ROOT_NODE]);
    assert_eq!(mesh.indices, vec![0, 1, 2]);
    assert_eq!(mesh.vertices[1].position, [1.0, 0.0, 0.0]);
    assert_eq!(mesh.vertices[0].normal, [0.0, 0.0, 1.0]);
    // The uv origin moves from OBJ's bottom-left to our top-left.
    assert_eq!(mesh.vertices[0].tex_coords, [0.0, 1.0]);
    assert_eq!(mesh.vertices[2].tex_coords, [0.0, 0.0]);
    assert_eq!(mesh.base_tint, [1.0, 1.0, 1.0, 1.0]);
    assert_eq!(data.bounds.max, Point3::new(1.0, 1.0, 0.0));
}
