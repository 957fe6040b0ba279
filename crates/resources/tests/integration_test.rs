//! Integration tests for the asset interface.

use std::path::PathBuf;

use glam::{Vec2, Vec3, Vec4};

use forward_resources::{AssetSet, Assets, Material, MaterialIndexTable, Mesh, MeshData, TextureKind};

fn cube_face(id: u32) -> Mesh {
    Mesh::new(
        id,
        vec![
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(-1.0, 1.0, 1.0),
        ],
        vec![0, 1, 2, 2, 3, 0],
    )
    .with_normals(vec![Vec3::Z; 4])
    .with_uvs(vec![Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y])
}

#[test]
fn test_asset_set_round_trip() {
    let brick = Material {
        base_color: Vec4::new(0.8, 0.3, 0.2, 1.0),
        albedo_texture: Some(PathBuf::from("textures/brick_albedo.png")),
        normal_texture: Some(PathBuf::from("textures/brick_normal.png")),
        ..Material::new(10)
    };
    let plain = Material::new(11);

    let assets = AssetSet::new(vec![cube_face(1), cube_face(2)], vec![brick, plain]);
    assets.validate().expect("assets should validate");

    let total_vertices: usize = assets.meshes().iter().map(|m| m.vertex_count()).sum();
    let total_indices: usize = assets.meshes().iter().map(|m| m.index_count()).sum();
    assert_eq!(total_vertices, 8);
    assert_eq!(total_indices, 12);

    // Tangents were never provided
    assert!(assets.mesh(1).unwrap().tangents().is_empty());

    let table = MaterialIndexTable::build(assets.materials());
    assert_eq!(table.lookup(10), [-1, 0, 0]);
    assert_eq!(table.lookup(11), [-1, -1, -1]);
    assert!(table.layers(TextureKind::Physics).is_empty());
}

#[test]
fn test_invalid_mesh_fails_validation() {
    let mut broken = cube_face(4);
    broken.indices.push(17);

    let assets = AssetSet::new(vec![cube_face(3), broken], Vec::new());
    let err = assets.validate().unwrap_err();
    assert!(err.to_string().contains("index 17"));
}
