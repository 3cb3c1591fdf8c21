// tests/test_scene_build.rs
// Scene build pipeline tests: merge, dedup, fallback mesh, refit vs rebuild.

use anyhow::Result;
use glam::{Mat4, Vec3};

use emberray::accel::Parallelism;
use emberray::scene::{
    ColorSpace, Light, LightKind, Material, MeshData, SceneBuildPipeline, SceneGraph, TextureRef,
};
use emberray::RenderError;

fn quad_mesh(material: Material) -> MeshData {
    MeshData {
        positions: vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ],
        normals: Some(vec![[0.0, 0.0, 1.0]; 4]),
        uvs: Some(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]),
        indices: vec![0, 1, 2, 0, 2, 3],
        material,
        ..Default::default()
    }
}

#[test]
fn merge_combines_meshes_and_dedups_materials() -> Result<()> {
    let shared = Material {
        base_color: [0.8, 0.2, 0.2, 1.0],
        ..Default::default()
    };
    let mut graph = SceneGraph::new();
    graph.add_mesh(None, Mat4::IDENTITY, quad_mesh(shared.clone()));
    graph.add_mesh(
        None,
        Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0)),
        quad_mesh(shared),
    );
    graph.add_mesh(
        None,
        Mat4::from_translation(Vec3::new(6.0, 0.0, 0.0)),
        quad_mesh(Material::default()),
    );

    let mut pipeline = SceneBuildPipeline::new(Parallelism::Serial);
    let result = pipeline.generate(&graph)?;
    assert!(result.bvh_changed);

    let snapshot = pipeline.snapshot().unwrap();
    assert_eq!(snapshot.geometry.positions.len(), 12);
    assert_eq!(snapshot.geometry.triangle_count(), 6);
    // Two identical materials collapse to one entry.
    assert_eq!(snapshot.materials.len(), 2);
    // Per-triangle material ids reference the deduplicated list.
    assert_eq!(snapshot.geometry.material_ids, vec![0, 0, 0, 0, 1, 1]);
    Ok(())
}

#[test]
fn texture_dedup_key_includes_color_space() -> Result<()> {
    // Same pixel source, two declared color spaces: two resources.
    let albedo_srgb = Material {
        base_color_map: Some(TextureRef::srgb(7)),
        ..Default::default()
    };
    let data_linear = Material {
        base_color: [0.5, 0.5, 0.5, 1.0],
        base_color_map: Some(TextureRef::linear(7)),
        ..Default::default()
    };
    // Same source and color space as the first: collapses.
    let albedo_again = Material {
        base_color: [0.1, 0.1, 0.9, 1.0],
        base_color_map: Some(TextureRef::srgb(7)),
        ..Default::default()
    };

    let mut graph = SceneGraph::new();
    graph.add_mesh(None, Mat4::IDENTITY, quad_mesh(albedo_srgb));
    graph.add_mesh(None, Mat4::IDENTITY, quad_mesh(data_linear));
    graph.add_mesh(None, Mat4::IDENTITY, quad_mesh(albedo_again));

    let mut pipeline = SceneBuildPipeline::new(Parallelism::Serial);
    pipeline.generate(&graph)?;
    let snapshot = pipeline.snapshot().unwrap();

    assert_eq!(snapshot.textures.len(), 2);
    assert_eq!(snapshot.textures[0].color_space, ColorSpace::Srgb);
    assert_eq!(snapshot.textures[1].color_space, ColorSpace::Linear);
    // Materials 0 and 2 share texture slot 0.
    assert_eq!(snapshot.materials[0].base_color_map, Some(0));
    assert_eq!(snapshot.materials[1].base_color_map, Some(1));
    assert_eq!(snapshot.materials[2].base_color_map, Some(0));
    Ok(())
}

#[test]
fn empty_scene_substitutes_fallback_mesh() -> Result<()> {
    let graph = SceneGraph::new();
    let mut pipeline = SceneBuildPipeline::new(Parallelism::Serial);
    let result = pipeline.generate(&graph)?;

    let snapshot = pipeline.snapshot().unwrap();
    assert_eq!(snapshot.geometry.triangle_count(), 1);
    assert!(snapshot.index.world_aabb.is_valid());
    assert_eq!(result.stats.triangle_count, 1);
    Ok(())
}

#[test]
fn missing_positions_is_a_precondition_violation() {
    let mut graph = SceneGraph::new();
    graph.add_mesh(
        None,
        Mat4::IDENTITY,
        MeshData {
            positions: vec![],
            indices: vec![],
            ..Default::default()
        },
    );
    let mut pipeline = SceneBuildPipeline::new(Parallelism::Serial);
    assert!(matches!(
        pipeline.generate(&graph),
        Err(RenderError::Precondition(_))
    ));
}

#[test]
fn transform_change_refits_instead_of_rebuilding() -> Result<()> {
    let mut graph = SceneGraph::new();
    let node = graph.add_mesh(None, Mat4::IDENTITY, quad_mesh(Material::default()));

    let mut pipeline = SceneBuildPipeline::new(Parallelism::Serial);
    let first = pipeline.generate(&graph)?;
    assert!(first.bvh_changed);
    let aabb_before = pipeline.snapshot().unwrap().index.world_aabb;

    graph.node_mut(node).transform = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0));
    let second = pipeline.generate(&graph)?;
    assert!(!second.bvh_changed);

    let snapshot = pipeline.snapshot().unwrap();
    let aabb_after = snapshot.index.world_aabb;
    assert!((aabb_after.min[0] - (aabb_before.min[0] + 10.0)).abs() < 1e-5);
    // Topology and resource lists are untouched by a refit.
    assert_eq!(second.stats.triangle_count, first.stats.triangle_count);
    assert_eq!(second.stats.material_count, first.stats.material_count);
    assert_eq!(second.stats.texture_count, first.stats.texture_count);
    Ok(())
}

#[test]
fn membership_change_forces_rebuild() -> Result<()> {
    let mut graph = SceneGraph::new();
    graph.add_mesh(None, Mat4::IDENTITY, quad_mesh(Material::default()));

    let mut pipeline = SceneBuildPipeline::new(Parallelism::Serial);
    pipeline.generate(&graph)?;

    graph.add_mesh(
        None,
        Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)),
        quad_mesh(Material::default()),
    );
    let result = pipeline.generate(&graph)?;
    assert!(result.bvh_changed);
    assert_eq!(result.stats.triangle_count, 4);
    Ok(())
}

#[test]
fn hiding_a_node_forces_rebuild() -> Result<()> {
    let mut graph = SceneGraph::new();
    let a = graph.add_mesh(None, Mat4::IDENTITY, quad_mesh(Material::default()));
    graph.add_mesh(
        None,
        Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)),
        quad_mesh(Material::default()),
    );

    let mut pipeline = SceneBuildPipeline::new(Parallelism::Serial);
    assert_eq!(pipeline.generate(&graph)?.stats.triangle_count, 4);

    graph.node_mut(a).visible = false;
    let result = pipeline.generate(&graph)?;
    assert!(result.bvh_changed);
    assert_eq!(result.stats.triangle_count, 2);
    Ok(())
}

#[test]
fn negative_determinant_reverses_winding() -> Result<()> {
    let mut graph = SceneGraph::new();
    graph.add_mesh(
        None,
        // Mirror across X flips handedness.
        Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0)),
        quad_mesh(Material::default()),
    );

    let mut pipeline = SceneBuildPipeline::new(Parallelism::Serial);
    pipeline.generate(&graph)?;
    let indices = &pipeline.snapshot().unwrap().geometry.indices;
    // Authored [0,1,2, 0,2,3] with vertices 1 and 2 swapped per triangle.
    assert_eq!(indices, &vec![0, 2, 1, 0, 3, 2]);
    Ok(())
}

#[test]
fn lights_are_collected_with_world_transforms() -> Result<()> {
    let mut graph = SceneGraph::new();
    graph.add_mesh(None, Mat4::IDENTITY, quad_mesh(Material::default()));
    graph.add_light(
        None,
        Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0)),
        Light {
            kind: LightKind::Point,
            color: [1.0, 1.0, 1.0],
            intensity: 10.0,
        },
    );

    let mut pipeline = SceneBuildPipeline::new(Parallelism::Serial);
    let result = pipeline.generate(&graph)?;
    assert_eq!(result.stats.light_count, 1);
    let light = &pipeline.snapshot().unwrap().lights[0];
    assert_eq!(light.kind, LightKind::Point);
    assert!((light.position[1] - 5.0).abs() < 1e-6);
    Ok(())
}
