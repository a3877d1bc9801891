//! Hierarchy Integration Tests
//!
//! Tests for:
//! - Mirror maintenance: qualifying transforms under the top-level group
//! - Delta propagation: attach/detach replay, multi-level transform chains
//! - Empty/non-empty threshold forwarding of aggregate geometry groups
//! - Light registry: registration, uniqueness, lazy flatten, environment

use std::sync::Arc;

use glam::{Vec2, Vec3};
use lumen_scene::{
    BasicMaterial, ContinuousDistribution2d, NodeKey, Scene, SceneError, StaticTransform,
    TrackingBackend, Vertex,
};

fn quad_vertices() -> Vec<Vertex> {
    let normal = Vec3::Z;
    let tangent = Vec3::X;
    vec![
        Vertex::new(Vec3::new(0.0, 0.0, 0.0), normal, tangent, Vec2::new(0.0, 0.0)),
        Vertex::new(Vec3::new(1.0, 0.0, 0.0), normal, tangent, Vec2::new(1.0, 0.0)),
        Vertex::new(Vec3::new(1.0, 1.0, 0.0), normal, tangent, Vec2::new(1.0, 1.0)),
        Vertex::new(Vec3::new(0.0, 1.0, 0.0), normal, tangent, Vec2::new(0.0, 1.0)),
    ]
}

const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

/// A two-triangle surface node with one material group.
fn make_quad_surface(
    scene: &mut Scene,
    backend: &mut TrackingBackend,
    name: &str,
    material: BasicMaterial,
) -> NodeKey {
    let surface = scene.create_mesh_surface_node(name);
    scene.set_vertices(surface, quad_vertices(), backend);
    scene
        .add_material_group(surface, &QUAD_INDICES, &material, backend)
        .unwrap();
    surface
}

fn translation(x: f32, y: f32, z: f32) -> StaticTransform {
    StaticTransform::from_translation(Vec3::new(x, y, z))
}

// ============================================================================
// Qualifying Transforms
// ============================================================================

#[test]
fn empty_scene_has_no_qualifying_transforms() {
    let mut backend = TrackingBackend::new();
    let scene = Scene::new(&mut backend);
    assert_eq!(scene.graph().valid_transform_count(), 0);
    assert!(scene.graph().lights().is_empty());
}

#[test]
fn internal_node_without_geometry_stays_off_the_backend_group() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);
    let arm = scene.create_internal_node("arm", translation(1.0, 0.0, 0.0), &mut backend);
    scene.add_child(scene.root(), arm, &mut backend);
    assert_eq!(scene.graph().valid_transform_count(), 0);
}

#[test]
fn attaching_geometry_flips_the_transform_to_qualifying() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);
    let arm = scene.create_internal_node("arm", translation(1.0, 0.0, 0.0), &mut backend);
    scene.add_child(scene.root(), arm, &mut backend);

    let quad = make_quad_surface(&mut scene, &mut backend, "quad", BasicMaterial::non_emitter(0));
    scene.add_child(arm, quad, &mut backend);
    assert_eq!(scene.graph().valid_transform_count(), 1);

    scene.remove_child(arm, quad, &mut backend);
    assert_eq!(scene.graph().valid_transform_count(), 0);
}

#[test]
fn surface_directly_under_root_uses_the_root_transform() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);
    let quad = make_quad_surface(&mut scene, &mut backend, "quad", BasicMaterial::emitter(2));
    scene.add_child(scene.root(), quad, &mut backend);

    assert_eq!(scene.graph().valid_transform_count(), 1);
    assert_eq!(scene.graph().lights().len(), 1);
    let inst = scene.graph().lights().instances().next().unwrap();
    let world = scene
        .graph()
        .lights()
        .get(inst)
        .and_then(|d| d.world_transform())
        .unwrap();
    assert!(Vec3::from(world.forward().translation).length() < 1e-5);

    scene.remove_child(scene.root(), quad, &mut backend);
    assert_eq!(scene.graph().valid_transform_count(), 0);
    assert!(scene.graph().lights().is_empty());
}

// ============================================================================
// The Translated-Arm Scenario
// ============================================================================

#[test]
fn emissive_quad_under_translated_arm() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);

    let arm = scene.create_internal_node("arm", translation(1.0, 2.0, 3.0), &mut backend);
    scene.add_child(scene.root(), arm, &mut backend);
    let quad = make_quad_surface(&mut scene, &mut backend, "quad", BasicMaterial::emitter(7));
    scene.add_child(arm, quad, &mut backend);

    assert_eq!(scene.graph().valid_transform_count(), 1);
    assert_eq!(scene.graph().lights().len(), 1);

    let inst = scene.graph().lights().instances().next().unwrap();
    let descriptor = scene.graph().lights().get(inst).unwrap();
    assert!((descriptor.importance - 1.0).abs() < 1e-6);
    let world = descriptor.world_transform().unwrap();
    let offset = Vec3::from(world.forward().translation);
    assert!((offset - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-5);

    scene.remove_child(arm, quad, &mut backend);
    assert_eq!(scene.graph().valid_transform_count(), 0);
    assert!(scene.graph().lights().is_empty());
}

#[test]
fn non_emissive_group_registers_with_zero_importance() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);
    let quad = make_quad_surface(&mut scene, &mut backend, "quad", BasicMaterial::non_emitter(3));
    scene.add_child(scene.root(), quad, &mut backend);

    let inst = scene.graph().lights().instances().next().unwrap();
    let descriptor = scene.graph().lights().get(inst).unwrap();
    assert!(descriptor.importance.abs() < 1e-6);
}

// ============================================================================
// Multi-Level Chains
// ============================================================================

#[test]
fn chained_transforms_compose_outer_to_inner() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);

    let upper = scene.create_internal_node("upper", translation(1.0, 0.0, 0.0), &mut backend);
    let lower = scene.create_internal_node("lower", translation(0.0, 1.0, 0.0), &mut backend);
    scene.add_child(upper, lower, &mut backend);
    let quad = make_quad_surface(&mut scene, &mut backend, "quad", BasicMaterial::emitter(1));
    scene.add_child(lower, quad, &mut backend);

    // The populated two-level subtree replays into the root on attach.
    scene.add_child(scene.root(), upper, &mut backend);
    assert_eq!(scene.graph().valid_transform_count(), 1);
    assert_eq!(scene.graph().lights().len(), 1);

    let inst = scene.graph().lights().instances().next().unwrap();
    let world = scene
        .graph()
        .lights()
        .get(inst)
        .and_then(|d| d.world_transform())
        .unwrap();
    let offset = Vec3::from(world.forward().translation);
    assert!((offset - Vec3::new(1.0, 1.0, 0.0)).length() < 1e-5);
}

#[test]
fn transform_update_propagates_to_the_registry() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);

    let upper = scene.create_internal_node("upper", translation(1.0, 0.0, 0.0), &mut backend);
    let lower = scene.create_internal_node("lower", translation(0.0, 1.0, 0.0), &mut backend);
    scene.add_child(scene.root(), upper, &mut backend);
    scene.add_child(upper, lower, &mut backend);
    let quad = make_quad_surface(&mut scene, &mut backend, "quad", BasicMaterial::emitter(1));
    scene.add_child(lower, quad, &mut backend);

    scene.set_transform(lower, translation(0.0, 0.0, 5.0), &mut backend);

    let inst = scene.graph().lights().instances().next().unwrap();
    let world = scene
        .graph()
        .lights()
        .get(inst)
        .and_then(|d| d.world_transform())
        .unwrap();
    let offset = Vec3::from(world.forward().translation);
    assert!((offset - Vec3::new(1.0, 0.0, 5.0)).length() < 1e-5);
}

#[test]
#[should_panic(expected = "maximum depth")]
fn transform_chains_beyond_the_bound_are_fatal() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);

    let quad = make_quad_surface(&mut scene, &mut backend, "quad", BasicMaterial::non_emitter(0));
    let mut node = scene.create_internal_node("level-0", StaticTransform::IDENTITY, &mut backend);
    scene.add_child(node, quad, &mut backend);
    for level in 1..6 {
        let above = scene.create_internal_node(
            &format!("level-{level}"),
            StaticTransform::IDENTITY,
            &mut backend,
        );
        scene.add_child(above, node, &mut backend);
        node = above;
    }

    // Five nested levels still resolve; the root's chain over the sixth
    // link cannot.
    scene.add_child(scene.root(), node, &mut backend);
}

// ============================================================================
// Threshold Forwarding
// ============================================================================

#[test]
fn second_surface_does_not_reforward_past_its_parent() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);
    let arm = scene.create_internal_node("arm", StaticTransform::IDENTITY, &mut backend);
    scene.add_child(scene.root(), arm, &mut backend);

    let first = make_quad_surface(&mut scene, &mut backend, "first", BasicMaterial::emitter(0));
    scene.add_child(arm, first, &mut backend);
    assert_eq!(scene.graph().lights().len(), 1);
    assert_eq!(scene.graph().geometry_instance_count(arm), 1);

    // The aggregate group is already non-empty, so nothing crosses the arm.
    let second = make_quad_surface(&mut scene, &mut backend, "second", BasicMaterial::emitter(1));
    scene.add_child(arm, second, &mut backend);
    assert_eq!(scene.graph().geometry_instance_count(arm), 2);
    assert_eq!(scene.graph().lights().len(), 1);
    assert_eq!(scene.graph().valid_transform_count(), 1);

    scene.remove_child(arm, second, &mut backend);
    assert_eq!(scene.graph().geometry_instance_count(arm), 1);
    assert_eq!(scene.graph().lights().len(), 1);

    // Dropping to empty forwards exactly once and clears everything above.
    scene.remove_child(arm, first, &mut backend);
    assert_eq!(scene.graph().geometry_instance_count(arm), 0);
    assert!(scene.graph().lights().is_empty());
    assert_eq!(scene.graph().valid_transform_count(), 0);
}

#[test]
fn removal_in_insertion_order_unwinds_cleanly() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);
    let arm = scene.create_internal_node("arm", StaticTransform::IDENTITY, &mut backend);
    scene.add_child(scene.root(), arm, &mut backend);

    let first = make_quad_surface(&mut scene, &mut backend, "first", BasicMaterial::emitter(0));
    scene.add_child(arm, first, &mut backend);
    let second = make_quad_surface(&mut scene, &mut backend, "second", BasicMaterial::emitter(1));
    scene.add_child(arm, second, &mut backend);
    assert_eq!(scene.graph().lights().len(), 1);

    // Removing the announced surface first must reach the registry even
    // though the group stays non-empty.
    scene.remove_child(arm, first, &mut backend);
    assert!(scene.graph().lights().is_empty());
    assert_eq!(scene.graph().geometry_instance_count(arm), 1);
    assert_eq!(scene.graph().valid_transform_count(), 1);

    scene.remove_child(arm, second, &mut backend);
    assert_eq!(scene.graph().geometry_instance_count(arm), 0);
    assert!(scene.graph().lights().is_empty());
    assert_eq!(scene.graph().valid_transform_count(), 0);
}

#[test]
fn partial_removal_keeps_no_detached_instance_registered() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);
    let arm = scene.create_internal_node("arm", StaticTransform::IDENTITY, &mut backend);
    scene.add_child(scene.root(), arm, &mut backend);

    let first = scene.create_mesh_surface_node("first");
    scene.set_vertices(first, quad_vertices(), &mut backend);
    let first_inst = scene
        .add_material_group(first, &QUAD_INDICES, &BasicMaterial::emitter(0), &mut backend)
        .unwrap();
    scene.add_child(arm, first, &mut backend);

    let second = scene.create_mesh_surface_node("second");
    scene.set_vertices(second, quad_vertices(), &mut backend);
    let second_inst = scene
        .add_material_group(second, &QUAD_INDICES, &BasicMaterial::emitter(1), &mut backend)
        .unwrap();
    scene.add_child(arm, second, &mut backend);

    assert!(scene.graph().lights().contains(first_inst));
    assert!(!scene.graph().lights().contains(second_inst));

    scene.remove_child(arm, first, &mut backend);
    assert!(!scene.graph().lights().contains(first_inst));
    assert!(scene.graph().lights().is_empty());

    // Re-attaching the subtree replays the full membership, so the
    // registry picks up the surviving surface.
    scene.remove_child(scene.root(), arm, &mut backend);
    scene.add_child(scene.root(), arm, &mut backend);
    assert!(scene.graph().lights().contains(second_inst));
    assert_eq!(scene.graph().lights().len(), 1);
}

#[test]
fn transform_update_succeeds_past_the_threshold() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);
    let arm = scene.create_internal_node("arm", translation(1.0, 0.0, 0.0), &mut backend);
    scene.add_child(scene.root(), arm, &mut backend);

    let first = scene.create_mesh_surface_node("first");
    scene.set_vertices(first, quad_vertices(), &mut backend);
    let first_inst = scene
        .add_material_group(first, &QUAD_INDICES, &BasicMaterial::emitter(0), &mut backend)
        .unwrap();
    scene.add_child(arm, first, &mut backend);
    let second = make_quad_surface(&mut scene, &mut backend, "second", BasicMaterial::emitter(1));
    scene.add_child(arm, second, &mut backend);

    scene.set_transform(arm, translation(0.0, 4.0, 0.0), &mut backend);

    let world = scene
        .graph()
        .lights()
        .get(first_inst)
        .and_then(|d| d.world_transform())
        .unwrap();
    let offset = Vec3::from(world.forward().translation);
    assert!((offset - Vec3::new(0.0, 4.0, 0.0)).length() < 1e-5);
}

// ============================================================================
// Subtree Replay & Round-Trip
// ============================================================================

#[test]
fn populated_subtree_replays_every_instance_into_a_new_parent() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);
    let rig = scene.create_internal_node("rig", StaticTransform::IDENTITY, &mut backend);
    let left = make_quad_surface(&mut scene, &mut backend, "left", BasicMaterial::emitter(0));
    let right = make_quad_surface(&mut scene, &mut backend, "right", BasicMaterial::emitter(1));
    scene.add_child(rig, left, &mut backend);
    scene.add_child(rig, right, &mut backend);
    assert!(scene.graph().lights().is_empty());

    scene.add_child(scene.root(), rig, &mut backend);
    assert_eq!(scene.graph().lights().len(), 2);
    assert_eq!(scene.graph().valid_transform_count(), 1);
}

#[test]
fn remove_and_readd_restores_the_registry_key_set() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);
    let rig = scene.create_internal_node("rig", StaticTransform::IDENTITY, &mut backend);
    let left = make_quad_surface(&mut scene, &mut backend, "left", BasicMaterial::emitter(0));
    let right = make_quad_surface(&mut scene, &mut backend, "right", BasicMaterial::emitter(1));
    scene.add_child(rig, left, &mut backend);
    scene.add_child(rig, right, &mut backend);
    scene.add_child(scene.root(), rig, &mut backend);

    let mut before: Vec<_> = scene.graph().lights().instances().collect();
    before.sort();

    scene.remove_child(scene.root(), rig, &mut backend);
    assert!(scene.graph().lights().is_empty());
    assert_eq!(scene.graph().valid_transform_count(), 0);

    scene.add_child(scene.root(), rig, &mut backend);
    let mut after: Vec<_> = scene.graph().lights().instances().collect();
    after.sort();
    assert_eq!(before, after);
    assert_eq!(scene.graph().valid_transform_count(), 1);
}

// ============================================================================
// Light Registry Uniqueness
// ============================================================================

#[test]
#[should_panic(expected = "surface light cannot be instanced")]
fn two_paths_to_one_instance_are_rejected() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);
    let left_arm = scene.create_internal_node("left", translation(-1.0, 0.0, 0.0), &mut backend);
    let right_arm = scene.create_internal_node("right", translation(1.0, 0.0, 0.0), &mut backend);
    scene.add_child(scene.root(), left_arm, &mut backend);
    scene.add_child(scene.root(), right_arm, &mut backend);

    let quad = make_quad_surface(&mut scene, &mut backend, "quad", BasicMaterial::emitter(0));
    scene.add_child(left_arm, quad, &mut backend);
    scene.add_child(right_arm, quad, &mut backend);
}

// ============================================================================
// Synchronization & Environment
// ============================================================================

#[test]
fn set_publishes_group_table_and_distribution() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);
    let arm = scene.create_internal_node("arm", translation(0.0, 1.0, 0.0), &mut backend);
    scene.add_child(scene.root(), arm, &mut backend);
    let quad = make_quad_surface(&mut scene, &mut backend, "quad", BasicMaterial::emitter(4));
    scene.add_child(arm, quad, &mut backend);

    assert!(scene.graph().lights().is_dirty());
    scene.set(&mut backend);

    assert!(backend.top_group().is_some());
    assert_eq!(backend.light_table().len(), 1);
    assert_eq!(backend.light_table()[0].material_index, 4);
    let distribution = backend.light_distribution().unwrap();
    assert_eq!(distribution.len(), 1);
    assert!((distribution.integral() - 1.0).abs() < 1e-6);
    assert!(backend.environment_light().is_none());
    assert!(!scene.graph().lights().is_dirty());

    // Clean registry: synchronizing again is a no-op for the table.
    scene.set(&mut backend);
    assert_eq!(backend.light_table().len(), 1);
}

#[test]
fn environment_light_is_published_with_unit_importance() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);
    let map = Arc::new(ContinuousDistribution2d::new(&[1.0, 2.0, 3.0, 4.0], 2, 2).unwrap());
    scene.set_environment(&BasicMaterial::emitter(9), map);
    scene.set(&mut backend);

    let environment = backend.environment_light().unwrap();
    assert_eq!(environment.material_index, 9);
    assert!((environment.importance - 1.0).abs() < 1e-6);

    scene.clear_environment();
    scene.set(&mut backend);
    assert!(backend.environment_light().is_none());
}

#[test]
fn environment_surface_registers_in_the_light_table() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);
    let map = Arc::new(ContinuousDistribution2d::new(&[1.0; 8], 4, 2).unwrap());
    let sky = scene.create_environment_surface_node(
        "sky",
        &BasicMaterial::emitter(5),
        map,
        &mut backend,
    );
    scene.add_child(scene.root(), sky, &mut backend);

    assert_eq!(scene.graph().lights().len(), 1);
    let inst = scene.graph().lights().instances().next().unwrap();
    let descriptor = scene.graph().lights().get(inst).unwrap();
    assert!(descriptor.world_transform().is_none());
    assert!((descriptor.importance - 1.0).abs() < 1e-6);
}

// ============================================================================
// Geometry Ingestion Errors
// ============================================================================

#[test]
fn material_group_requires_vertices_first() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);
    let surface = scene.create_mesh_surface_node("bare");
    let result =
        scene.add_material_group(surface, &QUAD_INDICES, &BasicMaterial::emitter(0), &mut backend);
    assert!(matches!(result, Err(SceneError::MissingVertices)));
}

#[test]
fn material_group_rejects_malformed_indices() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);
    let surface = scene.create_mesh_surface_node("quad");
    scene.set_vertices(surface, quad_vertices(), &mut backend);

    let result =
        scene.add_material_group(surface, &[0, 1], &BasicMaterial::emitter(0), &mut backend);
    assert!(matches!(result, Err(SceneError::InvalidGeometry(_))));

    let result =
        scene.add_material_group(surface, &[0, 1, 9], &BasicMaterial::emitter(0), &mut backend);
    assert!(matches!(result, Err(SceneError::InvalidGeometry(_))));
}

// ============================================================================
// Teardown
// ============================================================================

#[test]
fn destroying_detached_nodes_releases_backend_transforms() {
    let mut backend = TrackingBackend::new();
    let mut scene = Scene::new(&mut backend);
    let baseline = backend.live_transform_count();

    let arm = scene.create_internal_node("arm", StaticTransform::IDENTITY, &mut backend);
    scene.add_child(scene.root(), arm, &mut backend);
    assert_eq!(backend.live_transform_count(), baseline + 2);

    scene.remove_child(scene.root(), arm, &mut backend);
    assert_eq!(backend.live_transform_count(), baseline + 1);

    scene.destroy_node(arm, &mut backend);
    assert_eq!(backend.live_transform_count(), baseline);
}
