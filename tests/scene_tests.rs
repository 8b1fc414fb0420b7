//! Scene graph, camera and picking tests, plus loading a scene description
//! from disk and rendering it.

mod common;

use common::Assets;
use glam::{Mat4, Vec3};
use rstest::rstest;
use scene_renderer::resources::{mesh_cache, Mesh, ResourceRegistry};
use scene_renderer::scene::description::MeshCachePrefabLoader;
use scene_renderer::scene::{Camera, Entity, FrustumTest, LightEntity, Node, Ray, Scene};
use scene_renderer::{RenderMode, Renderer, RendererConfig};
use std::path::PathBuf;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("scene_renderer_it_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

// ============================================================================
// Transforms
// ============================================================================

#[test]
fn test_nested_translations_compose() {
    let mut b = Node::new("B").with_local(Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)));
    b.add_child(Node::new("C"));
    let mut a = Node::new("A").with_local(Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)));
    a.add_child(b);

    let global = a
        .global_matrix_at(&[0, 0], &Mat4::IDENTITY, false)
        .expect("C exists");
    assert!(global.transform_point3(Vec3::ZERO).abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));

    // The fast path trusts the caches refreshed above
    let fast = a.global_matrix_at(&[0, 0], &Mat4::IDENTITY, true);
    assert_eq!(fast, Some(global));
    assert!(a.global_matrix_at(&[3], &Mat4::IDENTITY, false).is_none());
}

#[test]
fn test_fast_path_uses_stale_parent_cache() {
    let mut a = Node::new("A");
    a.add_child(Node::new("B"));
    a.update_global_matrices(&Mat4::IDENTITY);

    a.local = Mat4::from_translation(Vec3::X);
    let stale = a.global_matrix_at(&[0], &Mat4::IDENTITY, true).expect("B exists");
    assert_eq!(stale, Mat4::IDENTITY);
    let fresh = a.global_matrix_at(&[0], &Mat4::IDENTITY, false).expect("B exists");
    assert_eq!(fresh, Mat4::from_translation(Vec3::X));
}

// ============================================================================
// Frustum
// ============================================================================

#[rstest]
#[case::ahead(Vec3::new(0.0, 0.0, -50.0), FrustumTest::Inside)]
#[case::far_right(Vec3::new(1000.0, 0.0, -50.0), FrustumTest::Outside)]
#[case::behind(Vec3::new(0.0, 0.0, 50.0), FrustumTest::Outside)]
#[case::edge(Vec3::new(10.0, 0.0, -50.0), FrustumTest::Overlap)]
fn test_orthographic_box_classification(#[case] center: Vec3, #[case] expected: FrustumTest) {
    let mut camera = Camera::orthographic(-10.0, 10.0, -10.0, 10.0, 0.1, 100.0);
    camera.look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
    assert_eq!(camera.test_box_in_frustum(center, Vec3::ONE), expected);
}

#[test]
fn test_screen_ray_through_center_follows_view_direction() {
    let mut camera = Camera::perspective(60.0, 4.0 / 3.0, 0.1, 100.0);
    camera.look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
    let ray = camera.screen_ray(glam::Vec2::new(400.0, 300.0), 800.0, 600.0);
    assert!(ray.direction.abs_diff_eq(Vec3::NEG_Z, 1e-4));
}

// ============================================================================
// Picking
// ============================================================================

#[test]
fn test_ray_hits_near_face_of_cube() {
    let mut registry = ResourceRegistry::new();
    let cube = registry.add_mesh(Mesh::box_mesh("unit", Vec3::ONE));
    let mut scene = Scene::new();
    scene.add_entity(Entity::prefab("box", "unit.mesh", Node::new("box").with_mesh(cube, None)));
    scene.update_global_matrices();

    let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z);
    let hit = scene.test_ray(&registry, &ray, u32::MAX, 100.0).expect("hit");
    assert_eq!(hit.entity, 0);
    assert!(hit.hit.position.abs_diff_eq(Vec3::new(0.0, 0.0, 1.0), 1e-4));
    assert!((hit.hit.distance - 9.0).abs() < 1e-4);
    assert!(hit.hit.normal.abs_diff_eq(Vec3::Z, 1e-4));

    assert!(scene.test_ray(&registry, &ray, u32::MAX, 5.0).is_none());
}

#[test]
fn test_ray_skips_glass() {
    let assets = Assets::new();
    let mut scene = Scene::new();
    scene.add_entity(assets.glass_at("window", Vec3::new(0.0, 0.0, 3.0)));
    scene.add_entity(assets.cube_at("wall", Vec3::ZERO));
    scene.update_global_matrices();

    let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z);
    let hit = scene.test_ray(&assets.registry, &ray, u32::MAX, 100.0).expect("hit");
    assert_eq!(scene.entities[hit.entity].name, "wall");
}

// ============================================================================
// Lights
// ============================================================================

#[test]
fn test_cloned_scene_does_not_share_shadow_maps() {
    let assets = Assets::new();
    let mut scene = common::scene();
    scene.add_entity(assets.cube_at("cube", Vec3::ZERO));
    let spot = scene.add_entity(common::spot_light_above("spot", 5.0));

    let mut backend = common::backend();
    let mut renderer = Renderer::new(RendererConfig::default());
    renderer
        .render_scene(&mut backend, &mut scene, &assets.registry)
        .expect("frame");
    assert!(scene.entities[spot].as_light().is_some_and(|l| l.shadow.is_some()));

    let copy = scene.clone();
    let light = copy.entities[spot].as_light().expect("light entity");
    assert!(light.shadow.is_none());
    assert!(light.cast_shadows);
}

#[test]
fn test_light_reach() {
    let bounds = scene_renderer::scene::Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(0.5));
    let at = |x: f32| Mat4::from_translation(Vec3::new(x, 0.0, 0.0));

    let bulb = LightEntity::point(Vec3::ONE, 1.0, 10.0);
    assert!(bulb.affects(&at(5.0), &bounds));
    assert!(!bulb.affects(&at(20.0), &bounds));

    let sun = LightEntity::directional(Vec3::ONE, 1.0, 10.0);
    assert!(sun.affects(&at(1000.0), &bounds));
}

// ============================================================================
// Scene descriptions
// ============================================================================

#[test]
fn test_scene_file_loads_and_renders() {
    common::init_logging();
    let dir = temp_dir("scene_file");
    mesh_cache::save(&Mesh::cube(), &dir.join("crate.mesh")).expect("write mesh cache");
    let json = r#"{
        "background_color": [0.1, 0.1, 0.2],
        "ambient_light": [0.2, 0.2, 0.2],
        "main_camera": { "eye": [0, 2, 6], "center": [0, 0, 0], "fov": 60 },
        "entities": [
            { "type": "PREFAB", "name": "crate", "filename": "crate.mesh" },
            { "type": "PREFAB", "name": "lost", "filename": "missing.mesh" },
            { "type": "LIGHT", "name": "lamp", "light_type": "POINT", "position": [0, 3, 0] }
        ]
    }"#;
    let path = dir.join("scene.json");
    std::fs::write(&path, json).expect("write scene");

    let mut registry = ResourceRegistry::new();
    let mut loader = MeshCachePrefabLoader::new(&dir);
    let mut scene = Scene::load_from_file(&path, &mut loader, &mut registry).expect("scene loads");
    assert_eq!(scene.entities.len(), 3);
    assert_eq!(scene.ambient_light, Vec3::splat(0.2));
    assert_eq!(registry.mesh_count(), 1);

    let mut backend = common::backend();
    let mut renderer = Renderer::new(RendererConfig {
        render_mode: RenderMode::Lights,
        ..Default::default()
    });
    let stats = renderer
        .render_scene(&mut backend, &mut scene, &registry)
        .expect("frame");
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.light_passes, 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_reload_replaces_scene() {
    let dir = temp_dir("reload");
    let path = dir.join("scene.json");
    std::fs::write(&path, r#"{ "entities": [ { "type": "LIGHT", "name": "sun", "light_type": "DIRECTIONAL" } ] }"#)
        .expect("write scene");

    let assets = Assets::new();
    let mut registry = assets.registry;
    let mut scene = Scene::new();
    scene.add_entity(Entity::prefab("old", "old.mesh", Node::new("old").with_mesh(assets.cube, None)));

    let mut loader = |_: &str, _: &mut ResourceRegistry| -> Option<scene_renderer::scene::Node> { None };
    scene
        .reload_from_file(&path, &mut loader, &mut registry)
        .expect("reload");
    assert!(scene.entity_by_name("old").is_none());
    assert_eq!(scene.lights().count(), 1);

    std::fs::write(&path, "{ not json").expect("write scene");
    assert!(scene.reload_from_file(&path, &mut loader, &mut registry).is_err());
    assert!(scene.entity_by_name("sun").is_some());

    let _ = std::fs::remove_dir_all(&dir);
}
