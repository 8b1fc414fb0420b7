//! Shared fixtures for the renderer integration tests.
//!
//! Everything renders through the recording backend, so the tests inspect
//! the passes and draws a frame produced instead of reading back pixels.

#![allow(dead_code)]

use glam::{Mat4, Vec3};
use scene_renderer::backend::recording::RecordedPass;
use scene_renderer::backend::RecordingBackend;
use scene_renderer::resources::{Material, MaterialId, Mesh, MeshId, ResourceRegistry};
use scene_renderer::scene::{Camera, Entity, LightEntity, Node, Scene};

pub const WIDTH: u32 = 800;
pub const HEIGHT: u32 = 600;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn backend() -> RecordingBackend {
    RecordingBackend::new(WIDTH, HEIGHT)
}

// ============================================================================
// Resources
// ============================================================================

/// Registry holding a unit cube, a gray material and a glass material
pub struct Assets {
    pub registry: ResourceRegistry,
    pub cube: MeshId,
    pub gray: MaterialId,
    pub glass: MaterialId,
}

impl Assets {
    pub fn new() -> Self {
        let mut registry = ResourceRegistry::new();
        let cube = registry.add_mesh(Mesh::cube());
        let gray = registry.add_material(Material::flat("gray", Vec3::splat(0.5)));
        let glass = registry.add_material(Material::glass("glass", glam::Vec4::new(0.2, 0.4, 1.0, 0.5)));
        Self {
            registry,
            cube,
            gray,
            glass,
        }
    }

    pub fn cube_at(&self, name: &str, position: Vec3) -> Entity {
        let root = Node::new(name)
            .with_mesh(self.cube, Some(self.gray))
            .with_local(Mat4::from_translation(position));
        Entity::prefab(name, "cube.mesh", root)
    }

    pub fn glass_at(&self, name: &str, position: Vec3) -> Entity {
        let root = Node::new(name)
            .with_mesh(self.cube, Some(self.glass))
            .with_local(Mat4::from_translation(position));
        Entity::prefab(name, "glass.mesh", root)
    }
}

// ============================================================================
// Scenes
// ============================================================================

/// Empty scene whose camera looks at the origin from +Z
pub fn scene() -> Scene {
    let mut scene = Scene::new();
    scene.main_camera = Camera::perspective(60.0, WIDTH as f32 / HEIGHT as f32, 0.1, 500.0);
    scene.main_camera.look_at(Vec3::new(0.0, 2.0, 8.0), Vec3::ZERO, Vec3::Y);
    scene.ambient_light = Vec3::splat(0.1);
    scene
}

/// Light entity placed by `global`
pub fn light(name: &str, light: LightEntity, global: Mat4) -> Entity {
    let mut entity = Entity::light(name, light);
    entity.root.local = global;
    entity
}

pub fn point_light(name: &str, position: Vec3) -> Entity {
    light(
        name,
        LightEntity::point(Vec3::ONE, 1.0, 100.0),
        Mat4::from_translation(position),
    )
}

/// Spot at `height` above the origin shining straight down
pub fn spot_light_above(name: &str, height: f32) -> Entity {
    light(
        name,
        LightEntity::spot(Vec3::ONE, 1.0, 50.0, 20.0, 30.0).with_shadows(0.002),
        Mat4::from_translation(Vec3::new(0.0, height, 0.0)) * Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2),
    )
}

// ============================================================================
// Inspection
// ============================================================================

/// Labels of the pipelines bound in `pass`, in bind order
pub fn pipeline_labels(backend: &RecordingBackend, pass: &RecordedPass) -> Vec<String> {
    pass.pipelines()
        .filter_map(|p| backend.pipeline_label(p))
        .map(str::to_string)
        .collect()
}

pub fn draws_in(backend: &RecordingBackend, label: &str) -> usize {
    backend.pass(label).map_or(0, RecordedPass::draw_count)
}
