//! Scene traversal and frustum culling.
//!
//! Every visible node carrying a mesh is tested on its own world box.
//! A culled node does not hide its children: they are still tested one by
//! one, since a child may be placed far outside its parent's box.

use crate::backend::TextureViewHandle;
use crate::resources::{MaterialId, MeshId, ResourceRegistry};
use crate::scene::{Aabb, Camera, FrustumTest, GpuLightData, LightEntity, Node, Scene};
use glam::{Mat4, Vec3};

/// Everything needed to issue the draws for one node
#[derive(Debug, Clone)]
pub struct RenderCall {
    pub model: Mat4,
    pub mesh: MeshId,
    pub material: Option<MaterialId>,
    /// World-space box of the mesh
    pub bounds: Aabb,
    /// Indices into the frame's light list, in light list order
    pub lights: Vec<usize>,
}

/// Light collected by `setup_scene`
#[derive(Debug, Clone)]
pub struct ActiveLight {
    /// Index of the owning entity in the scene
    pub entity: usize,
    pub global: Mat4,
    /// Copy of the entity's light; never holds the shadow map
    pub light: LightEntity,
    /// Set by `generate_shadow_maps` for the current frame
    pub shadow: Option<ShadowView>,
}

/// Shadow map of a light as seen by the shading passes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowView {
    pub view: TextureViewHandle,
    pub view_projection: Mat4,
}

impl ActiveLight {
    pub fn gpu_data(&self, ambient: Vec3, emissive_factor: f32) -> GpuLightData {
        let mut data = self.light.gpu_data(&self.global, ambient, emissive_factor);
        if let Some(shadow) = &self.shadow {
            data.cone_shadow.w = 1.0;
            data.shadow_view_proj = shadow.view_projection;
        }
        data
    }

    pub fn shadow_view(&self) -> Option<TextureViewHandle> {
        self.shadow.map(|shadow| shadow.view)
    }
}

/// Collect the lights of every visible light entity
pub fn collect_lights(scene: &Scene) -> Vec<ActiveLight> {
    scene
        .lights()
        .filter(|(_, entity, _)| entity.visible)
        .map(|(entity, e, light)| ActiveLight {
            entity,
            global: e.root.global(),
            light: light.clone(),
            shadow: None,
        })
        .collect()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalkStats {
    pub visited: usize,
    pub culled: usize,
}

/// Calls `visit` for each mesh node of `scene` that survives culling
/// against `camera`, in depth-first entity order. Uses the cached global
/// matrices, so `Scene::update_global_matrices` must have run this frame.
pub fn walk_scene(
    scene: &Scene,
    registry: &ResourceRegistry,
    camera: &Camera,
    lights: &[ActiveLight],
    visit: &mut dyn FnMut(RenderCall),
) -> WalkStats {
    let mut stats = WalkStats::default();
    for entity in scene.entities.iter().filter(|e| e.visible) {
        walk_node(&entity.root, registry, camera, lights, &mut stats, visit);
    }
    stats
}

fn walk_node(
    node: &Node,
    registry: &ResourceRegistry,
    camera: &Camera,
    lights: &[ActiveLight],
    stats: &mut WalkStats,
    visit: &mut dyn FnMut(RenderCall),
) {
    if !node.visible {
        return;
    }

    if let (Some(mesh), Some(bounds)) = (node.mesh, node.mesh_bounding_box(registry)) {
        stats.visited += 1;
        if camera.test_box_in_frustum(bounds.center(), bounds.half_extents()) == FrustumTest::Outside {
            stats.culled += 1;
            log::trace!("Culled node {}", node.name);
        } else {
            let affecting = lights
                .iter()
                .enumerate()
                .filter(|(_, l)| l.light.affects(&l.global, &bounds))
                .map(|(i, _)| i)
                .collect();
            visit(RenderCall {
                model: node.global(),
                mesh,
                material: node.material,
                bounds,
                lights: affecting,
            });
        }
    }

    for child in node.children() {
        walk_node(child, registry, camera, lights, stats, visit);
    }
}
