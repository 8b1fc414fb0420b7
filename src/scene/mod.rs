//! Scene graph, cameras and lights

mod bounds;
mod camera;
pub mod description;
mod entity;
mod light;
mod node;
mod transform;

pub use bounds::*;
pub use camera::*;
pub use description::{PrefabLoader, SceneDescription, SceneError};
pub use entity::*;
pub use light::*;
pub use node::*;
pub use transform::*;

use crate::resources::ResourceRegistry;
use glam::{Mat4, Vec3};
use std::path::Path;

/// Ray-cast result: index of the entity that was hit and where
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneHit {
    pub entity: usize,
    pub hit: RayHit,
}

/// Top-level entities plus global render parameters
#[derive(Debug, Clone)]
pub struct Scene {
    pub entities: Vec<Entity>,
    pub ambient_light: Vec3,
    pub background_color: Vec3,
    pub main_camera: Camera,
    /// Registry name of an equirectangular sky texture
    pub skybox: Option<String>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
            ambient_light: Vec3::splat(0.03),
            background_color: Vec3::ZERO,
            main_camera: Camera::default(),
            skybox: None,
        }
    }

    /// Read and build a scene description file
    pub fn load_from_file(
        path: impl AsRef<Path>,
        loader: &mut dyn PrefabLoader,
        registry: &mut ResourceRegistry,
    ) -> Result<Self, SceneError> {
        SceneDescription::read(path.as_ref())?.build(loader, registry)
    }

    /// Replace this scene with the one described in `path`. On failure the
    /// current contents are left untouched.
    pub fn reload_from_file(
        &mut self,
        path: impl AsRef<Path>,
        loader: &mut dyn PrefabLoader,
        registry: &mut ResourceRegistry,
    ) -> Result<(), SceneError> {
        let path = path.as_ref();
        match Self::load_from_file(path, loader, registry) {
            Ok(scene) => {
                *self = scene;
                log::info!("Reloaded scene from {}", path.display());
                Ok(())
            }
            Err(e) => {
                log::error!("Keeping previous scene, reload of {} failed: {e}", path.display());
                Err(e)
            }
        }
    }

    pub fn add_entity(&mut self, entity: Entity) -> usize {
        self.entities.push(entity);
        self.entities.len() - 1
    }

    /// Remove the first entity called `name`
    pub fn remove_entity(&mut self, name: &str) -> Option<Entity> {
        let index = self.entities.iter().position(|e| e.name == name)?;
        Some(self.entities.remove(index))
    }

    pub fn entity_by_name(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn entity_by_name_mut(&mut self, name: &str) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.name == name)
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }

    /// Refresh every entity's node matrices top-down
    pub fn update_global_matrices(&mut self) {
        for entity in &mut self.entities {
            entity.root.update_global_matrices(&Mat4::IDENTITY);
        }
    }

    /// Light entities with their index
    pub fn lights(&self) -> impl Iterator<Item = (usize, &Entity, &LightEntity)> + '_ {
        self.entities
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_light().map(|light| (i, e, light)))
    }

    /// Closest hit among visible entities whose layers intersect `layer_mask`
    pub fn test_ray(
        &self,
        registry: &ResourceRegistry,
        ray: &Ray,
        layer_mask: u32,
        max_distance: f32,
    ) -> Option<SceneHit> {
        let mut closest: Option<SceneHit> = None;
        for (index, entity) in self.entities.iter().enumerate() {
            if !entity.visible || entity.layers & layer_mask == 0 {
                continue;
            }
            let limit = closest.map_or(max_distance, |c| c.hit.distance);
            if let Some(hit) = entity.root.test_ray(registry, ray, limit) {
                closest = Some(SceneHit { entity: index, hit });
            }
        }
        closest
    }
}
