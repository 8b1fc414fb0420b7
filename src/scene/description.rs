//! JSON scene description reader.
//!
//! ```json
//! { "background_color": [0.1, 0.1, 0.2], "ambient_light": [0.2, 0.2, 0.2],
//!   "main_camera": { "eye": [0, 2, 5], "center": [0, 0, 0], "fov": 60 },
//!   "entities": [ { "type": "LIGHT", "name": "sun", "light_type": "DIRECTIONAL",
//!                   "position": [0, 10, 0], "target": [0, 0, 0] } ] }
//! ```
//!
//! Entity transforms are composed as translate, quaternion rotation,
//! rotation around Y, facing `target`, then scale.

use super::entity::{Entity, EntityKind};
use super::light::{LightEntity, LightType};
use super::node::Node;
use super::transform::Transform;
use super::Scene;
use crate::resources::mesh_cache::{self, MeshCacheError};
use crate::resources::{Material, Mesh, ResourceRegistry};
use glam::{Quat, Vec3};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("failed to read scene {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scene description: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("entity '{entity}' is missing '{field}'")]
    MissingField { entity: String, field: &'static str },
}

/// Builds node trees for `PREFAB` entities
pub trait PrefabLoader {
    /// `None` when the file cannot be loaded; the entity is kept empty
    fn load_prefab(&mut self, filename: &str, registry: &mut ResourceRegistry) -> Option<Node>;
}

impl<F> PrefabLoader for F
where
    F: FnMut(&str, &mut ResourceRegistry) -> Option<Node>,
{
    fn load_prefab(&mut self, filename: &str, registry: &mut ResourceRegistry) -> Option<Node> {
        self(filename, registry)
    }
}

/// Loads prefabs stored as mesh cache files below a base directory.
/// Each file becomes a single node with the default material.
///
/// When a cache file is missing, stale or unreadable, `rebuild` is asked
/// for the mesh by file name and the cache is rewritten from its result.
#[derive(Clone)]
pub struct MeshCachePrefabLoader<R = fn(&str) -> Option<Mesh>> {
    pub base_dir: PathBuf,
    pub rebuild: R,
}

fn no_source(_: &str) -> Option<Mesh> {
    None
}

impl MeshCachePrefabLoader {
    /// Loader that only reads existing caches
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            rebuild: no_source,
        }
    }
}

impl<R> MeshCachePrefabLoader<R> {
    pub fn with_rebuild<F>(self, rebuild: F) -> MeshCachePrefabLoader<F>
    where
        F: FnMut(&str) -> Option<Mesh>,
    {
        MeshCachePrefabLoader {
            base_dir: self.base_dir,
            rebuild,
        }
    }
}

impl<R> std::fmt::Debug for MeshCachePrefabLoader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshCachePrefabLoader")
            .field("base_dir", &self.base_dir)
            .finish_non_exhaustive()
    }
}

impl<R> PrefabLoader for MeshCachePrefabLoader<R>
where
    R: FnMut(&str) -> Option<Mesh>,
{
    fn load_prefab(&mut self, filename: &str, registry: &mut ResourceRegistry) -> Option<Node> {
        let path = self.base_dir.join(filename);
        let rebuild = &mut self.rebuild;
        let mesh = match mesh_cache::load_or_rebuild(&path, || {
            rebuild(filename).ok_or_else(|| MeshCacheError::NoSource(filename.to_string()))
        }) {
            Ok(mesh) => mesh,
            Err(e) => {
                log::error!("Failed to load prefab {}: {e}", path.display());
                return None;
            }
        };
        let name = mesh.name.clone();
        let material = registry
            .material_id("default")
            .unwrap_or_else(|| registry.add_material(Material::default()));
        let mesh = registry.add_mesh(mesh);
        Some(Node::new(&name).with_mesh(mesh, Some(material)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CameraDescription {
    pub eye: [f32; 3],
    pub center: [f32; 3],
    pub up: [f32; 3],
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraDescription {
    fn default() -> Self {
        Self {
            eye: [0.0, 2.0, 5.0],
            center: [0.0; 3],
            up: [0.0, 1.0, 0.0],
            fov: 45.0,
            near: 0.1,
            far: 10000.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EntityDescription {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    pub layer: u32,
    pub visible: bool,
    pub position: Option<[f32; 3]>,
    /// Quaternion `[x, y, z, w]`
    pub rotation: Option<[f32; 4]>,
    /// Degrees around Y
    pub angle: Option<f32>,
    pub target: Option<[f32; 3]>,
    pub scale: Option<[f32; 3]>,
    pub filename: Option<String>,
    pub light_type: Option<LightType>,
    pub color: Option<[f32; 3]>,
    pub intensity: Option<f32>,
    pub max_dist: Option<f32>,
    pub near_dist: Option<f32>,
    pub cone_start: Option<f32>,
    pub cone_end: Option<f32>,
    pub area: Option<f32>,
    pub cast_shadows: bool,
    pub shadow_bias: Option<f32>,
}

impl Default for EntityDescription {
    fn default() -> Self {
        Self {
            type_name: String::new(),
            name: String::new(),
            layer: 1,
            visible: true,
            position: None,
            rotation: None,
            angle: None,
            target: None,
            scale: None,
            filename: None,
            light_type: None,
            color: None,
            intensity: None,
            max_dist: None,
            near_dist: None,
            cone_start: None,
            cone_end: None,
            area: None,
            cast_shadows: false,
            shadow_bias: None,
        }
    }
}

impl EntityDescription {
    pub fn transform(&self) -> Transform {
        let mut transform = Transform::from_position(self.position.map_or(Vec3::ZERO, Vec3::from));
        if let Some([x, y, z, w]) = self.rotation {
            transform.rotation = Quat::from_xyzw(x, y, z, w).normalize();
        }
        if let Some(angle) = self.angle {
            transform.rotation *= Quat::from_rotation_y(angle.to_radians());
        }
        if let Some(target) = self.target {
            transform.look_at(Vec3::from(target), Vec3::Y);
        }
        if let Some(scale) = self.scale {
            transform.scale = Vec3::from(scale);
        }
        transform
    }

    fn light(&self) -> LightEntity {
        let defaults = LightEntity::default();
        LightEntity {
            light_type: self.light_type.unwrap_or(defaults.light_type),
            color: self.color.map_or(defaults.color, Vec3::from),
            intensity: self.intensity.unwrap_or(defaults.intensity),
            max_distance: self.max_dist.unwrap_or(defaults.max_distance),
            near_distance: self.near_dist.unwrap_or(defaults.near_distance),
            cone_inner: self.cone_start.unwrap_or(defaults.cone_inner),
            cone_outer: self.cone_end.unwrap_or(defaults.cone_outer),
            area: self.area.unwrap_or(defaults.area),
            cast_shadows: self.cast_shadows,
            shadow_bias: self.shadow_bias.unwrap_or(defaults.shadow_bias),
            shadow: None,
        }
    }

    fn build(&self, loader: &mut dyn PrefabLoader, registry: &mut ResourceRegistry) -> Result<Entity, SceneError> {
        let kind = match self.type_name.as_str() {
            "PREFAB" => {
                let filename = self.filename.clone().ok_or_else(|| SceneError::MissingField {
                    entity: self.name.clone(),
                    field: "filename",
                })?;
                EntityKind::Prefab { filename }
            }
            "LIGHT" => EntityKind::Light(self.light()),
            other => {
                log::debug!("Entity '{}' has unknown type '{other}'", self.name);
                EntityKind::Unknown { type_name: other.to_string() }
            }
        };

        let mut root = Node::new(&self.name).with_local(self.transform().matrix());
        if let EntityKind::Prefab { filename } = &kind {
            match loader.load_prefab(filename, registry) {
                Some(prefab) => {
                    root.add_child(prefab);
                }
                None => log::warn!("Prefab '{filename}' for entity '{}' could not be loaded", self.name),
            }
        }

        Ok(Entity {
            name: self.name.clone(),
            layers: self.layer,
            visible: self.visible,
            root,
            kind,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SceneDescription {
    pub background_color: Option<[f32; 3]>,
    pub ambient_light: Option<[f32; 3]>,
    pub main_camera: Option<CameraDescription>,
    pub skybox: Option<String>,
    pub entities: Vec<EntityDescription>,
}

impl SceneDescription {
    pub fn parse(json: &str) -> Result<Self, SceneError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn read(path: &Path) -> Result<Self, SceneError> {
        let json = std::fs::read_to_string(path).map_err(|source| SceneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&json)
    }

    /// Build the scene, loading prefabs through `loader`
    pub fn build(&self, loader: &mut dyn PrefabLoader, registry: &mut ResourceRegistry) -> Result<Scene, SceneError> {
        let mut scene = Scene::new();
        if let Some(color) = self.background_color {
            scene.background_color = Vec3::from(color);
        }
        if let Some(ambient) = self.ambient_light {
            scene.ambient_light = Vec3::from(ambient);
        }
        if let Some(camera) = &self.main_camera {
            scene.main_camera.set_perspective(camera.fov, 1.0, camera.near, camera.far);
            scene
                .main_camera
                .look_at(Vec3::from(camera.eye), Vec3::from(camera.center), Vec3::from(camera.up));
        }
        scene.skybox = self.skybox.clone();
        for description in &self.entities {
            scene.add_entity(description.build(loader, registry)?);
        }
        scene.update_global_matrices();
        log::info!("Built scene with {} entities", scene.entities.len());
        Ok(scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = r#"{
        "background_color": [0.1, 0.2, 0.3],
        "ambient_light": [0.25, 0.25, 0.25],
        "main_camera": { "eye": [0, 5, 10], "center": [0, 0, 0], "fov": 60 },
        "skybox": "sky.png",
        "entities": [
            { "type": "PREFAB", "name": "crate", "filename": "crate.mesh", "position": [1, 0, 0], "layer": 2 },
            { "type": "LIGHT", "name": "lamp", "light_type": "SPOT", "position": [0, 10, 0],
              "target": [0, 0, 0], "cone_start": 20, "cone_end": 25, "cast_shadows": true },
            { "type": "SOUND", "name": "ambience" }
        ]
    }"#;

    #[test]
    fn builds_entities_of_every_kind() {
        let mut registry = ResourceRegistry::new();
        let mut loader = |filename: &str, registry: &mut ResourceRegistry| -> Option<Node> {
            let mesh = registry.add_mesh(Mesh::cube());
            Some(Node::new(filename).with_mesh(mesh, None))
        };
        let scene = SceneDescription::parse(SCENE).unwrap().build(&mut loader, &mut registry).unwrap();

        assert_eq!(scene.entities.len(), 3);
        assert_eq!(scene.background_color, Vec3::new(0.1, 0.2, 0.3));
        assert_eq!(scene.skybox.as_deref(), Some("sky.png"));

        let crate_entity = scene.entity_by_name("crate").unwrap();
        assert_eq!(crate_entity.layers, 2);
        assert_eq!(crate_entity.root.children()[0].name, "crate.mesh");
        assert_eq!(crate_entity.root.global().w_axis.truncate(), Vec3::new(1.0, 0.0, 0.0));

        let lamp = scene.entity_by_name("lamp").unwrap();
        let light = lamp.as_light().unwrap();
        assert_eq!(light.light_type, LightType::Spot);
        assert!(light.wants_shadow_map());
        let forward = lamp.root.global().transform_vector3(Vec3::NEG_Z);
        assert!(forward.abs_diff_eq(Vec3::NEG_Y, 1e-5));

        assert_eq!(scene.entity_by_name("ambience").unwrap().type_name(), "SOUND");
    }

    #[test]
    fn prefab_without_filename_is_rejected() {
        let mut registry = ResourceRegistry::new();
        let mut loader = |_: &str, _: &mut ResourceRegistry| -> Option<Node> { None };
        let description = SceneDescription::parse(r#"{ "entities": [ { "type": "PREFAB", "name": "x" } ] }"#).unwrap();
        assert!(matches!(
            description.build(&mut loader, &mut registry),
            Err(SceneError::MissingField { field: "filename", .. })
        ));
    }

    #[test]
    fn stale_mesh_cache_prefab_is_rebuilt() {
        let dir = std::env::temp_dir().join("scene_renderer_stale_prefab");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("crate.mesh");
        let mut bytes = Vec::new();
        mesh_cache::write(&Mesh::cube(), &mut bytes).unwrap();
        bytes[4..8].copy_from_slice(&1u32.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        let mut registry = ResourceRegistry::new();
        let mut requested = Vec::new();
        let mut loader = MeshCachePrefabLoader::new(&dir).with_rebuild(|filename: &str| {
            requested.push(filename.to_string());
            Some(Mesh::box_mesh("crate", Vec3::ONE))
        });
        let node = loader.load_prefab("crate.mesh", &mut registry).unwrap();
        assert!(loader.load_prefab("missing.mesh", &mut registry).is_some());
        drop(loader);

        assert_eq!(node.name, "crate");
        assert_eq!(requested, ["crate.mesh", "missing.mesh"]);
        let rewritten = std::fs::read(&path).unwrap();
        assert_eq!(rewritten[4..8], mesh_cache::MESH_CACHE_VERSION.to_le_bytes());

        // Without a source the stale file cannot be replaced
        bytes_version(&path, 1);
        let mut plain = MeshCachePrefabLoader::new(&dir);
        assert!(plain.load_prefab("crate.mesh", &mut registry).is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    fn bytes_version(path: &Path, version: u32) {
        let mut bytes = std::fs::read(path).unwrap();
        bytes[4..8].copy_from_slice(&version.to_le_bytes());
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn angle_rotates_after_quaternion() {
        let description = EntityDescription {
            rotation: Some([0.0, 0.0, 0.0, 1.0]),
            angle: Some(90.0),
            scale: Some([2.0, 2.0, 2.0]),
            ..Default::default()
        };
        let p = description.transform().matrix().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 0.0, -2.0), 1e-5));
    }
}
