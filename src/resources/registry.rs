//! Named resource storage handed to the renderer and loaders.
//!
//! Nodes only hold ids into this registry. Re-registering a name keeps
//! its id and bumps a generation counter so GPU copies can be refreshed.

use super::{Material, Mesh, TextureData};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u32);

#[derive(Debug)]
struct Entry<T> {
    value: T,
    generation: u32,
}

#[derive(Debug)]
struct NamedStore<T> {
    entries: Vec<Entry<T>>,
    by_name: HashMap<String, u32>,
}

impl<T> Default for NamedStore<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            by_name: HashMap::new(),
        }
    }
}

impl<T> NamedStore<T> {
    fn insert(&mut self, name: &str, value: T) -> u32 {
        if let Some(&index) = self.by_name.get(name) {
            let entry = &mut self.entries[index as usize];
            entry.value = value;
            entry.generation += 1;
            return index;
        }
        let index = self.entries.len() as u32;
        self.entries.push(Entry { value, generation: 0 });
        self.by_name.insert(name.to_string(), index);
        index
    }

    fn get(&self, index: u32) -> Option<&T> {
        self.entries.get(index as usize).map(|e| &e.value)
    }

    fn generation(&self, index: u32) -> Option<u32> {
        self.entries.get(index as usize).map(|e| e.generation)
    }

    fn find(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }
}

#[derive(Debug, Default)]
pub struct ResourceRegistry {
    meshes: NamedStore<Mesh>,
    materials: NamedStore<Material>,
    textures: NamedStore<TextureData>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under `mesh.name`, replacing any mesh with that name
    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        let name = mesh.name.clone();
        MeshId(self.meshes.insert(&name, mesh))
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id.0)
    }

    pub fn mesh_id(&self, name: &str) -> Option<MeshId> {
        self.meshes.find(name).map(MeshId)
    }

    pub fn mesh_generation(&self, id: MeshId) -> Option<u32> {
        self.meshes.generation(id.0)
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        let name = material.name.clone();
        MaterialId(self.materials.insert(&name, material))
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0)
    }

    pub fn material_id(&self, name: &str) -> Option<MaterialId> {
        self.materials.find(name).map(MaterialId)
    }

    pub fn material_generation(&self, id: MaterialId) -> Option<u32> {
        self.materials.generation(id.0)
    }

    pub fn add_texture(&mut self, texture: TextureData) -> TextureId {
        let name = texture.name.clone();
        TextureId(self.textures.insert(&name, texture))
    }

    pub fn texture(&self, id: TextureId) -> Option<&TextureData> {
        self.textures.get(id.0)
    }

    pub fn texture_id(&self, name: &str) -> Option<TextureId> {
        self.textures.find(name).map(TextureId)
    }

    pub fn texture_generation(&self, id: TextureId) -> Option<u32> {
        self.textures.generation(id.0)
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.entries.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.entries.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn re_registering_keeps_id_and_bumps_generation() {
        let mut registry = ResourceRegistry::new();
        let first = registry.add_mesh(Mesh::cube());
        assert_eq!(registry.mesh_generation(first), Some(0));

        let second = registry.add_mesh(Mesh::box_mesh("cube", Vec3::ONE));
        assert_eq!(first, second);
        assert_eq!(registry.mesh_generation(first), Some(1));
        assert_eq!(registry.mesh(first).map(|m| m.bounds.max), Some(Vec3::ONE));
        assert_eq!(registry.mesh_count(), 1);
    }

    #[test]
    fn lookups_by_name() {
        let mut registry = ResourceRegistry::new();
        let id = registry.add_material(Material::new("stone"));
        assert_eq!(registry.material_id("stone"), Some(id));
        assert!(registry.material_id("missing").is_none());
        assert!(registry.texture(TextureId(3)).is_none());
    }
}
