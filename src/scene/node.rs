//! Spatial transform tree

use super::bounds::{Aabb, Ray, RayHit};
use super::camera::inverse_or_identity;
use crate::resources::{MaterialId, MeshId, ResourceRegistry};
use glam::{Mat3, Mat4};

/// Scene graph node.
///
/// A node owns its children; a child only leaves its parent through
/// [`Node::remove_child`]. Meshes and materials are registry ids, so
/// cloning a node deep-copies the tree but shares the resources.
///
/// The cached global matrix is only as fresh as the last
/// [`Node::update_global_matrices`] call on an ancestor.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub local: Mat4,
    pub mesh: Option<MeshId>,
    pub material: Option<MaterialId>,
    pub visible: bool,
    global: Mat4,
    children: Vec<Node>,
}

impl Default for Node {
    fn default() -> Self {
        Self::new("")
    }
}

impl Node {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            local: Mat4::IDENTITY,
            mesh: None,
            material: None,
            visible: true,
            global: Mat4::IDENTITY,
            children: Vec::new(),
        }
    }

    pub fn with_mesh(mut self, mesh: MeshId, material: Option<MaterialId>) -> Self {
        self.mesh = Some(mesh);
        self.material = material;
        self
    }

    pub fn with_local(mut self, local: Mat4) -> Self {
        self.local = local;
        self
    }

    /// Take ownership of `child`; returns its index
    pub fn add_child(&mut self, child: Node) -> usize {
        self.children.push(child);
        self.children.len() - 1
    }

    /// Detach a child and hand it back
    pub fn remove_child(&mut self, index: usize) -> Option<Node> {
        (index < self.children.len()).then(|| self.children.remove(index))
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [Node] {
        &mut self.children
    }

    pub fn child(&self, index: usize) -> Option<&Node> {
        self.children.get(index)
    }

    pub fn child_mut(&mut self, index: usize) -> Option<&mut Node> {
        self.children.get_mut(index)
    }

    /// Depth-first search of the subtree, including this node
    pub fn find_child(&self, name: &str) -> Option<&Node> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_child(name))
    }

    pub fn find_child_mut(&mut self, name: &str) -> Option<&mut Node> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_child_mut(name))
    }

    /// Pre-order visit of the subtree
    pub fn for_each(&self, f: &mut impl FnMut(&Node)) {
        f(self);
        for child in &self.children {
            child.for_each(f);
        }
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Node::node_count).sum::<usize>()
    }

    /// Cached world matrix
    pub fn global(&self) -> Mat4 {
        self.global
    }

    /// Refresh the cached world matrices of the whole subtree
    pub fn update_global_matrices(&mut self, parent_global: &Mat4) {
        self.global = *parent_global * self.local;
        let global = self.global;
        for child in &mut self.children {
            child.update_global_matrices(&global);
        }
    }

    /// World matrix of the descendant at `path` (child indices from this
    /// node; empty means this node).
    ///
    /// With `fast` the cached matrices of the ancestors are trusted;
    /// otherwise they are recomputed top-down along the path. The target
    /// node's cache is always refreshed.
    pub fn global_matrix_at(&mut self, path: &[usize], parent_global: &Mat4, fast: bool) -> Option<Mat4> {
        let Some((&first, rest)) = path.split_first() else {
            self.global = *parent_global * self.local;
            return Some(self.global);
        };
        if !fast {
            self.global = *parent_global * self.local;
        }
        let global = self.global;
        self.children.get_mut(first)?.global_matrix_at(rest, &global, fast)
    }

    /// Own mesh box merged with the children's, in this node's space
    pub fn local_bounds(&self, registry: &ResourceRegistry) -> Option<Aabb> {
        let own = self.mesh.and_then(|id| registry.mesh(id)).map(|m| m.bounds);
        self.children
            .iter()
            .filter_map(|c| c.local_bounds(registry).map(|b| b.transformed(&c.local)))
            .fold(own, |acc, b| Some(acc.map_or(b, |a| a.merge(&b))))
    }

    /// World-space box of the subtree
    pub fn bounding_box(&self, registry: &ResourceRegistry) -> Option<Aabb> {
        self.local_bounds(registry).map(|b| b.transformed(&self.global))
    }

    /// World-space box of this node's own mesh
    pub fn mesh_bounding_box(&self, registry: &ResourceRegistry) -> Option<Aabb> {
        let mesh = registry.mesh(self.mesh?)?;
        Some(mesh.bounds.transformed(&self.global))
    }

    /// Closest hit in the subtree no farther than `max_distance`.
    ///
    /// Invisible subtrees and meshes with blended materials are ignored.
    /// On equal distances the first hit found wins. Uses cached globals.
    pub fn test_ray(&self, registry: &ResourceRegistry, ray: &Ray, max_distance: f32) -> Option<RayHit> {
        if !self.visible {
            return None;
        }
        let mut closest = self.test_own_mesh(registry, ray, max_distance);
        for child in &self.children {
            let limit = closest.map_or(max_distance, |h| h.distance);
            if let Some(hit) = child.test_ray(registry, ray, limit) {
                if closest.map_or(true, |c| hit.distance < c.distance) {
                    closest = Some(hit);
                }
            }
        }
        closest
    }

    fn test_own_mesh(&self, registry: &ResourceRegistry, ray: &Ray, max_distance: f32) -> Option<RayHit> {
        let mesh = registry.mesh(self.mesh?)?;
        let blended = self
            .material
            .and_then(|id| registry.material(id))
            .is_some_and(|m| m.is_blended());
        if blended {
            return None;
        }
        let inverse = inverse_or_identity(&self.global);
        let local_ray = ray.transformed(&inverse);
        let (distance, local_normal) = mesh.intersect_ray(&local_ray, max_distance)?;
        let normal_matrix = Mat3::from_mat4(inverse).transpose();
        Some(RayHit {
            position: ray.at(distance),
            normal: (normal_matrix * local_normal).normalize_or_zero(),
            distance,
        })
    }
}
