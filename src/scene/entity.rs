//! Top-level scene objects

use super::light::LightEntity;
use super::node::Node;

#[derive(Debug, Clone)]
pub enum EntityKind {
    /// Node tree loaded from a model file
    Prefab { filename: String },
    Light(LightEntity),
    /// Type name the description reader did not recognise; kept so the
    /// entity still takes part in layers and picking.
    Unknown { type_name: String },
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub name: String,
    /// Bitmask matched against ray-cast layer masks
    pub layers: u32,
    pub visible: bool,
    pub root: Node,
    pub kind: EntityKind,
}

impl Entity {
    pub fn new(name: &str, kind: EntityKind) -> Self {
        Self {
            name: name.to_string(),
            layers: 1,
            visible: true,
            root: Node::new(name),
            kind,
        }
    }

    pub fn prefab(name: &str, filename: &str, root: Node) -> Self {
        Self {
            root,
            ..Self::new(name, EntityKind::Prefab { filename: filename.to_string() })
        }
    }

    pub fn light(name: &str, light: LightEntity) -> Self {
        Self::new(name, EntityKind::Light(light))
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers;
        self
    }

    pub fn as_light(&self) -> Option<&LightEntity> {
        match &self.kind {
            EntityKind::Light(light) => Some(light),
            _ => None,
        }
    }

    pub fn as_light_mut(&mut self) -> Option<&mut LightEntity> {
        match &mut self.kind {
            EntityKind::Light(light) => Some(light),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &str {
        match &self.kind {
            EntityKind::Prefab { .. } => "PREFAB",
            EntityKind::Light(_) => "LIGHT",
            EntityKind::Unknown { type_name } => type_name,
        }
    }
}
