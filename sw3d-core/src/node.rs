//! Scene nodes: local transform fields plus cached local/world matrices
use nalgebra::{Matrix4, Vector3};
use slotmap::new_key_type;

use crate::transform::Transform;

new_key_type! {
    /// Generational handle to a node owned by a [`crate::Scene`]
    pub struct NodeHandle;
}

/// What a node carries besides its transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Node,
    Mesh,
    Camera,
}

/// Hook run right after a node's world matrix has been recomposed.
///
/// Components whose own caches derive from the world matrix implement it to
/// mark those caches stale.
pub trait WorldListener {
    fn on_world_recomposed(&mut self);
}

/// A node of the transform tree.
///
/// Transform fields and hierarchy links are only mutable through
/// [`crate::Scene`], which keeps the dirty flags of whole subtrees coherent.
#[derive(Debug, Clone)]
pub struct SceneNode {
    name: String,
    user_id: i32,
    enabled: bool,
    kind: NodeKind,

    pub(crate) position: Vector3<f32>,
    pub(crate) scale: Vector3<f32>,
    /// Euler angles in degrees
    pub(crate) rotation: Vector3<f32>,

    pub(crate) matrix_local: Matrix4<f32>,
    pub(crate) matrix_world: Matrix4<f32>,
    pub(crate) dirty: bool,

    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,

    pub(crate) world_compositions: u64,
}

impl SceneNode {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            name: String::new(),
            user_id: 0,
            enabled: true,
            kind,
            position: Vector3::zeros(),
            scale: Vector3::new(1.0, 1.0, 1.0),
            rotation: Vector3::zeros(),
            matrix_local: Matrix4::identity(),
            matrix_world: Matrix4::identity(),
            dirty: true,
            parent: None,
            children: Vec::new(),
            world_compositions: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn user_id(&self) -> i32 {
        self.user_id
    }

    pub fn set_user_id(&mut self, user_id: i32) {
        self.user_id = user_id;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn position(&self) -> &Vector3<f32> {
        &self.position
    }

    pub fn scale(&self) -> &Vector3<f32> {
        &self.scale
    }

    /// Euler angles in degrees
    pub fn rotation(&self) -> &Vector3<f32> {
        &self.rotation
    }

    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    pub fn child(&self, index: usize) -> Option<NodeHandle> {
        self.children.get(index).copied()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Own flag only; see [`crate::Scene::is_dirty_world`] for ancestors
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// How many times the world matrix has been recomposed
    pub fn world_compositions(&self) -> u64 {
        self.world_compositions
    }

    /// Rebuild the local matrix if the fields changed since the last build
    pub(crate) fn refresh_local(&mut self) -> Matrix4<f32> {
        if self.dirty {
            self.dirty = false;
            self.matrix_local = Transform::compose(&self.position, &self.scale, &self.rotation);
        }
        self.matrix_local
    }
}
