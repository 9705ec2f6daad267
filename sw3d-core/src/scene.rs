//! Node registry and transform hierarchy
//!
//! A [`Scene`] owns every node in a generational arena. Parent and child
//! links are handles, so a node deleted elsewhere shows up as
//! [`SceneError::NodeNotFound`] rather than a dangling reference.
//!
//! Invalidation is eager: every transform setter marks the node and its whole
//! subtree dirty before returning. Reads are lazy: [`Scene::matrix_world`]
//! recomposes only when the node or one of its ancestors is dirty.
use nalgebra::{Matrix4, Vector3};
use slotmap::{SecondaryMap, SlotMap};

use crate::camera::Camera;
use crate::error::{Result, SceneError};
use crate::mesh::Mesh;
use crate::node::{NodeHandle, NodeKind, SceneNode, WorldListener};

/// Explicitly constructed node registry
#[derive(Debug, Default)]
pub struct Scene {
    nodes: SlotMap<NodeHandle, SceneNode>,
    pub(crate) meshes: SecondaryMap<NodeHandle, Mesh>,
    pub(crate) cameras: SecondaryMap<NodeHandle, Camera>,
    /// Creation order, used by index and name lookups
    order: Vec<NodeHandle>,
}

/// Iterator over the ancestors of a node, closest first
pub struct Ancestors<'a> {
    nodes: &'a SlotMap<NodeHandle, SceneNode>,
    next: Option<NodeHandle>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeHandle;

    fn next(&mut self) -> Option<NodeHandle> {
        let current = self.next?;
        self.next = self.nodes.get(current).and_then(|node| node.parent);
        Some(current)
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            meshes: SecondaryMap::new(),
            cameras: SecondaryMap::new(),
            order: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    pub fn create_node(&mut self) -> NodeHandle {
        self.insert(NodeKind::Node)
    }

    pub fn create_mesh(&mut self, mesh: Mesh) -> NodeHandle {
        let handle = self.insert(NodeKind::Mesh);
        self.meshes.insert(handle, mesh);
        handle
    }

    pub fn create_camera(&mut self, camera: Camera) -> NodeHandle {
        let handle = self.insert(NodeKind::Camera);
        self.cameras.insert(handle, camera);
        handle
    }

    fn insert(&mut self, kind: NodeKind) -> NodeHandle {
        let handle = self.nodes.insert(SceneNode::new(kind));
        self.order.push(handle);
        log::debug!("created {kind:?} node {handle:?}");
        handle
    }

    /// Delete a node. It leaves its parent and its children become roots;
    /// they are orphaned, not deleted. Returns `false` for unknown handles.
    pub fn remove_node(&mut self, handle: NodeHandle) -> bool {
        let Some(node) = self.nodes.remove(handle) else {
            return false;
        };

        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.retain(|&c| c != handle);
        }

        for &child in node.children() {
            if let Some(orphan) = self.nodes.get_mut(child) {
                orphan.parent = None;
            }
            self.mark_subtree_dirty(child);
        }

        self.meshes.remove(handle);
        self.cameras.remove(handle);
        self.order.retain(|&h| h != handle);

        log::debug!("removed node {handle:?} ({:?})", node.name());
        true
    }

    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.nodes.contains_key(handle)
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&SceneNode> {
        self.nodes.get(handle)
    }

    /// Mutable access for name, user id and enable flag
    pub fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut SceneNode> {
        self.nodes.get_mut(handle)
    }

    pub fn mesh(&self, handle: NodeHandle) -> Option<&Mesh> {
        self.meshes.get(handle)
    }

    pub fn mesh_mut(&mut self, handle: NodeHandle) -> Option<&mut Mesh> {
        self.meshes.get_mut(handle)
    }

    pub fn camera(&self, handle: NodeHandle) -> Option<&Camera> {
        self.cameras.get(handle)
    }

    /// Camera parameters can be changed freely; their setters invalidate the
    /// projection caches themselves.
    pub fn camera_mut(&mut self, handle: NodeHandle) -> Option<&mut Camera> {
        self.cameras.get_mut(handle)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    /// Nodes in creation order
    pub fn handles(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.order.iter().copied()
    }

    fn handles_of(&self, kind: NodeKind) -> impl Iterator<Item = NodeHandle> + '_ {
        self.handles()
            .filter(move |&h| self.nodes.get(h).is_some_and(|n| n.kind() == kind))
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.handles()
            .filter(|&h| self.nodes.get(h).is_some_and(|n| n.parent.is_none()))
    }

    pub fn node_at(&self, index: usize) -> Option<NodeHandle> {
        self.order.get(index).copied()
    }

    pub fn mesh_at(&self, index: usize) -> Option<NodeHandle> {
        self.handles_of(NodeKind::Mesh).nth(index)
    }

    pub fn camera_at(&self, index: usize) -> Option<NodeHandle> {
        self.handles_of(NodeKind::Camera).nth(index)
    }

    /// First created node whose name matches, ignoring ASCII case
    pub fn find_by_name(&self, name: &str) -> Option<NodeHandle> {
        self.find_in(self.handles(), |n| n.name().eq_ignore_ascii_case(name))
    }

    pub fn find_mesh_by_name(&self, name: &str) -> Option<NodeHandle> {
        self.find_in(self.handles_of(NodeKind::Mesh), |n| {
            n.name().eq_ignore_ascii_case(name)
        })
    }

    pub fn find_camera_by_name(&self, name: &str) -> Option<NodeHandle> {
        self.find_in(self.handles_of(NodeKind::Camera), |n| {
            n.name().eq_ignore_ascii_case(name)
        })
    }

    pub fn find_by_user_id(&self, user_id: i32) -> Option<NodeHandle> {
        self.find_in(self.handles(), |n| n.user_id() == user_id)
    }

    pub fn find_mesh_by_user_id(&self, user_id: i32) -> Option<NodeHandle> {
        self.find_in(self.handles_of(NodeKind::Mesh), |n| n.user_id() == user_id)
    }

    pub fn find_camera_by_user_id(&self, user_id: i32) -> Option<NodeHandle> {
        self.find_in(self.handles_of(NodeKind::Camera), |n| n.user_id() == user_id)
    }

    fn find_in(
        &self,
        mut handles: impl Iterator<Item = NodeHandle>,
        predicate: impl Fn(&SceneNode) -> bool,
    ) -> Option<NodeHandle> {
        handles.find(|&h| self.nodes.get(h).is_some_and(&predicate))
    }

    pub(crate) fn get(&self, handle: NodeHandle) -> Result<&SceneNode> {
        self.nodes.get(handle).ok_or(SceneError::NodeNotFound(handle))
    }

    fn get_mut(&mut self, handle: NodeHandle) -> Result<&mut SceneNode> {
        self.nodes
            .get_mut(handle)
            .ok_or(SceneError::NodeNotFound(handle))
    }

    // ------------------------------------------------------------------
    // Transform fields
    // ------------------------------------------------------------------

    fn modify(&mut self, handle: NodeHandle, apply: impl FnOnce(&mut SceneNode)) -> Result<()> {
        apply(self.get_mut(handle)?);
        self.mark_subtree_dirty(handle);
        Ok(())
    }

    pub fn set_position(&mut self, handle: NodeHandle, position: Vector3<f32>) -> Result<()> {
        self.modify(handle, |n| n.position = position)
    }

    pub fn set_position_x(&mut self, handle: NodeHandle, x: f32) -> Result<()> {
        self.modify(handle, |n| n.position.x = x)
    }

    pub fn set_position_y(&mut self, handle: NodeHandle, y: f32) -> Result<()> {
        self.modify(handle, |n| n.position.y = y)
    }

    pub fn set_position_z(&mut self, handle: NodeHandle, z: f32) -> Result<()> {
        self.modify(handle, |n| n.position.z = z)
    }

    pub fn translate(&mut self, handle: NodeHandle, offset: Vector3<f32>) -> Result<()> {
        self.modify(handle, |n| n.position += offset)
    }

    pub fn set_scale(&mut self, handle: NodeHandle, scale: Vector3<f32>) -> Result<()> {
        self.modify(handle, |n| n.scale = scale)
    }

    pub fn set_scale_uniform(&mut self, handle: NodeHandle, scale: f32) -> Result<()> {
        self.set_scale(handle, Vector3::new(scale, scale, scale))
    }

    /// Adds to the current scale
    pub fn scale_by(&mut self, handle: NodeHandle, delta: Vector3<f32>) -> Result<()> {
        self.modify(handle, |n| n.scale += delta)
    }

    /// Euler angles in degrees
    pub fn set_rotation(&mut self, handle: NodeHandle, angles: Vector3<f32>) -> Result<()> {
        self.modify(handle, |n| n.rotation = angles)
    }

    pub fn set_rotation_x(&mut self, handle: NodeHandle, x: f32) -> Result<()> {
        self.modify(handle, |n| n.rotation.x = x)
    }

    pub fn set_rotation_y(&mut self, handle: NodeHandle, y: f32) -> Result<()> {
        self.modify(handle, |n| n.rotation.y = y)
    }

    pub fn set_rotation_z(&mut self, handle: NodeHandle, z: f32) -> Result<()> {
        self.modify(handle, |n| n.rotation.z = z)
    }

    /// Adds Euler angles in degrees
    pub fn rotate(&mut self, handle: NodeHandle, angles: Vector3<f32>) -> Result<()> {
        self.modify(handle, |n| n.rotation += angles)
    }

    /// Flag the node and every descendant as needing recomposition
    pub fn mark_dirty(&mut self, handle: NodeHandle) -> Result<()> {
        self.get(handle)?;
        self.mark_subtree_dirty(handle);
        Ok(())
    }

    fn mark_subtree_dirty(&mut self, handle: NodeHandle) {
        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(current) {
                node.dirty = true;
                stack.extend(node.children.iter().copied());
            }
        }
    }

    // ------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------

    pub fn parent(&self, handle: NodeHandle) -> Result<Option<NodeHandle>> {
        Ok(self.get(handle)?.parent)
    }

    pub fn children(&self, handle: NodeHandle) -> Result<&[NodeHandle]> {
        Ok(self.get(handle)?.children())
    }

    /// Ancestors of `handle`, parent first
    pub fn ancestors(&self, handle: NodeHandle) -> Ancestors<'_> {
        Ancestors {
            nodes: &self.nodes,
            next: self.nodes.get(handle).and_then(|n| n.parent),
        }
    }

    pub fn is_ancestor_of(&self, ancestor: NodeHandle, handle: NodeHandle) -> bool {
        self.ancestors(handle).any(|h| h == ancestor)
    }

    /// Move `child` under `parent`, or make it a root with `None`.
    ///
    /// Parenting a node to itself or to its current parent does nothing.
    /// Attaching under one of the node's own descendants is rejected.
    /// The moved subtree is marked dirty since its world placement changes.
    pub fn set_parent(&mut self, child: NodeHandle, parent: Option<NodeHandle>) -> Result<()> {
        let current = self.get(child)?.parent;

        if let Some(parent) = parent {
            self.get(parent)?;
            if parent == child {
                log::warn!("ignoring request to parent {child:?} to itself");
                return Ok(());
            }
        }

        if current == parent {
            return Ok(());
        }

        if let Some(parent) = parent {
            if self.is_ancestor_of(child, parent) {
                return Err(SceneError::WouldCreateCycle { child, parent });
            }
        }

        if let Some(old) = current.and_then(|p| self.nodes.get_mut(p)) {
            old.children.retain(|&c| c != child);
        }

        self.get_mut(child)?.parent = parent;
        if let Some(parent) = parent {
            self.get_mut(parent)?.children.push(child);
        }
        self.mark_subtree_dirty(child);

        log::debug!("reparented {child:?}: {current:?} -> {parent:?}");
        Ok(())
    }

    pub fn add_child(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<()> {
        self.set_parent(child, Some(parent))
    }

    /// Detach `child` if it is a direct child of `parent`. Returns whether
    /// anything was removed.
    pub fn remove_child(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<bool> {
        let siblings = &mut self.get_mut(parent)?.children;
        let Some(index) = siblings.iter().position(|&c| c == child) else {
            return Ok(false);
        };
        siblings.remove(index);

        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = None;
        }
        self.mark_subtree_dirty(child);
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Matrices
    // ------------------------------------------------------------------

    pub fn is_dirty(&self, handle: NodeHandle) -> Result<bool> {
        Ok(self.get(handle)?.dirty)
    }

    /// The node or any of its ancestors is dirty
    pub fn is_dirty_world(&self, handle: NodeHandle) -> Result<bool> {
        if self.get(handle)?.dirty {
            return Ok(true);
        }
        Ok(self
            .ancestors(handle)
            .any(|h| self.nodes.get(h).is_some_and(|n| n.dirty)))
    }

    /// Local matrix. Local and world caches share the dirty flag, so both
    /// are refreshed together.
    pub fn matrix_local(&mut self, handle: NodeHandle) -> Result<Matrix4<f32>> {
        self.matrix_world(handle)?;
        Ok(self.get(handle)?.matrix_local)
    }

    /// World matrix, recomposed as `parent.world * local` when stale.
    pub fn matrix_world(&mut self, handle: NodeHandle) -> Result<Matrix4<f32>> {
        if !self.is_dirty_world(handle)? {
            return Ok(self.get(handle)?.matrix_world);
        }

        let parent_world = match self.get(handle)?.parent {
            Some(parent) => Some(self.matrix_world(parent)?),
            None => None,
        };

        let node = self.get_mut(handle)?;
        let local = node.refresh_local();
        node.matrix_world = match parent_world {
            Some(parent_world) => parent_world * local,
            None => local,
        };
        node.world_compositions += 1;
        let world = node.matrix_world;

        log::trace!("recomposed world matrix of {handle:?}");
        self.on_world_recomposed(handle);
        Ok(world)
    }

    fn on_world_recomposed(&mut self, handle: NodeHandle) {
        if let Some(camera) = self.cameras.get_mut(handle) {
            camera.on_world_recomposed();
        }
    }

    /// Bring every world matrix up to date, root by root
    pub fn update_world_matrices(&mut self) {
        let mut stack: Vec<NodeHandle> = self.roots().collect();
        while let Some(handle) = stack.pop() {
            if self.matrix_world(handle).is_ok() {
                if let Some(node) = self.nodes.get(handle) {
                    stack.extend(node.children.iter().copied());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix4Ext;

    fn named(scene: &mut Scene, name: &str) -> NodeHandle {
        let handle = scene.create_node();
        scene.node_mut(handle).unwrap().set_name(name);
        handle
    }

    #[test]
    fn test_child_follows_parent_translation() {
        let mut scene = Scene::new();
        let a = scene.create_node();
        let b = scene.create_node();
        scene.add_child(a, b).unwrap();
        scene.set_position(b, Vector3::new(1.0, 0.0, 0.0)).unwrap();

        scene.set_position(a, Vector3::new(5.0, 0.0, 0.0)).unwrap();
        let world = scene.matrix_world(b).unwrap();
        assert_eq!(world.translation(), Vector3::new(6.0, 0.0, 0.0));
    }

    #[test]
    fn test_mutation_cascades_to_descendants() {
        let mut scene = Scene::new();
        let a = scene.create_node();
        let b = scene.create_node();
        let c = scene.create_node();
        scene.add_child(a, b).unwrap();
        scene.add_child(b, c).unwrap();
        scene.update_world_matrices();
        assert!(!scene.is_dirty(c).unwrap());

        scene.rotate(a, Vector3::new(0.0, 0.0, 10.0)).unwrap();
        assert!(scene.is_dirty(a).unwrap());
        assert!(scene.is_dirty(b).unwrap());
        assert!(scene.is_dirty(c).unwrap());
    }

    #[test]
    fn test_world_matrix_is_memoized() {
        let mut scene = Scene::new();
        let a = scene.create_node();
        let b = scene.create_node();
        scene.add_child(a, b).unwrap();
        scene.set_scale_uniform(a, 2.0).unwrap();

        let first = scene.matrix_world(b).unwrap();
        let count = scene.node(b).unwrap().world_compositions();
        let second = scene.matrix_world(b).unwrap();
        assert_eq!(first, second);
        assert_eq!(scene.node(b).unwrap().world_compositions(), count);
        assert_eq!(scene.node(a).unwrap().world_compositions(), 1);
    }

    #[test]
    fn test_local_read_keeps_world_coherent() {
        let mut scene = Scene::new();
        let a = scene.create_node();
        let b = scene.create_node();
        scene.add_child(a, b).unwrap();
        scene.update_world_matrices();

        scene.set_position(a, Vector3::new(0.0, 0.0, 2.0)).unwrap();
        let local = scene.matrix_local(a).unwrap();
        assert_eq!(local.translation(), Vector3::new(0.0, 0.0, 2.0));
        assert_eq!(
            scene.matrix_world(b).unwrap().translation(),
            Vector3::new(0.0, 0.0, 2.0)
        );
    }

    #[test]
    fn test_is_dirty_world_sees_ancestors() {
        let mut scene = Scene::new();
        let a = scene.create_node();
        let b = scene.create_node();
        scene.add_child(a, b).unwrap();
        scene.update_world_matrices();
        assert!(!scene.is_dirty_world(b).unwrap());

        // Raise only the parent's own flag
        scene.nodes.get_mut(a).unwrap().dirty = true;
        assert!(!scene.is_dirty(b).unwrap());
        assert!(scene.is_dirty_world(b).unwrap());
    }

    #[test]
    fn test_self_parent_is_ignored() {
        let mut scene = Scene::new();
        let a = scene.create_node();
        scene.set_parent(a, Some(a)).unwrap();
        assert_eq!(scene.parent(a).unwrap(), None);
        assert!(scene.children(a).unwrap().is_empty());
    }

    #[test]
    fn test_indirect_cycle_is_rejected() {
        let mut scene = Scene::new();
        let a = scene.create_node();
        let b = scene.create_node();
        let c = scene.create_node();
        scene.add_child(a, b).unwrap();
        scene.add_child(b, c).unwrap();

        let err = scene.set_parent(a, Some(c)).unwrap_err();
        assert_eq!(err, SceneError::WouldCreateCycle { child: a, parent: c });
        assert_eq!(scene.parent(a).unwrap(), None);
        assert_eq!(scene.children(c).unwrap(), &[] as &[NodeHandle]);
    }

    #[test]
    fn test_reparent_moves_between_child_lists() {
        let mut scene = Scene::new();
        let p1 = scene.create_node();
        let p2 = scene.create_node();
        let child = scene.create_node();
        scene.set_position(p2, Vector3::new(0.0, 3.0, 0.0)).unwrap();
        scene.add_child(p1, child).unwrap();
        scene.update_world_matrices();

        scene.add_child(p2, child).unwrap();
        assert!(scene.children(p1).unwrap().is_empty());
        assert_eq!(scene.children(p2).unwrap(), &[child]);
        assert!(scene.is_dirty(child).unwrap());
        assert_eq!(
            scene.matrix_world(child).unwrap().translation(),
            Vector3::new(0.0, 3.0, 0.0)
        );
    }

    #[test]
    fn test_reparent_keeps_new_parent_attached() {
        let mut scene = Scene::new();
        let grand = scene.create_node();
        let parent = scene.create_node();
        let child = scene.create_node();
        scene.add_child(grand, parent).unwrap();
        scene.add_child(parent, child).unwrap();
        assert_eq!(scene.children(grand).unwrap(), &[parent]);
        assert_eq!(scene.parent(parent).unwrap(), Some(grand));
    }

    #[test]
    fn test_remove_child() {
        let mut scene = Scene::new();
        let a = scene.create_node();
        let b = scene.create_node();
        let c = scene.create_node();
        scene.add_child(a, b).unwrap();

        assert!(!scene.remove_child(a, c).unwrap());
        assert!(scene.remove_child(a, b).unwrap());
        assert_eq!(scene.parent(b).unwrap(), None);
        assert!(scene.children(a).unwrap().is_empty());
    }

    #[test]
    fn test_remove_node_orphans_children() {
        let mut scene = Scene::new();
        let root = scene.create_node();
        let middle = scene.create_node();
        let leaf = scene.create_node();
        scene.add_child(root, middle).unwrap();
        scene.add_child(middle, leaf).unwrap();
        scene.set_position(middle, Vector3::new(4.0, 0.0, 0.0)).unwrap();
        scene.update_world_matrices();

        assert!(scene.remove_node(middle));
        assert!(!scene.remove_node(middle));
        assert!(scene.children(root).unwrap().is_empty());
        assert_eq!(scene.parent(leaf).unwrap(), None);
        assert_eq!(scene.node_count(), 2);
        assert_eq!(scene.matrix_world(leaf).unwrap(), Matrix4::identity());

        assert_eq!(
            scene.set_position(middle, Vector3::zeros()),
            Err(SceneError::NodeNotFound(middle))
        );
    }

    #[test]
    fn test_lookup_by_name_and_user_id() {
        let mut scene = Scene::new();
        let ship = named(&mut scene, "Ship");
        let _other = named(&mut scene, "ship");
        let cam = scene.create_camera(Camera::default());
        scene.node_mut(cam).unwrap().set_name("Main");
        scene.node_mut(cam).unwrap().set_user_id(7);

        assert_eq!(scene.find_by_name("SHIP"), Some(ship));
        assert_eq!(scene.find_by_name("missing"), None);
        assert_eq!(scene.find_camera_by_name("main"), Some(cam));
        assert_eq!(scene.find_mesh_by_name("main"), None);
        assert_eq!(scene.find_by_user_id(7), Some(cam));
        assert_eq!(scene.find_camera_by_user_id(7), Some(cam));
        assert_eq!(scene.find_mesh_by_user_id(7), None);
    }

    #[test]
    fn test_index_access_in_creation_order() {
        let mut scene = Scene::new();
        let n = scene.create_node();
        let m = scene.create_mesh(Mesh::default());
        let c = scene.create_camera(Camera::default());

        assert_eq!(scene.node_at(0), Some(n));
        assert_eq!(scene.node_at(2), Some(c));
        assert_eq!(scene.mesh_at(0), Some(m));
        assert_eq!(scene.camera_at(0), Some(c));
        assert_eq!(scene.camera_at(1), None);
        assert_eq!((scene.mesh_count(), scene.camera_count()), (1, 1));

        scene.remove_node(m);
        assert_eq!(scene.mesh_at(0), None);
        assert!(scene.mesh(m).is_none());
    }

    #[test]
    fn test_ancestors_iterates_to_root() {
        let mut scene = Scene::new();
        let a = scene.create_node();
        let b = scene.create_node();
        let c = scene.create_node();
        scene.add_child(a, b).unwrap();
        scene.add_child(b, c).unwrap();
        assert_eq!(scene.ancestors(c).collect::<Vec<_>>(), vec![b, a]);
        assert!(scene.is_ancestor_of(a, c));
        assert!(!scene.is_ancestor_of(c, a));
        assert_eq!(scene.roots().collect::<Vec<_>>(), vec![a]);
    }
}
