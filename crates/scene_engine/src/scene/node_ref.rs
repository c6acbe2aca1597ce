//! Borrowed view of one node in a [`SceneGraph`]

use super::node::{SceneNode, TransformGuard};
use super::{NodeId, SceneError, SceneGraph};
use crate::foundation::math::{
    constants::EPSILON, euler_to_quaternion, quaternion_from_axis_angle, EulerOrder, Mat4, Quat, Transform,
    Vec3, Vec4,
};
use crate::render::{ContextId, RenderContext};
use parking_lot::{RwLockWriteGuard, RwLockReadGuard};
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Handle to a live node together with the graph it belongs to
///
/// Holding a `NodeRef` keeps the node's storage alive even if it is
/// destroyed concurrently; operations on a destroyed node still work on its
/// last state but it is no longer reachable from the graph.
#[derive(Clone)]
pub struct NodeRef<'g> {
    graph: &'g SceneGraph,
    id: NodeId,
    node: Arc<SceneNode>,
}

impl<'g> NodeRef<'g> {
    pub(crate) fn new(graph: &'g SceneGraph, id: NodeId, node: Arc<SceneNode>) -> Self {
        Self { graph, id, node }
    }

    pub(crate) fn inner(&self) -> &SceneNode {
        &self.node
    }

    /// Handle of this node
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Graph the node belongs to
    pub fn graph(&self) -> &'g SceneGraph {
        self.graph
    }

    /// Whether the node is still in the graph's arena
    pub fn is_alive(&self) -> bool {
        self.graph.contains(self.id)
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    /// Node name; names are not unique
    pub fn name(&self) -> String {
        self.node.name.read().clone()
    }

    /// Rename the node
    pub fn set_name(&self, name: impl Into<String>) {
        *self.node.name.write() = name.into();
    }

    // ------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------

    /// Parent handle, `None` for roots and when the parent was destroyed
    pub fn parent(&self) -> Option<NodeId> {
        let parent = (*self.node.parent.read())?;
        self.graph.contains(parent).then_some(parent)
    }

    /// View of the parent node
    pub fn parent_ref(&self) -> Option<NodeRef<'g>> {
        let parent = (*self.node.parent.read())?;
        self.graph.node(parent)
    }

    /// Snapshot of the child handles in insertion order
    pub fn children(&self) -> Vec<NodeId> {
        self.node.children_snapshot()
    }

    /// Number of children
    pub fn child_count(&self) -> usize {
        self.node.children.read().len()
    }

    /// Child at `index` in insertion order
    pub fn child(&self, index: usize) -> Result<NodeId, SceneError> {
        let children = self.node.children.read();
        children
            .get(index)
            .copied()
            .ok_or(SceneError::IndexOutOfRange { index, len: children.len() })
    }

    /// First direct child named `name`
    pub fn find_child(&self, name: &str) -> Option<NodeId> {
        self.children()
            .into_iter()
            .find(|&id| self.graph.node(id).is_some_and(|child| child.name() == name))
    }

    /// First descendant named `name`, depth-first
    pub fn find_descendant(&self, name: &str) -> Option<NodeId> {
        let mut stack: Vec<NodeId> = self.children().into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = self.graph.node(id) else { continue };
            if node.name() == name {
                return Some(id);
            }
            stack.extend(node.children().into_iter().rev());
        }
        None
    }

    /// Attach `child` under this node, see [`SceneGraph::add_child`]
    pub fn add_child(&self, child: NodeId) -> Result<(), SceneError> {
        self.graph.add_child(self.id, child)
    }

    /// Detach `child` from this node, see [`SceneGraph::remove_child`]
    pub fn remove_child(&self, child: NodeId) -> bool {
        self.graph.remove_child(self.id, child)
    }

    // ------------------------------------------------------------------
    // Local transform
    // ------------------------------------------------------------------

    /// Copy of the local transform
    pub fn transform(&self) -> Transform {
        *self.local_read()
    }

    /// Local position
    pub fn position(&self) -> Vec3 {
        self.local_read().position
    }

    /// Local rotation
    pub fn rotation(&self) -> Quat {
        self.local_read().rotation
    }

    /// Local scale
    pub fn scale(&self) -> Vec3 {
        self.local_read().scale
    }

    /// Mutable local position; invalidates before returning
    pub fn position_mut(&self) -> TransformGuard<'_, Vec3> {
        TransformGuard::new(RwLockWriteGuard::map(self.local_write(), |local| &mut local.position))
    }

    /// Mutable local rotation; invalidates before returning and
    /// re-normalizes when the guard is dropped
    pub fn rotation_mut(&self) -> TransformGuard<'_, Quat> {
        TransformGuard::with_release_hook(
            RwLockWriteGuard::map(self.local_write(), |local| &mut local.rotation),
            normalize_rotation,
        )
    }

    /// Mutable local scale; invalidates before returning
    pub fn scale_mut(&self) -> TransformGuard<'_, Vec3> {
        TransformGuard::new(RwLockWriteGuard::map(self.local_write(), |local| &mut local.scale))
    }

    /// Replace the local position
    pub fn set_position(&self, position: Vec3) {
        self.local_write().position = position;
    }

    /// Replace the local rotation
    pub fn set_rotation(&self, rotation: Quat) {
        let mut local = self.local_write();
        local.rotation = rotation;
        normalize_rotation(&mut local.rotation);
    }

    /// Replace the local scale
    pub fn set_scale(&self, scale: Vec3) {
        self.local_write().scale = scale;
    }

    /// Replace the whole local transform
    pub fn set_transform(&self, transform: Transform) {
        let mut local = self.local_write();
        *local = transform;
        normalize_rotation(&mut local.rotation);
    }

    /// Move by `offset` in parent space
    pub fn translate(&self, offset: &Vec3) {
        self.local_write().position += offset;
    }

    /// Rotate by `angle` radians about `axis`, applied after the current
    /// rotation (`new = delta * current`)
    pub fn rotate(&self, axis: &Vec3, angle: f32) {
        let delta = quaternion_from_axis_angle(axis, angle);
        let mut local = self.local_write();
        local.rotation = Quat::new_normalize(delta.into_inner() * local.rotation.into_inner());
    }

    /// Rotate by Euler angles composed in `order`, applied after the current
    /// rotation
    pub fn rotate_euler(&self, pitch: f32, yaw: f32, roll: f32, order: EulerOrder) {
        let delta = euler_to_quaternion(pitch, yaw, roll, order);
        let mut local = self.local_write();
        local.rotation = Quat::new_normalize(delta.into_inner() * local.rotation.into_inner());
    }

    /// Local-to-parent matrix
    pub fn local_matrix(&self) -> Mat4 {
        self.local_read().to_matrix()
    }

    /// Parent-to-local matrix
    pub fn local_inverse_matrix(&self) -> Mat4 {
        self.local_read().to_inverse_matrix()
    }

    // ------------------------------------------------------------------
    // World transform
    // ------------------------------------------------------------------

    /// Local-to-world matrix, recomputed only when stale
    pub fn world_matrix(&self) -> Mat4 {
        self.node.world.get_or_compute(|| {
            let local = self.local_matrix();
            match self.parent_ref() {
                Some(parent) => parent.world_matrix() * local,
                None => local,
            }
        })
    }

    /// World-to-local matrix, recomputed only when stale
    pub fn world_inverse_matrix(&self) -> Mat4 {
        self.node.world_inverse.get_or_compute(|| {
            let local_inverse = self.local_inverse_matrix();
            match self.parent_ref() {
                Some(parent) => local_inverse * parent.world_inverse_matrix(),
                None => local_inverse,
            }
        })
    }

    /// Origin of the node in world space, as a homogeneous point
    pub fn global_position(&self) -> Vec4 {
        self.world_matrix().column(3).into_owned()
    }

    // ------------------------------------------------------------------
    // Visibility and lifecycle
    // ------------------------------------------------------------------

    /// Whether the node (and so its subtree) is drawn
    pub fn is_visible(&self) -> bool {
        self.node.visible.load(Ordering::Acquire)
    }

    /// Show or hide the node and its subtree
    pub fn set_visible(&self, visible: bool) {
        self.node.visible.store(visible, Ordering::Release);
    }

    /// Stop drawing this node and its subtree in `context`
    pub fn exclude_draw(&self, context: ContextId) {
        self.node.excluded_contexts.write().insert(context);
    }

    /// Undo [`NodeRef::exclude_draw`]
    pub fn include_draw(&self, context: ContextId) {
        self.node.excluded_contexts.write().remove(&context);
    }

    /// Whether `context` is excluded from drawing this node
    pub fn is_excluded(&self, context: ContextId) -> bool {
        self.node.excluded_contexts.read().contains(&context)
    }

    /// Whether the `ready` hook has fired
    pub fn is_activated(&self) -> bool {
        self.node.activated.load(Ordering::Acquire)
    }

    /// Fire the one-shot `ready` hook
    ///
    /// Safe to call from several threads; the hook runs exactly once and
    /// later callers return immediately.
    pub fn activate(&self) {
        if self.node.activated.load(Ordering::Acquire) {
            return;
        }

        let _activation = self.node.activation.lock();
        if self.node.activated.load(Ordering::Acquire) {
            return;
        }
        self.node.activated.store(true, Ordering::Release);

        log::trace!("Activating node {:?} ({})", self.id, self.name());
        if let Some(behavior) = self.node.behavior.lock().as_mut() {
            behavior.ready(self);
        }
    }

    /// Queue draw work for this node and its subtree in `context`
    ///
    /// Returns false, without visiting the subtree, when the node is hidden
    /// or the context is excluded.
    pub fn register_draw(&self, context: &mut RenderContext) -> bool {
        if !self.is_visible() || self.is_excluded(context.id()) {
            return false;
        }

        if let Some(behavior) = self.node.behavior.lock().as_mut() {
            behavior.register_draw(self, context);
        }

        for child in self.children() {
            if let Some(child) = self.graph.node(child) {
                child.register_draw(context);
            }
        }
        true
    }

    pub(crate) fn run_update(&self, delta_time: f32) {
        if let Some(behavior) = self.node.behavior.lock().as_mut() {
            behavior.update(self, delta_time);
        }
    }

    fn local_read(&self) -> RwLockReadGuard<'_, Transform> {
        self.node.local.read()
    }

    /// Lock the local transform for writing and invalidate the subtree
    ///
    /// The write lock is taken first, so a reader recomputing the world
    /// matrix after the invalidation blocks until the new value is stored.
    fn local_write(&self) -> RwLockWriteGuard<'_, Transform> {
        let local = self.node.local.write();
        self.graph.invalidate_subtree(&self.node);
        local
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef").field("id", &self.id).field("node", &self.node).finish()
    }
}

fn normalize_rotation(rotation: &mut Quat) {
    if rotation.quaternion().norm() <= EPSILON {
        *rotation = Quat::identity();
    } else {
        rotation.renormalize();
    }
}
