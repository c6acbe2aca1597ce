//! Scene graph: node arena, hierarchy mutation and traversals

use super::node::SceneNode;
use super::{NodeBehavior, NodeId, NodeRef, SceneError};
use crate::render::RenderContext;
use parking_lot::{Mutex, RwLock};
use slotmap::SlotMap;
use std::sync::Arc;

/// Tree of scene nodes rooted at one base node
///
/// The graph is shared between threads behind an `Arc`. Structural changes
/// (`add_child`, `remove_child`, `destroy_node`) are serialized by a single
/// hierarchy lock, which makes reparenting atomic for other callers; lookups
/// and transform access never take it.
pub struct SceneGraph {
    nodes: RwLock<SlotMap<NodeId, Arc<SceneNode>>>,
    hierarchy: Mutex<()>,
    root: NodeId,
    root_node: Arc<SceneNode>,
}

impl SceneGraph {
    /// Create a graph containing only the base node, named `"root"`
    pub fn new() -> Self {
        Self::with_root_name("root")
    }

    /// Create a graph whose base node has the given name
    pub fn with_root_name(name: impl Into<String>) -> Self {
        let root_node = Arc::new(SceneNode::new(name.into(), None));
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Arc::clone(&root_node));

        Self {
            nodes: RwLock::new(nodes),
            hierarchy: Mutex::new(()),
            root,
            root_node,
        }
    }

    /// Handle of the base node
    pub fn root_id(&self) -> NodeId {
        self.root
    }

    /// View of the base node
    pub fn root(&self) -> NodeRef<'_> {
        NodeRef::new(self, self.root, Arc::clone(&self.root_node))
    }

    /// View of a node, `None` once it has been destroyed
    pub fn node(&self, id: NodeId) -> Option<NodeRef<'_>> {
        self.get(id).map(|node| NodeRef::new(self, id, node))
    }

    /// Like [`SceneGraph::node`] but reports a missing node as an error
    pub fn try_node(&self, id: NodeId) -> Result<NodeRef<'_>, SceneError> {
        self.node(id).ok_or(SceneError::NodeNotFound(id))
    }

    /// Whether the handle resolves to a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.read().contains_key(id)
    }

    /// Number of live nodes, including detached ones and the root
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Always false: the root cannot be removed
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Insert a detached node without behavior
    pub fn create_node(&self, name: impl Into<String>) -> NodeId {
        self.insert(SceneNode::new(name.into(), None))
    }

    /// Insert a detached node driven by `behavior`
    pub fn create_node_with<B>(&self, name: impl Into<String>, behavior: B) -> NodeId
    where
        B: NodeBehavior + 'static,
    {
        self.insert(SceneNode::new(name.into(), Some(Box::new(behavior))))
    }

    /// Create a node and attach it under `parent` in one step
    pub fn spawn_child(&self, parent: NodeId, name: impl Into<String>) -> Result<NodeId, SceneError> {
        let child = self.create_node(name);
        if let Err(error) = self.add_child(parent, child) {
            self.nodes.write().remove(child);
            return Err(error);
        }
        Ok(child)
    }

    /// Replace the behavior of a node
    ///
    /// The new behavior's `ready` hook does not run if the node is already
    /// activated.
    pub fn set_behavior<B>(&self, id: NodeId, behavior: B) -> Result<(), SceneError>
    where
        B: NodeBehavior + 'static,
    {
        let node = self.get(id).ok_or(SceneError::NodeNotFound(id))?;
        *node.behavior.lock() = Some(Box::new(behavior));
        Ok(())
    }

    /// Remove a node from the arena
    ///
    /// The node is unlinked from its parent. Its children stay in the arena
    /// with an expired parent handle and are treated as roots from now on.
    pub fn destroy_node(&self, id: NodeId) -> Result<(), SceneError> {
        if id == self.root {
            return Err(SceneError::RootRemoval);
        }

        let _hierarchy = self.hierarchy.lock();
        let node = self.nodes.write().remove(id).ok_or(SceneError::NodeNotFound(id))?;

        let parent = *node.parent.read();
        if let Some(parent) = parent.and_then(|parent| self.get(parent)) {
            parent.children.write().retain(|child| *child != id);
        }
        for child in node.children_snapshot() {
            if let Some(child) = self.get(child) {
                self.invalidate_subtree(&child);
            }
        }

        log::debug!("Destroyed node {:?} ({})", id, node.name.read());
        Ok(())
    }

    /// Attach `child` under `parent`
    ///
    /// Adding an existing child is a no-op. A child attached elsewhere is
    /// detached from its old parent first. The child's subtree is invalidated
    /// before this returns, and if `parent` is already activated the child's
    /// subtree is activated immediately instead of on the next traversal.
    pub fn add_child(&self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        let parent_node = self.get(parent).ok_or(SceneError::NodeNotFound(parent))?;
        let child_node = self.get(child).ok_or(SceneError::NodeNotFound(child))?;

        {
            let _hierarchy = self.hierarchy.lock();

            let current_parent = *child_node.parent.read();
            if current_parent == Some(parent) && parent_node.children.read().contains(&child) {
                return Ok(());
            }
            if self.is_ancestor(child, parent) {
                return Err(SceneError::CycleDetected { parent, child });
            }

            if let Some(old_parent) = current_parent {
                self.unlink(old_parent, child);
            }
            parent_node.children.write().push(child);
            *child_node.parent.write() = Some(parent);
            self.invalidate_subtree(&child_node);
        }

        log::trace!("Attached node {:?} under {:?}", child, parent);

        if parent_node.activated.load(std::sync::atomic::Ordering::Acquire) {
            self.activate_subtree(child);
        }
        Ok(())
    }

    /// Detach `child` from `parent`
    ///
    /// Returns false when `child` is not a child of `parent`. The removed
    /// node keeps its own children.
    pub fn remove_child(&self, parent: NodeId, child: NodeId) -> bool {
        let _hierarchy = self.hierarchy.lock();
        let removed = self.unlink(parent, child);
        if removed {
            if let Some(child_node) = self.get(child) {
                self.invalidate_subtree(&child_node);
            }
            log::trace!("Detached node {:?} from {:?}", child, parent);
        }
        removed
    }

    /// First node named `name` in depth-first order from the root
    pub fn find(&self, name: &str) -> Option<NodeId> {
        let root = self.root();
        if root.name() == name {
            return Some(self.root);
        }
        root.find_descendant(name)
    }

    /// Run one logic frame over the tree
    ///
    /// Walks depth-first from the root. Each node is activated on its first
    /// visit and then has its `update` hook called before its children are
    /// visited. Children are snapshotted per node, so hooks may restructure
    /// the tree while the walk is in progress.
    pub fn update(&self, delta_time: f32) {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else { continue };
            node.activate();
            node.run_update(delta_time);
            stack.extend(node.inner().children_snapshot().into_iter().rev());
        }
    }

    /// Register the whole tree for drawing in `context`
    ///
    /// Returns false when the root itself is hidden or excluded.
    pub fn register_draw(&self, context: &mut RenderContext) -> bool {
        self.root().register_draw(context)
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<Arc<SceneNode>> {
        self.nodes.read().get(id).cloned()
    }

    /// Mark `node` and every descendant stale
    ///
    /// Completes before returning, so a reader that starts afterwards can
    /// never observe a clean cache computed from the old state.
    pub(crate) fn invalidate_subtree(&self, node: &Arc<SceneNode>) {
        node.invalidate();
        let mut stack = node.children_snapshot();
        while let Some(id) = stack.pop() {
            if let Some(descendant) = self.get(id) {
                descendant.invalidate();
                stack.extend(descendant.children_snapshot());
            }
        }
    }

    fn insert(&self, node: SceneNode) -> NodeId {
        let id = self.nodes.write().insert(Arc::new(node));
        log::trace!("Created node {:?}", id);
        id
    }

    fn activate_subtree(&self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.node(id) {
                node.activate();
                stack.extend(node.inner().children_snapshot().into_iter().rev());
            }
        }
    }

    /// Whether `candidate` is `node` or one of its ancestors
    fn is_ancestor(&self, candidate: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == candidate {
                return true;
            }
            current = self.get(id).and_then(|n| *n.parent.read());
        }
        false
    }

    /// Remove the parent/child link; caller holds the hierarchy lock
    fn unlink(&self, parent: NodeId, child: NodeId) -> bool {
        let Some(parent_node) = self.get(parent) else { return false };

        let removed = {
            let mut children = parent_node.children.write();
            let before = children.len();
            children.retain(|id| *id != child);
            children.len() != before
        };

        if removed {
            if let Some(child_node) = self.get(child) {
                let mut link = child_node.parent.write();
                if *link == Some(parent) {
                    *link = None;
                }
            }
        }
        removed
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SceneGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneGraph")
            .field("root", &self.root)
            .field("nodes", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Vec3, Vec4};
    use crate::render::{HeadlessBackend, RenderContext, RenderTask};
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl NodeBehavior for Recorder {
        fn ready(&mut self, _node: &NodeRef<'_>) {
            self.log.lock().push(format!("ready:{}", self.label));
        }

        fn update(&mut self, _node: &NodeRef<'_>, _delta_time: f32) {
            self.log.lock().push(format!("update:{}", self.label));
        }
    }

    fn chain(graph: &SceneGraph) -> (NodeId, NodeId) {
        let a = graph.spawn_child(graph.root_id(), "A").unwrap();
        let b = graph.spawn_child(a, "B").unwrap();
        graph.node(a).unwrap().set_position(Vec3::new(1.0, 0.0, 0.0));
        graph.node(b).unwrap().set_position(Vec3::new(0.0, 1.0, 0.0));
        (a, b)
    }

    #[test]
    fn test_global_position_follows_ancestor_changes() {
        let graph = SceneGraph::new();
        let (a, b) = chain(&graph);

        let grandchild = graph.node(b).unwrap();
        assert_relative_eq!(grandchild.global_position(), Vec4::new(1.0, 1.0, 0.0, 1.0), epsilon = 1e-6);

        *graph.node(a).unwrap().position_mut() = Vec3::new(2.0, 0.0, 0.0);
        assert_relative_eq!(grandchild.global_position(), Vec4::new(2.0, 1.0, 0.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_every_descendant_sees_rotation_and_scale() {
        let graph = SceneGraph::new();
        let (a, b) = chain(&graph);
        let grandchild = graph.node(b).unwrap();
        grandchild.world_matrix();

        let parent = graph.node(a).unwrap();
        parent.rotate(&Vec3::z(), std::f32::consts::FRAC_PI_2);
        assert!(grandchild.inner().world.is_dirty());
        // (0,1,0) rotated 90 degrees about Z lands on (-1,0,0)
        assert_relative_eq!(grandchild.global_position(), Vec4::new(0.0, 0.0, 0.0, 1.0), epsilon = 1e-6);

        parent.set_scale(Vec3::new(2.0, 2.0, 2.0));
        assert_relative_eq!(grandchild.global_position(), Vec4::new(-1.0, 0.0, 0.0, 1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_world_inverse_matches_world() {
        let graph = SceneGraph::new();
        let (a, b) = chain(&graph);
        graph.node(a).unwrap().set_scale(Vec3::new(2.0, 0.5, 3.0));
        graph.node(a).unwrap().rotate(&Vec3::new(1.0, 1.0, 0.0), 0.6);
        graph.node(b).unwrap().rotate(&Vec3::y(), -1.3);

        let node = graph.node(b).unwrap();
        assert_relative_eq!(node.world_matrix() * node.world_inverse_matrix(), Mat4::identity(), epsilon = 1e-4);
    }

    #[test]
    fn test_add_child_is_idempotent() {
        let graph = SceneGraph::new();
        let child = graph.create_node("child");
        graph.add_child(graph.root_id(), child).unwrap();
        graph.add_child(graph.root_id(), child).unwrap();

        assert_eq!(graph.root().children(), vec![child]);
    }

    #[test]
    fn test_reparenting_moves_the_child() {
        let graph = SceneGraph::new();
        let first = graph.spawn_child(graph.root_id(), "first").unwrap();
        let second = graph.spawn_child(graph.root_id(), "second").unwrap();
        let child = graph.spawn_child(first, "child").unwrap();

        graph.add_child(second, child).unwrap();

        assert!(graph.node(first).unwrap().children().is_empty());
        assert_eq!(graph.node(second).unwrap().children(), vec![child]);
        assert_eq!(graph.node(child).unwrap().parent(), Some(second));
    }

    #[test]
    fn test_remove_child_clears_parent_and_keeps_subtree() {
        let graph = SceneGraph::new();
        let (a, b) = chain(&graph);

        assert!(graph.remove_child(graph.root_id(), a));
        assert_eq!(graph.node(a).unwrap().parent(), None);
        assert_eq!(graph.node(b).unwrap().parent(), Some(a));
        // A is now a root: B only carries A's local offset
        assert_relative_eq!(graph.node(b).unwrap().global_position(), Vec4::new(1.0, 1.0, 0.0, 1.0), epsilon = 1e-6);

        assert!(!graph.remove_child(graph.root_id(), a));
    }

    #[test]
    fn test_cycles_are_rejected() {
        let graph = SceneGraph::new();
        let (a, b) = chain(&graph);

        assert_eq!(graph.add_child(b, a), Err(SceneError::CycleDetected { parent: b, child: a }));
        assert_eq!(graph.add_child(a, a), Err(SceneError::CycleDetected { parent: a, child: a }));
        assert_eq!(graph.node(a).unwrap().parent(), Some(graph.root_id()));
    }

    #[test]
    fn test_lookup_by_name_and_index() {
        let graph = SceneGraph::new();
        let first = graph.spawn_child(graph.root_id(), "twin").unwrap();
        let _second = graph.spawn_child(graph.root_id(), "twin").unwrap();
        let deep = graph.spawn_child(first, "deep").unwrap();

        assert_eq!(graph.root().find_child("twin"), Some(first));
        assert_eq!(graph.find("deep"), Some(deep));
        assert_eq!(graph.find("root"), Some(graph.root_id()));
        assert_eq!(graph.find("missing"), None);

        assert_eq!(graph.root().child(0), Ok(first));
        assert_eq!(graph.root().child(5), Err(SceneError::IndexOutOfRange { index: 5, len: 2 }));
    }

    #[test]
    fn test_destroyed_parent_leaves_children_as_roots() {
        let graph = SceneGraph::new();
        let (a, b) = chain(&graph);
        assert_relative_eq!(graph.node(b).unwrap().global_position(), Vec4::new(1.0, 1.0, 0.0, 1.0), epsilon = 1e-6);

        graph.destroy_node(a).unwrap();

        assert!(graph.node(a).is_none());
        assert!(graph.root().children().is_empty());
        let orphan = graph.node(b).unwrap();
        assert_eq!(orphan.parent(), None);
        assert_relative_eq!(orphan.global_position(), Vec4::new(0.0, 1.0, 0.0, 1.0), epsilon = 1e-6);

        assert_eq!(graph.destroy_node(a), Err(SceneError::NodeNotFound(a)));
        assert_eq!(graph.destroy_node(graph.root_id()), Err(SceneError::RootRemoval));
        assert_eq!(graph.add_child(graph.root_id(), a), Err(SceneError::NodeNotFound(a)));
    }

    #[test]
    fn test_update_activates_once_in_depth_first_order() {
        let graph = SceneGraph::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = graph.create_node_with("A", Recorder { label: "A", log: Arc::clone(&log) });
        let b = graph.create_node_with("B", Recorder { label: "B", log: Arc::clone(&log) });
        let c = graph.create_node_with("C", Recorder { label: "C", log: Arc::clone(&log) });
        graph.add_child(graph.root_id(), a).unwrap();
        graph.add_child(a, b).unwrap();
        graph.add_child(graph.root_id(), c).unwrap();

        graph.update(0.016);
        graph.update(0.016);

        let log = log.lock();
        assert_eq!(
            *log,
            vec![
                "ready:A", "update:A", "ready:B", "update:B", "ready:C", "update:C",
                "update:A", "update:B", "update:C",
            ]
        );
    }

    #[test]
    fn test_add_child_to_active_parent_activates_eagerly() {
        let graph = SceneGraph::new();
        graph.update(0.0);
        assert!(graph.root().is_activated());

        let log = Arc::new(Mutex::new(Vec::new()));
        let detached = graph.create_node_with("late", Recorder { label: "late", log: Arc::clone(&log) });
        let grandchild = graph.create_node_with("later", Recorder { label: "later", log: Arc::clone(&log) });
        graph.add_child(detached, grandchild).unwrap();
        assert!(log.lock().is_empty());

        graph.add_child(graph.root_id(), detached).unwrap();
        assert_eq!(*log.lock(), vec!["ready:late", "ready:later"]);
        assert!(graph.node(grandchild).unwrap().is_activated());
    }

    #[test]
    fn test_concurrent_activation_runs_ready_once() {
        struct CountReady(Arc<AtomicUsize>);
        impl NodeBehavior for CountReady {
            fn ready(&mut self, _node: &NodeRef<'_>) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let graph = SceneGraph::new();
        let count = Arc::new(AtomicUsize::new(0));
        let id = graph.create_node_with("once", CountReady(Arc::clone(&count)));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| graph.node(id).unwrap().activate());
            }
        });

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ready_hook_may_grow_the_tree() {
        struct Spawner;
        impl NodeBehavior for Spawner {
            fn ready(&mut self, node: &NodeRef<'_>) {
                let child = node.graph().create_node("spawned");
                node.add_child(child).unwrap();
                node.set_position(Vec3::new(0.0, 0.0, 5.0));
            }
        }

        let graph = SceneGraph::new();
        let spawner = graph.create_node_with("spawner", Spawner);
        graph.add_child(graph.root_id(), spawner).unwrap();
        graph.update(0.0);

        let spawned = graph.find("spawned").unwrap();
        let spawned = graph.node(spawned).unwrap();
        assert!(spawned.is_activated());
        assert_relative_eq!(spawned.global_position(), Vec4::new(0.0, 0.0, 5.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_concurrent_readers_and_writers_converge() {
        let graph = Arc::new(SceneGraph::new());
        let (a, b) = chain(&graph);

        std::thread::scope(|scope| {
            for writer in 0..2 {
                let graph = Arc::clone(&graph);
                scope.spawn(move || {
                    for step in 0..200 {
                        let x = (writer * 1000 + step) as f32;
                        graph.node(a).unwrap().set_position(Vec3::new(x, 0.0, 0.0));
                    }
                });
            }
            for _ in 0..4 {
                let graph = Arc::clone(&graph);
                scope.spawn(move || {
                    for _ in 0..200 {
                        let position = graph.node(b).unwrap().global_position();
                        assert_relative_eq!(position.y, 1.0, epsilon = 1e-6);
                    }
                });
            }
        });

        graph.node(a).unwrap().set_position(Vec3::new(7.0, 0.0, 0.0));
        assert_relative_eq!(graph.node(b).unwrap().global_position(), Vec4::new(7.0, 1.0, 0.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_excluded_context_hides_subtree() {
        let graph = SceneGraph::new();
        let (a, _b) = chain(&graph);
        let mut context = RenderContext::new("main", Box::new(HeadlessBackend::new()));
        let mut other = RenderContext::new("other", Box::new(HeadlessBackend::new()));

        assert!(graph.register_draw(&mut context));
        graph.node(a).unwrap().exclude_draw(context.id());
        assert!(!graph.node(a).unwrap().register_draw(&mut context));
        assert!(graph.node(a).unwrap().register_draw(&mut other));

        graph.node(a).unwrap().include_draw(context.id());
        graph.node(a).unwrap().set_visible(false);
        assert!(!graph.node(a).unwrap().register_draw(&mut other));
    }

    struct Enqueuer;

    impl NodeBehavior for Enqueuer {
        fn register_draw(&mut self, _node: &NodeRef<'_>, context: &mut RenderContext) {
            context.add_render_task(RenderTask::new(0.0, |_| Ok(())));
        }
    }

    #[test]
    fn test_excluded_context_skips_descendant_draws() {
        let graph = SceneGraph::new();
        let (a, b) = chain(&graph);
        graph.set_behavior(a, Enqueuer).unwrap();
        graph.set_behavior(b, Enqueuer).unwrap();
        let mut context = RenderContext::new("main", Box::new(HeadlessBackend::new()));
        let mut other = RenderContext::new("other", Box::new(HeadlessBackend::new()));

        graph.node(a).unwrap().exclude_draw(context.id());
        graph.register_draw(&mut context);
        graph.register_draw(&mut other);
        assert_eq!(context.pending_tasks(), 0);
        assert_eq!(other.pending_tasks(), 2);

        graph.node(a).unwrap().include_draw(context.id());
        graph.register_draw(&mut context);
        assert_eq!(context.pending_tasks(), 2);
    }
}
