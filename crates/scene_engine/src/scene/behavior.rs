//! Per-node behavior hooks

use super::NodeRef;
use crate::render::RenderContext;

/// Logic attached to a scene node
///
/// Nodes without a behavior are plain spatial nodes and cost nothing beyond
/// the tree walk. All hooks default to doing nothing.
///
/// Hooks run with the node's behavior lock held. They may move the node, add
/// or remove children and query matrices, but must not start another
/// traversal that would reach the same node again.
pub trait NodeBehavior: Send {
    /// Called exactly once, the first time the node is activated
    fn ready(&mut self, _node: &NodeRef<'_>) {}

    /// Per-frame logic, called during [`SceneGraph::update`](super::SceneGraph::update)
    fn update(&mut self, _node: &NodeRef<'_>, _delta_time: f32) {}

    /// Queue draw work for `context`
    ///
    /// Only called when the node is visible and not excluded from the
    /// context. Drawables push render tasks here instead of drawing.
    fn register_draw(&mut self, _node: &NodeRef<'_>, _context: &mut RenderContext) {}
}
