//! Scene management system
//!
//! A tree of spatial nodes rooted at one base node. Nodes live in an arena
//! and refer to each other through generation-checked [`NodeId`] handles, so
//! a parent or child link is a lookup that may find nothing once the target
//! has been destroyed.
//!
//! ## Architecture
//!
//! ```text
//! SceneGraph (arena + hierarchy lock)
//!      ↓ NodeId
//! SceneNode (transform, cached world matrices, flags, behavior)
//!      ↓ register_draw
//! RenderContext (per-window task queue)
//! ```
//!
//! Every node is shared state: the draw thread of each context reads world
//! matrices while game logic and event handlers mutate local transforms from
//! other threads. World matrices are cached per node and invalidated down the
//! tree whenever a local transform or the parent link changes.

mod behavior;
mod graph;
mod node;
mod node_ref;

pub use behavior::NodeBehavior;
pub use graph::SceneGraph;
pub use node::TransformGuard;
pub use node_ref::NodeRef;

use thiserror::Error;

slotmap::new_key_type! {
    /// Generation-checked handle to a node in a [`SceneGraph`]
    pub struct NodeId;
}

/// Scene graph errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// The handle does not resolve to a live node
    #[error("Node {0:?} not found")]
    NodeNotFound(NodeId),

    /// Child lookup by index past the end of the child list
    #[error("Child index {index} out of range for {len} children")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of children
        len: usize,
    },

    /// Attaching would make a node its own ancestor
    #[error("Adding {child:?} under {parent:?} would create a cycle")]
    CycleDetected {
        /// Requested parent
        parent: NodeId,
        /// Requested child
        child: NodeId,
    },

    /// The base node cannot be destroyed
    #[error("The root node cannot be destroyed")]
    RootRemoval,
}
