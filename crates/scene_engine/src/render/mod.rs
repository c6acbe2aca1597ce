//! Rendering contexts and the per-frame task queue
//!
//! Each window owns a [`RenderContext`]: the thread that created it is the
//! only one allowed to touch its GPU resources. Scene traversal fills the
//! context's queue with [`RenderTask`]s through `register_draw`, then the
//! owning thread sorts the queue by priority and executes it.
//!
//! ## Frame sequence
//!
//! ```text
//! SceneGraph::register_draw(&mut ctx)   // drawables enqueue tasks
//! ctx.render()                          // sort by priority, execute
//! ctx.present()
//! ctx.refresh()                         // clear queue, reset counters
//! ctx.collect_garbage()                 // deferred GPU frees
//! ```

mod backend;
mod context;
mod drawables;
mod headless;
mod task;

pub use backend::{
    BackendResult, BufferHandle, GraphicsBackend, GpuContext, GpuResource, LightData, LightKind,
    ResourceReleaser, ShaderHandle, TextureHandle,
};
pub use context::{ContextId, FrameStats, RenderContext};
pub use drawables::{CameraNode, LightNode, Material, MeshDrawable, Projection};
pub use headless::{BackendCall, CallLog, HeadlessBackend};
pub use task::{priority, RenderTask, TaskCallback};

use std::thread::ThreadId;
use thiserror::Error;

/// Rendering errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// A context or its GPU resources were used from a thread other than the
    /// one that owns them
    #[error("Context {context} is owned by thread {owner:?} but was used from {caller:?}")]
    ThreadAffinity {
        /// Context that was misused
        context: ContextId,
        /// Thread that owns the context
        owner: ThreadId,
        /// Thread that made the call
        caller: ThreadId,
    },

    /// Handle does not name a live resource of this context
    #[error("Invalid resource handle: {0}")]
    InvalidHandle(String),

    /// Initializer or upload data has the wrong size or shape
    #[error("Invalid resource data: {0}")]
    InvalidData(String),

    /// Shader source was rejected by the backend
    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// All texture sampler slots for this frame are in use
    #[error("No free sampler slot (limit {max})")]
    SamplerSlotsExhausted {
        /// Number of slots the backend exposes
        max: u32,
    },

    /// Backend-specific failure
    #[error("Backend error: {0}")]
    Backend(String),
}
