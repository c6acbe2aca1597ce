//! # Scene Engine
//!
//! A real-time 3D scene engine core: a shared hierarchical scene graph with
//! lazily cached world transforms, and per-window render contexts that
//! collect priority-ordered draw work and execute it on their own thread.
//!
//! ## Features
//!
//! - **Scene graph**: arena of nodes addressed by generation-checked handles,
//!   safe to read and mutate from several threads at once
//! - **Transform caching**: world and inverse-world matrices recomputed only
//!   after a local transform or parent link changes
//! - **Render task queue**: stable priority ordering with thread-affinity
//!   checks on every GPU entry point
//! - **Events**: weakly held listeners fed by a dispatcher thread
//! - **Assets**: OBJ meshes with ear-clipped faces, PNG textures
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut engine = Engine::new(EngineConfig::default())?;
//!
//!     let scene = engine.scene();
//!     let ship = scene.spawn_child(scene.root_id(), "ship")?;
//!     scene.try_node(ship)?.set_position(Vec3::new(1.0, 0.0, 0.0));
//!
//!     engine.spawn_configured(|_| Ok(Box::new(HeadlessBackend::new()) as BoxedBackend))?;
//!     engine.wait()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod assets;
pub mod config;
pub mod events;
pub mod foundation;
pub mod render;
pub mod scene;

mod engine;

pub use engine::{BoxedBackend, ContextHandle, ContextReport, Engine, EngineError};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{FileResourceLoader, ImageData, ResourceLoader},
        config::{Config, EngineConfig, WindowConfig},
        events::{Event, EventBus, EventKind, EventListener, EventMask},
        foundation::{
            geometry::{Triangle, Vertex},
            math::{EulerOrder, Mat4, Quat, Transform, Vec3, Vec4},
        },
        render::{
            priority, CameraNode, ContextId, GpuContext, GraphicsBackend, HeadlessBackend, LightNode, Material, MeshDrawable,
            RenderContext, RenderError, RenderTask,
        },
        scene::{NodeBehavior, NodeId, NodeRef, SceneError, SceneGraph},
        BoxedBackend, Engine, EngineError,
    };
}
