//! Deferred draw work

use super::{GpuContext, RenderError};
use std::fmt;

/// Well-known task priorities; lower values execute first
///
/// Priorities are floats so callers can order by depth or distance.
///
/// The queue only sorts. What a value means is decided by the drawables
/// that enqueue work, these are the values the built-in ones use.
pub mod priority {
    /// Frame setup such as clearing the target
    pub const CLEAR: f32 = -1000.0;
    /// Camera view and projection upload
    pub const CAMERA: f32 = -500.0;
    /// Opaque geometry
    pub const OPAQUE: f32 = 0.0;
    /// Lighting accumulation after geometry
    pub const LIGHTS: f32 = 500.0;
    /// Blended geometry
    pub const TRANSPARENT: f32 = 1000.0;
    /// Screen-space overlays
    pub const OVERLAY: f32 = 2000.0;
}

/// Callback executed on the context thread during [`RenderContext::render`](super::RenderContext::render)
pub type TaskCallback = Box<dyn FnOnce(&mut GpuContext) -> Result<(), RenderError> + Send>;

/// One unit of per-frame draw work
pub struct RenderTask {
    priority: f32,
    label: &'static str,
    callback: TaskCallback,
}

impl RenderTask {
    /// Wrap `callback` with a render-order priority
    pub fn new<F>(priority: f32, callback: F) -> Self
    where
        F: FnOnce(&mut GpuContext) -> Result<(), RenderError> + Send + 'static,
    {
        Self {
            priority,
            label: "task",
            callback: Box::new(callback),
        }
    }

    /// Attach a short label used in trace logs
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    /// Render-order priority
    pub fn priority(&self) -> f32 {
        self.priority
    }

    /// Trace label
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn execute(self, gpu: &mut GpuContext) -> Result<(), RenderError> {
        (self.callback)(gpu)
    }
}

impl fmt::Debug for RenderTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTask")
            .field("priority", &self.priority)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
