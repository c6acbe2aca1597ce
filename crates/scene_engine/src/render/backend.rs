//! Backend abstraction and the thread-checked GPU entry points
//!
//! [`GraphicsBackend`] is what a windowing/graphics binding implements.
//! Render code never talks to it directly: every call goes through
//! [`GpuContext`], which refuses to run on any thread but the owner.

use super::{ContextId, RenderError};
use crate::events::EventKind;
use crate::foundation::math::{Mat4, Vec3};
use crossbeam_channel::Sender;
use std::fmt;
use std::thread::{self, ThreadId};

/// Result type for backend operations
pub type BackendResult<T> = Result<T, RenderError>;

/// Handle to a vertex buffer owned by one context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Handle to a texture owned by one context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Handle to a linked shader program owned by one context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub u64);

/// Any GPU resource that can be released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuResource {
    /// Vertex buffer
    Buffer(BufferHandle),
    /// Texture
    Texture(TextureHandle),
    /// Shader program
    Shader(ShaderHandle),
}

/// Light source type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    /// Infinitely distant light shining along `direction`
    Directional,
    /// Omnidirectional light at `position`
    Point,
}

/// Light parameters in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightData {
    /// Light source type
    pub kind: LightKind,
    /// World position
    pub position: Vec3,
    /// World direction the light travels in
    pub direction: Vec3,
    /// Linear RGB color
    pub color: Vec3,
    /// Scalar intensity
    pub intensity: f32,
}

/// Graphics API binding for one window
///
/// Implementations may assume every call arrives on the thread that created
/// the context; [`GpuContext`] enforces it.
pub trait GraphicsBackend {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Number of texture sampler slots available per frame
    fn max_sampler_slots(&self) -> u32 {
        16
    }

    /// Upload interleaved vertex data
    fn create_buffer(&mut self, data: &[u8]) -> BackendResult<BufferHandle>;

    /// Free a vertex buffer
    fn delete_buffer(&mut self, buffer: BufferHandle) -> BackendResult<()>;

    /// Upload a tightly packed 8-bit texture
    fn create_texture(&mut self, width: u32, height: u32, channels: u8, pixels: &[u8]) -> BackendResult<TextureHandle>;

    /// Free a texture
    fn delete_texture(&mut self, texture: TextureHandle) -> BackendResult<()>;

    /// Compile and link a shader program
    fn compile_shader(&mut self, vertex_source: &str, fragment_source: &str) -> BackendResult<ShaderHandle>;

    /// Free a shader program
    fn delete_shader(&mut self, shader: ShaderHandle) -> BackendResult<()>;

    /// Clear the color and depth targets
    fn clear(&mut self, color: [f32; 4]);

    /// Set the camera matrices for subsequent draws
    fn set_view_projection(&mut self, view: &Mat4, projection: &Mat4);

    /// Set the model matrix for subsequent draws
    fn set_model_matrix(&mut self, model: &Mat4);

    /// Bind `texture` to sampler `slot`
    fn bind_texture(&mut self, slot: u32, texture: TextureHandle) -> BackendResult<()>;

    /// Accumulate one light
    fn apply_light(&mut self, light: &LightData);

    /// Draw `count` vertices starting at `first` as a triangle list
    fn draw_arrays(&mut self, shader: ShaderHandle, buffer: BufferHandle, first: u32, count: u32) -> BackendResult<()>;

    /// Swap buffers
    fn present(&mut self) -> BackendResult<()>;

    /// Window events received since the last poll
    fn poll_events(&mut self) -> Vec<EventKind> {
        Vec::new()
    }
}

type ReleaseFn = Box<dyn FnOnce(&mut GpuContext, GpuResource) -> BackendResult<()> + Send>;

pub(crate) struct PendingRelease {
    pub(crate) resource: GpuResource,
    pub(crate) release: ReleaseFn,
}

/// Sendable handle for queueing GPU frees on a context
///
/// Resources are owned by the context thread, but the objects holding their
/// handles can be dropped anywhere. Releases are queued here and carried out
/// by [`RenderContext::collect_garbage`](super::RenderContext::collect_garbage)
/// at the end of the frame.
#[derive(Clone)]
pub struct ResourceReleaser {
    context: ContextId,
    sender: Sender<PendingRelease>,
}

impl ResourceReleaser {
    pub(crate) fn new(context: ContextId, sender: Sender<PendingRelease>) -> Self {
        Self { context, sender }
    }

    /// Context the resources belong to
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Queue the default delete for `resource`
    ///
    /// Returns false when the context is already gone, in which case its
    /// resources were freed with it.
    pub fn release(&self, resource: GpuResource) -> bool {
        self.defer(resource, |gpu, resource| gpu.destroy(resource))
    }

    /// Queue a custom release function for `resource`
    pub fn defer<F>(&self, resource: GpuResource, release: F) -> bool
    where
        F: FnOnce(&mut GpuContext, GpuResource) -> BackendResult<()> + Send + 'static,
    {
        self.sender
            .send(PendingRelease { resource, release: Box::new(release) })
            .is_ok()
    }
}

impl fmt::Debug for ResourceReleaser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceReleaser")
            .field("context", &self.context)
            .field("pending", &self.sender.len())
            .finish()
    }
}

/// Thread-checked access to a context's graphics backend
///
/// Handed to render task callbacks. Every call first verifies that it runs
/// on the thread owning the context and fails with
/// [`RenderError::ThreadAffinity`] otherwise.
pub struct GpuContext {
    context: ContextId,
    owner: ThreadId,
    backend: Box<dyn GraphicsBackend + Send>,
    releaser: ResourceReleaser,
    next_sampler_slot: u32,
    draw_calls: u32,
}

impl GpuContext {
    pub(crate) fn new(
        context: ContextId,
        owner: ThreadId,
        backend: Box<dyn GraphicsBackend + Send>,
        releaser: ResourceReleaser,
    ) -> Self {
        Self {
            context,
            owner,
            backend,
            releaser,
            next_sampler_slot: 0,
            draw_calls: 0,
        }
    }

    /// Context this GPU state belongs to
    pub fn context_id(&self) -> ContextId {
        self.context
    }

    /// Backend name
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Releaser that queues frees on this context
    pub fn releaser(&self) -> ResourceReleaser {
        self.releaser.clone()
    }

    /// Draw calls issued since the last refresh
    pub fn draw_calls(&self) -> u32 {
        self.draw_calls
    }

    /// Fail unless called on the owning thread
    pub fn check_thread(&self) -> Result<(), RenderError> {
        let caller = thread::current().id();
        if caller == self.owner {
            Ok(())
        } else {
            Err(RenderError::ThreadAffinity {
                context: self.context,
                owner: self.owner,
                caller,
            })
        }
    }

    /// Upload vertex data
    pub fn create_buffer(&mut self, data: &[u8]) -> BackendResult<BufferHandle> {
        self.check_thread()?;
        self.backend.create_buffer(data)
    }

    /// Free a vertex buffer now
    pub fn delete_buffer(&mut self, buffer: BufferHandle) -> BackendResult<()> {
        self.check_thread()?;
        self.backend.delete_buffer(buffer)
    }

    /// Upload a texture; `pixels` must hold `width * height * channels` bytes
    pub fn create_texture(&mut self, width: u32, height: u32, channels: u8, pixels: &[u8]) -> BackendResult<TextureHandle> {
        self.check_thread()?;
        if !(1..=4).contains(&channels) {
            return Err(RenderError::InvalidData(format!("{channels} channels per pixel")));
        }
        let expected = width as usize * height as usize * channels as usize;
        if expected == 0 || pixels.len() != expected {
            return Err(RenderError::InvalidData(format!(
                "{width}x{height}x{channels} texture needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        self.backend.create_texture(width, height, channels, pixels)
    }

    /// Free a texture now
    pub fn delete_texture(&mut self, texture: TextureHandle) -> BackendResult<()> {
        self.check_thread()?;
        self.backend.delete_texture(texture)
    }

    /// Compile and link a shader program
    pub fn compile_shader(&mut self, vertex_source: &str, fragment_source: &str) -> BackendResult<ShaderHandle> {
        self.check_thread()?;
        self.backend.compile_shader(vertex_source, fragment_source)
    }

    /// Free a shader program now
    pub fn delete_shader(&mut self, shader: ShaderHandle) -> BackendResult<()> {
        self.check_thread()?;
        self.backend.delete_shader(shader)
    }

    /// Free any resource now
    pub fn destroy(&mut self, resource: GpuResource) -> BackendResult<()> {
        match resource {
            GpuResource::Buffer(buffer) => self.delete_buffer(buffer),
            GpuResource::Texture(texture) => self.delete_texture(texture),
            GpuResource::Shader(shader) => self.delete_shader(shader),
        }
    }

    /// Clear the targets
    pub fn clear(&mut self, color: [f32; 4]) -> BackendResult<()> {
        self.check_thread()?;
        self.backend.clear(color);
        Ok(())
    }

    /// Set the camera matrices
    pub fn set_view_projection(&mut self, view: &Mat4, projection: &Mat4) -> BackendResult<()> {
        self.check_thread()?;
        self.backend.set_view_projection(view, projection);
        Ok(())
    }

    /// Set the model matrix
    pub fn set_model_matrix(&mut self, model: &Mat4) -> BackendResult<()> {
        self.check_thread()?;
        self.backend.set_model_matrix(model);
        Ok(())
    }

    /// Reserve the next free sampler slot for this frame
    pub fn allocate_sampler_slot(&mut self) -> BackendResult<u32> {
        self.check_thread()?;
        let max = self.backend.max_sampler_slots();
        if self.next_sampler_slot >= max {
            return Err(RenderError::SamplerSlotsExhausted { max });
        }
        let slot = self.next_sampler_slot;
        self.next_sampler_slot += 1;
        Ok(slot)
    }

    /// Bind `texture` to a freshly allocated sampler slot and return the slot
    pub fn bind_texture(&mut self, texture: TextureHandle) -> BackendResult<u32> {
        let slot = self.allocate_sampler_slot()?;
        self.backend.bind_texture(slot, texture)?;
        Ok(slot)
    }

    /// Accumulate a light
    pub fn apply_light(&mut self, light: &LightData) -> BackendResult<()> {
        self.check_thread()?;
        self.backend.apply_light(light);
        Ok(())
    }

    /// Draw a triangle list
    pub fn draw_arrays(&mut self, shader: ShaderHandle, buffer: BufferHandle, first: u32, count: u32) -> BackendResult<()> {
        self.check_thread()?;
        self.backend.draw_arrays(shader, buffer, first, count)?;
        self.draw_calls += 1;
        Ok(())
    }

    /// Swap buffers
    pub fn present(&mut self) -> BackendResult<()> {
        self.check_thread()?;
        self.backend.present()
    }

    pub(crate) fn poll_events(&mut self) -> BackendResult<Vec<EventKind>> {
        self.check_thread()?;
        Ok(self.backend.poll_events())
    }

    pub(crate) fn reset_frame(&mut self) {
        self.next_sampler_slot = 0;
        self.draw_calls = 0;
    }
}

impl fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuContext")
            .field("context", &self.context)
            .field("owner", &self.owner)
            .field("backend", &self.backend.name())
            .field("next_sampler_slot", &self.next_sampler_slot)
            .finish_non_exhaustive()
    }
}
