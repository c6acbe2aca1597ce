//! In-memory backend that records every call

use super::{BackendResult, BufferHandle, GraphicsBackend, LightData, RenderError, ShaderHandle, TextureHandle};
use crate::events::EventKind;
use crate::foundation::math::Mat4;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Shared record of the calls a [`HeadlessBackend`] received
pub type CallLog = Arc<Mutex<Vec<BackendCall>>>;

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    /// Buffer upload of `bytes` bytes
    CreateBuffer {
        /// Returned handle
        handle: BufferHandle,
        /// Upload size
        bytes: usize,
    },
    /// Buffer freed
    DeleteBuffer(BufferHandle),
    /// Texture upload
    CreateTexture {
        /// Returned handle
        handle: TextureHandle,
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
        /// Channels per pixel
        channels: u8,
    },
    /// Texture freed
    DeleteTexture(TextureHandle),
    /// Shader compiled
    CompileShader(ShaderHandle),
    /// Shader freed
    DeleteShader(ShaderHandle),
    /// Targets cleared
    Clear([f32; 4]),
    /// Camera matrices set
    SetViewProjection {
        /// View matrix
        view: Mat4,
        /// Projection matrix
        projection: Mat4,
    },
    /// Model matrix set
    SetModelMatrix(Mat4),
    /// Texture bound
    BindTexture {
        /// Sampler slot
        slot: u32,
        /// Bound texture
        texture: TextureHandle,
    },
    /// Light accumulated
    ApplyLight(LightData),
    /// Triangle list drawn
    DrawArrays {
        /// Program used
        shader: ShaderHandle,
        /// Vertex source
        buffer: BufferHandle,
        /// First vertex
        first: u32,
        /// Vertex count
        count: u32,
    },
    /// Buffers swapped
    Present,
}

/// Backend without a window or GPU
///
/// Hands out increasing handles, validates that handles are live and keeps
/// a log of every call. Window events can be injected from any thread
/// through [`event_sender`](Self::event_sender).
pub struct HeadlessBackend {
    next_handle: u64,
    buffers: HashMap<BufferHandle, usize>,
    textures: HashMap<TextureHandle, (u32, u32, u8)>,
    shaders: HashSet<ShaderHandle>,
    calls: CallLog,
    events_tx: Sender<EventKind>,
    events_rx: Receiver<EventKind>,
}

impl HeadlessBackend {
    /// Sampler slots reported by the headless backend
    pub const SAMPLER_SLOTS: u32 = 8;

    /// Create an empty backend
    pub fn new() -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            next_handle: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            shaders: HashSet::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            events_tx,
            events_rx,
        }
    }

    /// Shared call log; stays readable after the backend is boxed
    pub fn call_log(&self) -> CallLog {
        Arc::clone(&self.calls)
    }

    /// Sender for simulated window events
    pub fn event_sender(&self) -> Sender<EventKind> {
        self.events_tx.clone()
    }

    /// Number of live buffers, textures and shaders
    pub fn live_resources(&self) -> usize {
        self.buffers.len() + self.textures.len() + self.shaders.len()
    }

    fn allocate(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().push(call);
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn max_sampler_slots(&self) -> u32 {
        Self::SAMPLER_SLOTS
    }

    fn create_buffer(&mut self, data: &[u8]) -> BackendResult<BufferHandle> {
        if data.is_empty() {
            return Err(RenderError::InvalidData("empty vertex buffer".into()));
        }
        let handle = BufferHandle(self.allocate());
        self.buffers.insert(handle, data.len());
        self.record(BackendCall::CreateBuffer { handle, bytes: data.len() });
        Ok(handle)
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) -> BackendResult<()> {
        self.buffers
            .remove(&buffer)
            .ok_or_else(|| RenderError::InvalidHandle(format!("{buffer:?}")))?;
        self.record(BackendCall::DeleteBuffer(buffer));
        Ok(())
    }

    fn create_texture(&mut self, width: u32, height: u32, channels: u8, _pixels: &[u8]) -> BackendResult<TextureHandle> {
        let handle = TextureHandle(self.allocate());
        self.textures.insert(handle, (width, height, channels));
        self.record(BackendCall::CreateTexture { handle, width, height, channels });
        Ok(handle)
    }

    fn delete_texture(&mut self, texture: TextureHandle) -> BackendResult<()> {
        self.textures
            .remove(&texture)
            .ok_or_else(|| RenderError::InvalidHandle(format!("{texture:?}")))?;
        self.record(BackendCall::DeleteTexture(texture));
        Ok(())
    }

    fn compile_shader(&mut self, vertex_source: &str, fragment_source: &str) -> BackendResult<ShaderHandle> {
        if vertex_source.trim().is_empty() || fragment_source.trim().is_empty() {
            return Err(RenderError::ShaderCompilation("empty shader stage".into()));
        }
        let handle = ShaderHandle(self.allocate());
        self.shaders.insert(handle);
        self.record(BackendCall::CompileShader(handle));
        Ok(handle)
    }

    fn delete_shader(&mut self, shader: ShaderHandle) -> BackendResult<()> {
        if !self.shaders.remove(&shader) {
            return Err(RenderError::InvalidHandle(format!("{shader:?}")));
        }
        self.record(BackendCall::DeleteShader(shader));
        Ok(())
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.record(BackendCall::Clear(color));
    }

    fn set_view_projection(&mut self, view: &Mat4, projection: &Mat4) {
        self.record(BackendCall::SetViewProjection { view: *view, projection: *projection });
    }

    fn set_model_matrix(&mut self, model: &Mat4) {
        self.record(BackendCall::SetModelMatrix(*model));
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureHandle) -> BackendResult<()> {
        if !self.textures.contains_key(&texture) {
            return Err(RenderError::InvalidHandle(format!("{texture:?}")));
        }
        self.record(BackendCall::BindTexture { slot, texture });
        Ok(())
    }

    fn apply_light(&mut self, light: &LightData) {
        self.record(BackendCall::ApplyLight(*light));
    }

    fn draw_arrays(&mut self, shader: ShaderHandle, buffer: BufferHandle, first: u32, count: u32) -> BackendResult<()> {
        if !self.shaders.contains(&shader) {
            return Err(RenderError::InvalidHandle(format!("{shader:?}")));
        }
        if !self.buffers.contains_key(&buffer) {
            return Err(RenderError::InvalidHandle(format!("{buffer:?}")));
        }
        self.record(BackendCall::DrawArrays { shader, buffer, first, count });
        Ok(())
    }

    fn present(&mut self) -> BackendResult<()> {
        self.record(BackendCall::Present);
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<EventKind> {
        self.events_rx.try_iter().collect()
    }
}
